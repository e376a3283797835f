// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Join descriptor: the control plane's join credentials persisted as JSON so
//! a worker run can pick them up with `--join-file` instead of scraping logs.

use crate::domain::config::{JoinCredentials, ProvisionConfig};
use crate::infrastructure::system::{CommandRunner, HostCommand};
use crate::shared::error::{ProvisionError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::info;

const JOIN_COMMAND_PATTERN: &str = r"kubeadm\s+join\s+(\S+)\s+--token\s+(\S+)\s+--discovery-token-ca-cert-hash\s+(sha256:[0-9A-Fa-f]+)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub endpoint: String,
    pub token: String,
    pub discovery_token_hash: String,
    pub created_at: DateTime<Utc>,
}

impl JoinDescriptor {
    /// Extract the credentials from `kubeadm ... --print-join-command` output
    /// or from the join command block `kubeadm init` prints.
    pub fn parse_join_command(output: &str) -> Result<Self> {
        let flattened = output.replace("\\\r\n", " ").replace("\\\n", " ");
        let pattern = Regex::new(JOIN_COMMAND_PATTERN)
            .map_err(|e| ProvisionError::config(format!("Invalid join pattern: {}", e)))?;
        let caps = pattern.captures(&flattened).ok_or_else(|| {
            ProvisionError::config(format!(
                "No kubeadm join command found in output: {}",
                output.trim()
            ))
        })?;

        Ok(Self {
            endpoint: caps[1].to_string(),
            token: caps[2].to_string(),
            discovery_token_hash: caps[3].to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn credentials(&self) -> JoinCredentials {
        JoinCredentials {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            discovery_token_hash: self.discovery_token_hash.clone(),
        }
    }

    pub fn join_command(&self) -> String {
        format!(
            "kubeadm join {} --token {} --discovery-token-ca-cert-hash {}",
            self.endpoint, self.token, self.discovery_token_hash
        )
    }

    /// Write as pretty JSON readable only by the owner.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        // mode() only applies on creation
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to read join file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ProvisionError::config(format!(
                "Invalid join file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Mint a fresh join command on the control plane and persist it.
pub async fn publish(config: &ProvisionConfig, runner: &dyn CommandRunner) -> Result<PathBuf> {
    let output = runner
        .run(
            &HostCommand::new("kubeadm")
                .args(["token", "create", "--print-join-command"])
                .arg("--kubeconfig")
                .arg(config.paths.admin_kubeconfig.display().to_string()),
        )
        .await?;

    let descriptor = JoinDescriptor::parse_join_command(&output.stdout)?;
    let path = config.paths.join_descriptor.clone();
    descriptor.write(&path)?;

    info!("Join command: {}", descriptor.join_command());
    info!(
        "Join descriptor written to {} (use --join-file on workers)",
        path.display()
    );
    Ok(path)
}
