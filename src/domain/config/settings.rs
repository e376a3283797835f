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

//! Optional TOML settings file
//!
//! ```toml
//! [node]
//! node_type = "cp"
//! hostname = "node-a"
//! k8s_version = "1.31"
//! pod_cidr = "10.244.0.0/16"
//!
//! [readiness]
//! max_attempts = 150
//! interval_secs = 2
//! probe = "kubectl"
//!
//! [paths]
//! log_file = "/var/log/kube-node-setup.log"
//! ```

use crate::domain::config::provision::NodeType;
use crate::infrastructure::constants::*;
use crate::shared::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeSettings,
    pub join: JoinSettings,
    pub cni: CniSettings,
    pub readiness: ReadinessSettings,
    pub paths: HostPaths,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub node_type: Option<NodeType>,
    pub hostname: Option<String>,
    pub k8s_version: Option<String>,
    pub pod_cidr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSettings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub discovery_token_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CniSettings {
    pub calico_version: String,
}

impl Default for CniSettings {
    fn default() -> Self {
        Self {
            calico_version: DEFAULT_CALICO_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// `kubectl cluster-info`
    #[default]
    Kubectl,
    /// API server version request through the Kubernetes client
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub max_attempts: usize,
    pub interval_secs: u64,
    pub probe: ProbeKind,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            max_attempts: READINESS_MAX_ATTEMPTS,
            interval_secs: READINESS_INTERVAL_SECONDS,
            probe: ProbeKind::default(),
        }
    }
}

impl ReadinessSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Every host file the provisioner reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPaths {
    pub log_file: PathBuf,
    pub join_descriptor: PathBuf,
    pub os_release: PathBuf,
    pub fstab: PathBuf,
    pub modules_load: PathBuf,
    pub sysctl_conf: PathBuf,
    pub containerd_config: PathBuf,
    pub apt_keyring: PathBuf,
    pub apt_sources: PathBuf,
    pub admin_kubeconfig: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(LOG_FILE),
            join_descriptor: PathBuf::from(JOIN_DESCRIPTOR_PATH),
            os_release: PathBuf::from(OS_RELEASE_PATH),
            fstab: PathBuf::from(FSTAB_PATH),
            modules_load: PathBuf::from(MODULES_LOAD_PATH),
            sysctl_conf: PathBuf::from(SYSCTL_CONF_PATH),
            containerd_config: PathBuf::from(CONTAINERD_CONFIG_PATH),
            apt_keyring: PathBuf::from(APT_KEYRING_PATH),
            apt_sources: PathBuf::from(APT_SOURCES_PATH),
            admin_kubeconfig: PathBuf::from(ADMIN_KUBECONFIG_PATH),
        }
    }
}

impl HostPaths {
    /// Default layout relocated under `root`, e.g. `/etc/fstab` -> `<root>/etc/fstab`.
    pub fn rooted(root: &Path) -> Self {
        let reroot = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            log_file: reroot(LOG_FILE),
            join_descriptor: reroot(JOIN_DESCRIPTOR_PATH),
            os_release: reroot(OS_RELEASE_PATH),
            fstab: reroot(FSTAB_PATH),
            modules_load: reroot(MODULES_LOAD_PATH),
            sysctl_conf: reroot(SYSCTL_CONF_PATH),
            containerd_config: reroot(CONTAINERD_CONFIG_PATH),
            apt_keyring: reroot(APT_KEYRING_PATH),
            apt_sources: reroot(APT_SOURCES_PATH),
            admin_kubeconfig: reroot(ADMIN_KUBECONFIG_PATH),
        }
    }
}
