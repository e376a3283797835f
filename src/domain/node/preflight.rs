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

//! Host OS compatibility check, run before anything on the host is touched

use crate::infrastructure::constants::SUPPORTED_OS_VERSIONS;
use crate::shared::error::{ProvisionError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
}

impl OsRelease {
    /// Parse the `KEY=value` lines of an os-release file.
    pub fn parse(content: &str) -> Self {
        let mut id = String::new();
        let mut version_id = String::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            match key.trim() {
                "ID" => id = value,
                "VERSION_ID" => version_id = value,
                _ => {}
            }
        }
        Self { id, version_id }
    }
}

pub fn is_supported(version: &str) -> bool {
    SUPPORTED_OS_VERSIONS.contains(&version)
}

pub struct PreflightValidator {
    os_release: PathBuf,
}

impl PreflightValidator {
    pub fn new(os_release: impl AsRef<Path>) -> Self {
        Self {
            os_release: os_release.as_ref().to_path_buf(),
        }
    }

    /// Fails with [`ProvisionError::UnsupportedOs`] outside the supported set.
    pub fn check(&self) -> Result<OsRelease> {
        let content = fs::read_to_string(&self.os_release).map_err(|e| {
            ProvisionError::UnsupportedOs {
                found: format!("unknown ({}: {})", self.os_release.display(), e),
                supported: SUPPORTED_OS_VERSIONS.join(", "),
            }
        })?;
        let release = OsRelease::parse(&content);

        if !is_supported(&release.version_id) {
            return Err(ProvisionError::UnsupportedOs {
                found: release.version_id,
                supported: SUPPORTED_OS_VERSIONS.join(", "),
            });
        }

        info!(
            "Detected {} {} (supported)",
            if release.id.is_empty() { "OS" } else { release.id.as_str() },
            release.version_id
        );
        Ok(release)
    }
}
