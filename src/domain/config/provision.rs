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

//! The provisioning configuration record
//!
//! Built once at startup from command line, settings file and defaults, then
//! read by every step. Nothing mutates it after [`ProvisionConfig::resolve`].

use crate::domain::config::settings::{HostPaths, ReadinessSettings, Settings};
use crate::infrastructure::constants::{DEFAULT_K8S_VERSION, DEFAULT_POD_CIDR};
use crate::shared::error::{ProvisionError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeType {
    #[default]
    #[serde(rename = "cp", alias = "control-plane", alias = "control_plane")]
    ControlPlane,
    #[serde(rename = "worker")]
    Worker,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::ControlPlane => "cp",
            NodeType::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cp" | "control-plane" | "control_plane" => Ok(NodeType::ControlPlane),
            "worker" => Ok(NodeType::Worker),
            _ => Err(ProvisionError::config(format!(
                "Invalid node type: '{}' (expected 'cp' or 'worker')",
                s
            ))),
        }
    }
}

/// Credentials a worker needs to join an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCredentials {
    pub endpoint: String,
    pub token: String,
    pub discovery_token_hash: String,
}

/// Values supplied explicitly on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub node_type: Option<NodeType>,
    pub hostname: Option<String>,
    pub k8s_version: Option<String>,
    pub pod_cidr: Option<String>,
    pub join_endpoint: Option<String>,
    pub join_token: Option<String>,
    pub discovery_token_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub node_type: NodeType,
    pub hostname: String,
    pub k8s_version: String,
    pub pod_cidr: String,
    pub join_endpoint: Option<String>,
    pub join_token: Option<String>,
    pub discovery_token_hash: Option<String>,
    pub calico_version: String,
    pub readiness: ReadinessSettings,
    pub paths: HostPaths,
}

impl ProvisionConfig {
    /// Merge the sources and validate the result.
    ///
    /// Priority: command line > join descriptor (join fields only) > settings file > defaults.
    pub fn resolve(
        overrides: ConfigOverrides,
        settings: Settings,
        join_descriptor: Option<JoinCredentials>,
    ) -> Result<Self> {
        let node = settings.node;
        let join = settings.join;
        let (desc_endpoint, desc_token, desc_hash) = match join_descriptor {
            Some(c) => (Some(c.endpoint), Some(c.token), Some(c.discovery_token_hash)),
            None => (None, None, None),
        };

        let hostname = overrides
            .hostname
            .or(node.hostname)
            .ok_or_else(|| ProvisionError::config("hostname is required (use --hostname)"))?;

        let k8s_version = overrides
            .k8s_version
            .or(node.k8s_version)
            .unwrap_or_else(|| DEFAULT_K8S_VERSION.to_string());

        let config = Self {
            node_type: overrides.node_type.or(node.node_type).unwrap_or_default(),
            hostname,
            k8s_version: normalize_version(&k8s_version)?,
            pod_cidr: overrides
                .pod_cidr
                .or(node.pod_cidr)
                .unwrap_or_else(|| DEFAULT_POD_CIDR.to_string()),
            join_endpoint: overrides.join_endpoint.or(desc_endpoint).or(join.endpoint),
            join_token: overrides.join_token.or(desc_token).or(join.token),
            discovery_token_hash: overrides
                .discovery_token_hash
                .or(desc_hash)
                .or(join.discovery_token_hash),
            calico_version: settings.cni.calico_version,
            readiness: settings.readiness,
            paths: settings.paths,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_hostname(&self.hostname) {
            return Err(ProvisionError::config(format!(
                "Invalid hostname: '{}'",
                self.hostname
            )));
        }

        normalize_version(&self.k8s_version)?;
        validate_cidr(&self.pod_cidr)?;

        if self.readiness.max_attempts == 0 {
            return Err(ProvisionError::config(
                "readiness.max_attempts must be > 0",
            ));
        }

        if self.node_type == NodeType::Worker {
            let credentials = self.join_credentials()?;
            validate_endpoint(&credentials.endpoint)?;
            validate_discovery_hash(&credentials.discovery_token_hash)?;
        }

        Ok(())
    }

    /// The three join fields, all required to be present and non-empty.
    pub fn join_credentials(&self) -> Result<JoinCredentials> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let endpoint = present(&self.join_endpoint);
        let token = present(&self.join_token);
        let hash = present(&self.discovery_token_hash);

        match (endpoint, token, hash) {
            (Some(endpoint), Some(token), Some(discovery_token_hash)) => Ok(JoinCredentials {
                endpoint,
                token,
                discovery_token_hash,
            }),
            (endpoint, token, hash) => {
                let missing: Vec<&str> = [
                    (endpoint.is_none(), "--join"),
                    (token.is_none(), "--token"),
                    (hash.is_none(), "--discovery-token"),
                ]
                .iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, flag)| *flag)
                .collect();
                Err(ProvisionError::config(format!(
                    "worker nodes require --join, --token and --discovery-token (missing: {})",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Package repository for the pinned Kubernetes minor version.
    pub fn kube_repo_url(&self) -> String {
        format!(
            "{}/v{}/deb/",
            crate::infrastructure::constants::KUBE_REPO_BASE_URL,
            self.k8s_version
        )
    }
}

#[cfg(test)]
impl ProvisionConfig {
    /// Control-plane config whose host files all live under `root`.
    pub(crate) fn for_tests(root: &std::path::Path) -> Self {
        Self {
            node_type: NodeType::ControlPlane,
            hostname: "node-a".to_string(),
            k8s_version: DEFAULT_K8S_VERSION.to_string(),
            pod_cidr: DEFAULT_POD_CIDR.to_string(),
            join_endpoint: None,
            join_token: None,
            discovery_token_hash: None,
            calico_version: crate::infrastructure::constants::DEFAULT_CALICO_VERSION.to_string(),
            readiness: ReadinessSettings {
                max_attempts: 3,
                interval_secs: 0,
                probe: Default::default(),
            },
            paths: HostPaths::rooted(root),
        }
    }
}

/// Accepts `1.31` or `v1.31`, returns `1.31`.
pub fn normalize_version(version: &str) -> Result<String> {
    let trimmed = version.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let re = Regex::new(r"^\d+\.\d+$")
        .map_err(|e| ProvisionError::config(e.to_string()))?;
    if re.is_match(stripped) {
        Ok(stripped.to_string())
    } else {
        Err(ProvisionError::config(format!(
            "Invalid Kubernetes version: '{}' (expected MAJOR.MINOR, e.g. 1.31)",
            version
        )))
    }
}

pub fn validate_cidr(cidr: &str) -> Result<()> {
    let invalid = || ProvisionError::config(format!("Invalid pod CIDR: '{}'", cidr));

    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

/// `host:port` or `[v6addr]:port`
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let invalid = || {
        ProvisionError::config(format!(
            "Invalid join endpoint: '{}' (expected host:port)",
            endpoint
        ))
    };

    let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(invalid()),
    }
}

/// `sha256:` followed by a hex digest
pub fn validate_discovery_hash(hash: &str) -> Result<()> {
    let digest = hash.strip_prefix("sha256:").unwrap_or("");
    if !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ProvisionError::config(format!(
            "Invalid discovery token hash: '{}' (expected sha256:<hex>)",
            hash
        )))
    }
}

/// RFC 1123 host name: dot-separated labels of lowercase alphanumerics and '-'.
pub(crate) fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().next().unwrap_or(' ').is_ascii_alphanumeric()
            && label.chars().last().unwrap_or(' ').is_ascii_alphanumeric()
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "sha256:5bd6d3e9a0b3c6f1e2d4a7b8c9d0e1f2a3b4c5d6e7f8091a2b3c4d5e6f708192";

    fn cp_overrides(hostname: &str) -> ConfigOverrides {
        ConfigOverrides {
            node_type: Some(NodeType::ControlPlane),
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config =
            ProvisionConfig::resolve(cp_overrides("node-a"), Settings::default(), None).unwrap();
        assert_eq!(config.node_type, NodeType::ControlPlane);
        assert_eq!(config.hostname, "node-a");
        assert_eq!(config.k8s_version, "1.31");
        assert_eq!(config.pod_cidr, "192.168.0.0/16");
        assert_eq!(
            config.kube_repo_url(),
            "https://pkgs.k8s.io/core:/stable:/v1.31/deb/"
        );
    }

    #[test]
    fn test_node_type_defaults_to_control_plane() {
        let overrides = ConfigOverrides {
            hostname: Some("node-a".to_string()),
            ..Default::default()
        };
        let config = ProvisionConfig::resolve(overrides, Settings::default(), None).unwrap();
        assert_eq!(config.node_type, NodeType::ControlPlane);
    }

    #[test]
    fn test_hostname_required() {
        let err = ProvisionConfig::resolve(ConfigOverrides::default(), Settings::default(), None)
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("--hostname"));
    }

    #[test]
    fn test_command_line_beats_settings_file() {
        let mut settings = Settings::default();
        settings.node.hostname = Some("from-file".to_string());
        settings.node.pod_cidr = Some("10.0.0.0/8".to_string());
        settings.node.k8s_version = Some("1.29".to_string());

        let mut overrides = cp_overrides("from-cli");
        overrides.k8s_version = Some("v1.30".to_string());

        let config = ProvisionConfig::resolve(overrides, settings, None).unwrap();
        assert_eq!(config.hostname, "from-cli");
        assert_eq!(config.k8s_version, "1.30");
        assert_eq!(config.pod_cidr, "10.0.0.0/8");
    }

    #[test]
    fn test_worker_requires_all_join_fields() {
        let full = ConfigOverrides {
            node_type: Some(NodeType::Worker),
            hostname: Some("node-b".to_string()),
            join_endpoint: Some("10.0.0.1:6443".to_string()),
            join_token: Some("abc.def".to_string()),
            discovery_token_hash: Some(HASH.to_string()),
            ..Default::default()
        };
        assert!(ProvisionConfig::resolve(full.clone(), Settings::default(), None).is_ok());

        let mut no_endpoint = full.clone();
        no_endpoint.join_endpoint = None;
        let err = ProvisionConfig::resolve(no_endpoint, Settings::default(), None).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("missing: --join"));

        let mut empty_token = full.clone();
        empty_token.join_token = Some("  ".to_string());
        let err = ProvisionConfig::resolve(empty_token, Settings::default(), None).unwrap_err();
        assert!(err.to_string().contains("missing: --token"));

        let mut no_hash = full;
        no_hash.discovery_token_hash = None;
        let err = ProvisionConfig::resolve(no_hash, Settings::default(), None).unwrap_err();
        assert!(err.to_string().contains("missing: --discovery-token"));
    }

    #[test]
    fn test_join_descriptor_fills_gaps() {
        let overrides = ConfigOverrides {
            node_type: Some(NodeType::Worker),
            hostname: Some("node-b".to_string()),
            join_token: Some("override.token".to_string()),
            ..Default::default()
        };
        let descriptor = JoinCredentials {
            endpoint: "10.0.0.1:6443".to_string(),
            token: "abc.def".to_string(),
            discovery_token_hash: HASH.to_string(),
        };
        let config =
            ProvisionConfig::resolve(overrides, Settings::default(), Some(descriptor)).unwrap();
        let credentials = config.join_credentials().unwrap();
        assert_eq!(credentials.endpoint, "10.0.0.1:6443");
        assert_eq!(credentials.token, "override.token");
        assert_eq!(credentials.discovery_token_hash, HASH);
    }

    #[test]
    fn test_control_plane_ignores_join_fields() {
        let config =
            ProvisionConfig::resolve(cp_overrides("node-a"), Settings::default(), None).unwrap();
        assert!(config.join_credentials().is_err());
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("1.31").unwrap(), "1.31");
        assert_eq!(normalize_version("v1.29").unwrap(), "1.29");
        assert!(normalize_version("1.31.2").is_err());
        assert!(normalize_version("latest").is_err());
        assert!(normalize_version("").is_err());
    }

    #[test]
    fn test_validate_cidr() {
        assert!(validate_cidr("192.168.0.0/16").is_ok());
        assert!(validate_cidr("fd00:10:244::/56").is_ok());
        assert!(validate_cidr("192.168.0.0").is_err());
        assert!(validate_cidr("192.168.0.0/33").is_err());
        assert!(validate_cidr("not-an-ip/16").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("10.0.0.1:6443").is_ok());
        assert!(validate_endpoint("cp.example.internal:6443").is_ok());
        assert!(validate_endpoint("[fd00::1]:6443").is_ok());
        assert!(validate_endpoint("10.0.0.1").is_err());
        assert!(validate_endpoint(":6443").is_err());
        assert!(validate_endpoint("10.0.0.1:0").is_err());
    }

    #[test]
    fn test_validate_discovery_hash() {
        assert!(validate_discovery_hash(HASH).is_ok());
        assert!(validate_discovery_hash("sha256:").is_err());
        assert!(validate_discovery_hash("md5:abcd").is_err());
        assert!(validate_discovery_hash("sha256:xyz").is_err());
    }

    #[test]
    fn test_hostname_validation() {
        assert!(is_valid_hostname("node-a"));
        assert!(is_valid_hostname("worker-01.lab.internal"));
        assert!(!is_valid_hostname("Node-A"));
        assert!(!is_valid_hostname("-node"));
        assert!(!is_valid_hostname("node..a"));
        assert!(!is_valid_hostname(&"a".repeat(64)));
    }

    #[test]
    fn test_node_type_parse() {
        assert_eq!("cp".parse::<NodeType>().unwrap(), NodeType::ControlPlane);
        assert_eq!("worker".parse::<NodeType>().unwrap(), NodeType::Worker);
        assert!("master".parse::<NodeType>().is_err());
    }
}
