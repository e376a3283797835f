// CLI command definitions

use super::provision::ProvisionCommand;
use clap::{CommandFactory, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "kube-node-setup",
    version,
    about = "Provision an Ubuntu host as a Kubernetes control-plane or worker node",
    long_about = "Prepares the host (hostname, swap, kernel modules, sysctl), installs containerd and the \
                  version-pinned Kubernetes tools, then either bootstraps a control plane with Calico \
                  or joins an existing cluster as a worker.",
    args_override_self = true
)]
pub struct CliArgs {
    #[command(flatten)]
    pub provision: ProvisionCommand,
}

/// The one-line usage summary, re-printed after configuration errors.
pub fn usage() -> String {
    CliArgs::command().render_usage().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::NodeType;

    #[test]
    fn test_parse_control_plane() {
        let args = CliArgs::try_parse_from([
            "kube-node-setup",
            "--node_type",
            "cp",
            "--hostname",
            "node-a",
        ])
        .unwrap();
        assert_eq!(args.provision.node_type, Some(NodeType::ControlPlane));
        assert_eq!(args.provision.hostname.as_deref(), Some("node-a"));
        assert!(args.provision.k8s_version.is_none());
    }

    #[test]
    fn test_parse_worker_flags() {
        let args = CliArgs::try_parse_from([
            "kube-node-setup",
            "--node_type",
            "worker",
            "--hostname",
            "node-b",
            "--join",
            "10.0.0.1:6443",
            "--token",
            "abc.def",
            "--discovery-token",
            "sha256:aabb",
        ])
        .unwrap();
        let overrides = args.provision.overrides();
        assert_eq!(overrides.node_type, Some(NodeType::Worker));
        assert_eq!(overrides.join_endpoint.as_deref(), Some("10.0.0.1:6443"));
        assert_eq!(overrides.join_token.as_deref(), Some("abc.def"));
        assert_eq!(overrides.discovery_token_hash.as_deref(), Some("sha256:aabb"));
    }

    #[test]
    fn test_last_flag_wins() {
        let args = CliArgs::try_parse_from([
            "kube-node-setup",
            "--hostname",
            "first",
            "--hostname",
            "second",
        ])
        .unwrap();
        assert_eq!(args.provision.hostname.as_deref(), Some("second"));
    }

    #[test]
    fn test_help_anywhere() {
        let err = CliArgs::try_parse_from(["kube-node-setup", "--hostname", "node-a", "--help"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());

        let err = CliArgs::try_parse_from(["kube-node-setup", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_rejects_unknown_node_type() {
        let err = CliArgs::try_parse_from(["kube-node-setup", "--node_type", "master"])
            .unwrap_err();
        assert!(err.use_stderr());
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_usage_lists_flags() {
        let usage = usage();
        assert!(usage.contains("kube-node-setup"));
        assert!(usage.contains("[OPTIONS]"));
    }

    #[test]
    fn test_rejects_unknown_flag() {
        assert!(CliArgs::try_parse_from(["kube-node-setup", "--bogus"]).is_err());
    }
}
