//! Provisioning command

use crate::cli::display::TableRenderer;
use crate::domain::config::{ConfigOverrides, NodeType, ProvisionConfig, Settings};
use crate::domain::node::{JoinDescriptor, ProvisionReport, Provisioner};
use crate::infrastructure::constants::{ENV_CONF_FILE, ENV_HOME};
use crate::infrastructure::system::{CommandRunner, SystemCommandRunner};
use crate::shared::error::ProvisionError;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// True when `err` comes from resolving the configuration, i.e. before the
/// host was touched. Those failures are shown together with the usage line.
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ProvisionError>()
            .is_some_and(ProvisionError::is_config)
    })
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ProvisionCommand {
    /// Node role: `cp` (control plane) or `worker`
    #[arg(long = "node_type", value_name = "cp|worker")]
    pub node_type: Option<NodeType>,

    /// Hostname to assign to this machine
    #[arg(long)]
    pub hostname: Option<String>,

    /// Kubernetes minor version to install, e.g. 1.31
    #[arg(long = "k8s_version", value_name = "VERSION")]
    pub k8s_version: Option<String>,

    /// Pod network CIDR handed to kubeadm and Calico
    #[arg(long = "pod_cidr", value_name = "CIDR")]
    pub pod_cidr: Option<String>,

    /// Control-plane endpoint to join (workers)
    #[arg(long = "join", value_name = "HOST:PORT")]
    pub join: Option<String>,

    /// Bootstrap token (workers)
    #[arg(long)]
    pub token: Option<String>,

    /// Discovery token CA cert hash (workers)
    #[arg(long = "discovery-token", value_name = "sha256:HEX")]
    pub discovery_token: Option<String>,

    /// Path to the settings file (TOML)
    /// If not provided, reads KUBE_NODE_SETUP_CONF; otherwise built-in defaults are used
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Join descriptor written by a control-plane run (workers)
    /// Explicit --join/--token/--discovery-token flags take precedence over its fields
    #[arg(long = "join-file", value_name = "PATH")]
    pub join_file: Option<PathBuf>,
}

impl ProvisionCommand {
    /// Settings file location: --config > KUBE_NODE_SETUP_CONF > none
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(ENV_CONF_FILE).map(PathBuf::from))
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        match self.settings_path() {
            Some(path) => Settings::from(&path)
                .with_context(|| format!("Failed to load settings {}", path.display())),
            None => Ok(Settings::default()),
        }
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            node_type: self.node_type,
            hostname: self.hostname.clone(),
            k8s_version: self.k8s_version.clone(),
            pod_cidr: self.pod_cidr.clone(),
            join_endpoint: self.join.clone(),
            join_token: self.token.clone(),
            discovery_token_hash: self.discovery_token.clone(),
        }
    }

    /// Resolve the final configuration. Nothing on the host is touched yet.
    pub fn resolve(&self, settings: Settings) -> anyhow::Result<ProvisionConfig> {
        let descriptor = match &self.join_file {
            Some(path) => {
                let descriptor = JoinDescriptor::load(path)?;
                info!(
                    "Using join descriptor {} (created {})",
                    path.display(),
                    descriptor.created_at
                );
                Some(descriptor.credentials())
            }
            None => None,
        };

        ProvisionConfig::resolve(self.overrides(), settings, descriptor)
            .context("Invalid configuration")
    }

    pub async fn execute(&self, settings: Settings) -> anyhow::Result<()> {
        let home = std::env::var_os(ENV_HOME).map(PathBuf::from);
        self.execute_with(settings, Arc::new(SystemCommandRunner::new()), home)
            .await
            .map(|_| ())
    }

    /// Run the full sequence with the given command runner and print the step summary.
    pub async fn execute_with(
        &self,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        home: Option<PathBuf>,
    ) -> anyhow::Result<ProvisionReport> {
        match self.settings_path() {
            Some(path) => info!("Using settings from {}", path.display()),
            None => info!("No settings file specified, using defaults"),
        }
        let config = self.resolve(settings)?;
        let title = format!("{} node {}", config.node_type, config.hostname);

        let provisioner = Provisioner::with_configured_probe(config, runner, home);
        let mut report = ProvisionReport::new();
        let result = provisioner.run(&mut report).await;

        println!("{}", TableRenderer::new().render_report(&title, &report));
        if let Some(path) = &report.join_descriptor {
            println!(
                "Join descriptor: {} (pass it to workers with --join-file)",
                path.display()
            );
        }

        result.map_err(|e| anyhow::anyhow!("Provisioning failed: {}", e))?;
        println!("Node {} provisioned successfully!", provisioner.config().hostname);
        Ok(report)
    }
}
