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

//! Node-type dispatch: bootstrap a control plane or join an existing cluster

use crate::domain::config::{NodeType, ProvisionConfig};
use crate::domain::node::cni::CniInstaller;
use crate::domain::node::join;
use crate::domain::node::readiness::{ReadinessWaiter, RetryPolicy};
use crate::domain::node::report::ProvisionReport;
use crate::infrastructure::constants::{ENV_KUBECONFIG, SHELL_STARTUP_FILES};
use crate::infrastructure::kubernetes::ClusterProbe;
use crate::infrastructure::system::{files, CommandRunner, HostCommand};
use crate::shared::error::{ProvisionError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Numeric identity of the user running the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invoker {
    pub uid: u32,
    pub gid: u32,
}

impl Invoker {
    pub async fn resolve(runner: &dyn CommandRunner) -> Result<Self> {
        let uid = id_of(runner, "-u").await?;
        let gid = id_of(runner, "-g").await?;
        Ok(Self { uid, gid })
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

async fn id_of(runner: &dyn CommandRunner, flag: &str) -> Result<u32> {
    let output = runner.run(&HostCommand::new("id").arg(flag)).await?;
    output.stdout.trim().parse().map_err(|_| {
        ProvisionError::config(format!(
            "Unexpected output from 'id {}': '{}'",
            flag,
            output.stdout.trim()
        ))
    })
}

pub struct NodeInitializer<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
    probe: &'a dyn ClusterProbe,
    home: Option<&'a Path>,
}

impl<'a> NodeInitializer<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        runner: &'a dyn CommandRunner,
        probe: &'a dyn ClusterProbe,
        home: Option<&'a Path>,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
            home,
        }
    }

    pub async fn initialize(&self, report: &mut ProvisionReport) -> Result<()> {
        match self.config.node_type {
            NodeType::ControlPlane => self.init_control_plane(report).await,
            NodeType::Worker => self.join_cluster(report).await,
        }
    }

    async fn init_control_plane(&self, report: &mut ProvisionReport) -> Result<()> {
        report.track("kubeadm-init", self.bootstrap()).await?;
        report
            .track("admin-kubeconfig", self.configure_admin_credentials())
            .await?;

        let waiter = ReadinessWaiter::new(self.probe, RetryPolicy::from(&self.config.readiness));
        report.track("api-readiness", waiter.wait()).await?;

        let cni = CniInstaller::new(self.config, self.runner);
        report.track("cni", cni.install()).await?;

        let mut descriptor = None;
        report
            .track_best_effort("join-descriptor", async {
                descriptor = Some(join::publish(self.config, self.runner).await?);
                Ok(())
            })
            .await;
        report.join_descriptor = descriptor;
        Ok(())
    }

    async fn join_cluster(&self, report: &mut ProvisionReport) -> Result<()> {
        let credentials = self.config.join_credentials()?;
        report
            .track("kubeadm-join", async {
                info!("Joining cluster at {}", credentials.endpoint);
                self.runner
                    .run(
                        &HostCommand::new("kubeadm")
                            .arg("join")
                            .arg(&credentials.endpoint)
                            .arg("--token")
                            .arg(&credentials.token)
                            .arg("--discovery-token-ca-cert-hash")
                            .arg(&credentials.discovery_token_hash),
                    )
                    .await?;
                Ok(())
            })
            .await
    }

    pub async fn bootstrap(&self) -> Result<()> {
        info!(
            "Initializing control plane with pod network {}",
            self.config.pod_cidr
        );
        self.runner
            .run(
                &HostCommand::new("kubeadm")
                    .arg("init")
                    .arg(format!("--pod-network-cidr={}", self.config.pod_cidr)),
            )
            .await?;
        Ok(())
    }

    /// Root gets `KUBECONFIG` exported from its shell startup files; anyone
    /// else gets a private copy of admin.conf in `~/.kube/config`.
    pub async fn configure_admin_credentials(&self) -> Result<()> {
        let invoker = Invoker::resolve(self.runner).await?;
        let admin = &self.config.paths.admin_kubeconfig;

        if invoker.is_root() {
            let home = self.home.unwrap_or_else(|| Path::new("/root"));
            let line = format!("export {}={}", ENV_KUBECONFIG, admin.display());
            for file in SHELL_STARTUP_FILES {
                let path = home.join(file);
                if files::append_line_if_absent(&path, &line)? {
                    info!("Added {} to {}", ENV_KUBECONFIG, path.display());
                }
            }
            return Ok(());
        }

        let home = self.home.ok_or_else(|| {
            ProvisionError::config("Cannot resolve the home directory of the invoking user")
        })?;
        if !home.is_dir() {
            return Err(ProvisionError::config(format!(
                "Home directory {} does not exist",
                home.display()
            )));
        }

        let target = user_kubeconfig(home);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::copy(admin, &target)?;
        self.runner
            .run(
                &HostCommand::new("chown")
                    .arg(format!("{}:{}", invoker.uid, invoker.gid))
                    .arg(target.display().to_string()),
            )
            .await?;
        info!("Copied {} to {}", admin.display(), target.display());
        Ok(())
    }
}

pub fn user_kubeconfig(home: &Path) -> PathBuf {
    home.join(".kube").join("config")
}
