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

//! The linear provisioning sequence
//!
//! preflight -> host preparation -> packages -> node initialization. Every
//! stage runs to completion before the next starts; the first fatal error
//! stops the run.

use crate::domain::config::{ProbeKind, ProvisionConfig};
use crate::domain::node::host::HostPreparer;
use crate::domain::node::initializer::NodeInitializer;
use crate::domain::node::packages::PackageInstaller;
use crate::domain::node::preflight::PreflightValidator;
use crate::domain::node::report::ProvisionReport;
use crate::infrastructure::kubernetes::{ApiServerProbe, ClusterProbe, KubectlProbe};
use crate::infrastructure::system::CommandRunner;
use crate::shared::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct Provisioner {
    config: ProvisionConfig,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn ClusterProbe>,
    home: Option<PathBuf>,
}

impl Provisioner {
    pub fn new(
        config: ProvisionConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn ClusterProbe>,
        home: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
            home,
        }
    }

    /// Use the readiness probe selected in the configuration.
    pub fn with_configured_probe(
        config: ProvisionConfig,
        runner: Arc<dyn CommandRunner>,
        home: Option<PathBuf>,
    ) -> Self {
        let kubeconfig = config.paths.admin_kubeconfig.clone();
        let probe: Arc<dyn ClusterProbe> = match config.readiness.probe {
            ProbeKind::Kubectl => Arc::new(KubectlProbe::new(runner.clone(), kubeconfig)),
            ProbeKind::Api => Arc::new(ApiServerProbe::new(kubeconfig)),
        };
        Self::new(config, runner, probe, home)
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn probe_name(&self) -> &'static str {
        self.probe.name()
    }

    pub async fn run(&self, report: &mut ProvisionReport) -> Result<()> {
        let config = &self.config;
        let runner = self.runner.as_ref();
        info!(
            "Provisioning {} node '{}' (Kubernetes {}, pod CIDR {})",
            config.node_type, config.hostname, config.k8s_version, config.pod_cidr
        );

        let os = report
            .track("preflight", async {
                PreflightValidator::new(&config.paths.os_release).check()
            })
            .await?;
        info!("Detected {} {}", os.id, os.version_id);

        HostPreparer::new(config, runner).prepare(report).await?;
        PackageInstaller::new(config, runner).install(report).await?;
        NodeInitializer::new(config, runner, self.probe.as_ref(), self.home.as_deref())
            .initialize(report)
            .await?;

        info!(
            "{} node '{}' provisioned in {:.1?}",
            config.node_type,
            config.hostname,
            report.total_elapsed()
        );
        Ok(())
    }
}
