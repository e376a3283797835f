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

//! API-server reachability probes used while waiting for a fresh control plane

use crate::infrastructure::system::{CommandRunner, HostCommand};
use crate::shared::error::{ProvisionError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[async_trait::async_trait]
pub trait ClusterProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(())` once the API server answers.
    async fn probe(&self) -> Result<()>;
}

/// `kubectl --kubeconfig <admin.conf> cluster-info`
pub struct KubectlProbe {
    runner: Arc<dyn CommandRunner>,
    kubeconfig: PathBuf,
}

impl KubectlProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            kubeconfig: kubeconfig.into(),
        }
    }

    pub fn command(&self) -> HostCommand {
        HostCommand::new("kubectl")
            .arg("--kubeconfig")
            .arg(self.kubeconfig.display().to_string())
            .arg("cluster-info")
    }
}

#[async_trait::async_trait]
impl ClusterProbe for KubectlProbe {
    fn name(&self) -> &'static str {
        "kubectl"
    }

    async fn probe(&self) -> Result<()> {
        self.runner.run(&self.command()).await.map(|_| ())
    }
}

/// Asks the API server for its version through the admin kubeconfig.
pub struct ApiServerProbe {
    kubeconfig: PathBuf,
}

impl ApiServerProbe {
    pub fn new(kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
        }
    }

    async fn client(&self) -> Result<Client> {
        let kubeconfig = Kubeconfig::read_from(&self.kubeconfig).map_err(|e| {
            ProvisionError::Kube(format!(
                "Failed to load kubeconfig {}: {}",
                self.kubeconfig.display(),
                e
            ))
        })?;

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                ProvisionError::Kube(format!("Failed to create Kubernetes config: {}", e))
            })?;

        Client::try_from(config).map_err(|e| {
            ProvisionError::Kube(format!("Failed to create Kubernetes client: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl ClusterProbe for ApiServerProbe {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn probe(&self) -> Result<()> {
        let client = self.client().await?;
        let info: k8s_openapi::apimachinery::pkg::version::Info =
            client.apiserver_version().await?;
        debug!("API server answered with version {}", info.git_version);
        Ok(())
    }
}
