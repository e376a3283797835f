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

//! Calico installation: tigera operator first, then the custom resources
//! with their default IP pool rewritten to the configured pod CIDR.

use crate::domain::config::ProvisionConfig;
use crate::infrastructure::constants::{
    CALICO_CUSTOM_RESOURCES_MANIFEST, CALICO_INSTALLATION_KIND, CALICO_MANIFEST_BASE_URL,
    CALICO_OPERATOR_MANIFEST,
};
use crate::infrastructure::system::{CommandRunner, HostCommand};
use crate::shared::error::{ProvisionError, Result};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

pub fn manifest_url(calico_version: &str, file: &str) -> String {
    format!(
        "{}/{}/manifests/{}",
        CALICO_MANIFEST_BASE_URL, calico_version, file
    )
}

/// Set `spec.calicoNetwork.ipPools[*].cidr` on every `Installation` document
/// of a multi-document manifest. Patching nothing is an error.
pub fn patch_pod_cidr(manifest: &str, pod_cidr: &str) -> Result<String> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }

    let mut patched = 0;
    for document in documents.iter_mut() {
        if document.get("kind").and_then(Value::as_str) != Some(CALICO_INSTALLATION_KIND) {
            continue;
        }
        let pools = document
            .get_mut("spec")
            .and_then(|spec| spec.get_mut("calicoNetwork"))
            .and_then(|network| network.get_mut("ipPools"))
            .and_then(Value::as_sequence_mut);
        for pool in pools.into_iter().flatten() {
            if let Some(pool) = pool.as_mapping_mut() {
                pool.insert(Value::from("cidr"), Value::from(pod_cidr));
                patched += 1;
            }
        }
    }

    if patched == 0 {
        return Err(ProvisionError::manifest(format!(
            "no {} ipPools found to set cidr {}",
            CALICO_INSTALLATION_KIND, pod_cidr
        )));
    }

    let mut rendered = Vec::with_capacity(documents.len());
    for document in &documents {
        rendered.push(serde_yaml::to_string(document)?);
    }
    Ok(rendered.join("---\n"))
}

pub struct CniInstaller<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> CniInstaller<'a> {
    pub fn new(config: &'a ProvisionConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    fn kubectl(&self) -> HostCommand {
        HostCommand::new("kubectl")
            .arg("--kubeconfig")
            .arg(self.config.paths.admin_kubeconfig.display().to_string())
    }

    pub async fn install(&self) -> Result<()> {
        let version = &self.config.calico_version;

        let operator = manifest_url(version, CALICO_OPERATOR_MANIFEST);
        info!("Installing Calico operator {}", version);
        self.runner
            .run(&self.kubectl().args(["create", "-f"]).arg(operator))
            .await?;

        let resources_url = manifest_url(version, CALICO_CUSTOM_RESOURCES_MANIFEST);
        let resources = self
            .runner
            .run(&HostCommand::new("curl").arg("-fsSL").arg(resources_url))
            .await?;
        let patched = patch_pod_cidr(&resources.stdout, &self.config.pod_cidr)?;

        info!(
            "Applying Calico custom resources with pod CIDR {}",
            self.config.pod_cidr
        );
        self.runner
            .run(&self.kubectl().args(["create", "-f", "-"]).stdin(patched))
            .await?;
        Ok(())
    }
}
