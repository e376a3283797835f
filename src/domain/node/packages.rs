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

//! System packages, container runtime and the version-pinned Kubernetes tools

use crate::domain::config::ProvisionConfig;
use crate::domain::node::report::ProvisionReport;
use crate::infrastructure::constants::{BASE_PACKAGES, CONTAINER_RUNTIME_PACKAGE, KUBE_PACKAGES};
use crate::infrastructure::system::{files, CommandRunner, HostCommand};
use crate::shared::error::{ProvisionError, Result};
use std::fs;
use toml::{Table, Value};
use tracing::info;

pub struct PackageInstaller<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(config: &'a ProvisionConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    pub async fn install(&self, report: &mut ProvisionReport) -> Result<()> {
        report.track("system-packages", self.upgrade_system()).await?;
        report
            .track("container-runtime", self.install_container_runtime())
            .await?;
        report.track("kube-tools", self.install_kube_tools()).await?;
        Ok(())
    }

    fn apt_get(&self) -> HostCommand {
        HostCommand::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }

    pub async fn upgrade_system(&self) -> Result<()> {
        info!("Refreshing package index and upgrading system packages");
        self.runner.run(&self.apt_get().arg("update")).await?;
        self.runner
            .run(&self.apt_get().args(["upgrade", "-y"]))
            .await?;
        Ok(())
    }

    pub async fn install_container_runtime(&self) -> Result<()> {
        info!("Installing {}", CONTAINER_RUNTIME_PACKAGE);
        self.runner
            .run(
                &self
                    .apt_get()
                    .args(["install", "-y"])
                    .args(BASE_PACKAGES.iter().copied())
                    .arg(CONTAINER_RUNTIME_PACKAGE),
            )
            .await?;

        let defaults = self
            .runner
            .run(&HostCommand::new("containerd").args(["config", "default"]))
            .await?;
        let patched = enable_systemd_cgroup(&defaults.stdout)?;

        let path = &self.config.paths.containerd_config;
        if files::write_if_changed(path, &patched)? {
            info!("Wrote {} with SystemdCgroup = true", path.display());
        }

        self.runner
            .run(&HostCommand::new("systemctl").args(["restart", CONTAINER_RUNTIME_PACKAGE]))
            .await?;
        self.runner
            .run(&HostCommand::new("systemctl").args(["enable", CONTAINER_RUNTIME_PACKAGE]))
            .await?;
        Ok(())
    }

    pub async fn install_kube_tools(&self) -> Result<()> {
        let repo_url = self.config.kube_repo_url();
        let keyring = &self.config.paths.apt_keyring;
        info!("Adding Kubernetes package repository {}", repo_url);

        if let Some(parent) = keyring.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = self
            .runner
            .run(
                &HostCommand::new("curl")
                    .arg("-fsSL")
                    .arg(format!("{}Release.key", repo_url)),
            )
            .await?;
        self.runner
            .run(
                &HostCommand::new("gpg")
                    .args(["--dearmor", "--yes", "-o"])
                    .arg(keyring.display().to_string())
                    .stdin(key.stdout),
            )
            .await?;

        let sources = format!("deb [signed-by={}] {} /\n", keyring.display(), repo_url);
        files::write_if_changed(&self.config.paths.apt_sources, &sources)?;

        info!("Installing {}", KUBE_PACKAGES.join(", "));
        self.runner.run(&self.apt_get().arg("update")).await?;
        self.runner
            .run(
                &self
                    .apt_get()
                    .args(["install", "-y"])
                    .args(KUBE_PACKAGES.iter().copied()),
            )
            .await?;
        self.runner
            .run(
                &HostCommand::new("apt-mark")
                    .arg("hold")
                    .args(KUBE_PACKAGES.iter().copied()),
            )
            .await?;
        self.runner
            .run(&HostCommand::new("systemctl").args(["enable", "--now", "kubelet"]))
            .await?;
        Ok(())
    }
}

/// Set `SystemdCgroup = true` on every runc runtime in a containerd config.
///
/// kubeadm configures the kubelet for the systemd cgroup driver; a runtime on
/// cgroupfs makes the control plane pods crash-loop.
pub fn enable_systemd_cgroup(config: &str) -> Result<String> {
    let mut table: Table = config.parse()?;
    let mut patched = 0;
    let mut path = Vec::new();
    patch_runc_options(&mut table, &mut path, &mut patched);

    if patched == 0 {
        return Err(ProvisionError::config(
            "containerd config has no runtimes.runc.options table to set SystemdCgroup on",
        ));
    }
    Ok(toml::to_string(&table)?)
}

fn patch_runc_options(table: &mut Table, path: &mut Vec<String>, patched: &mut usize) {
    for (key, value) in table.iter_mut() {
        if let Value::Table(child) = value {
            path.push(key.clone());
            let n = path.len();
            if n >= 3
                && path[n - 3] == "runtimes"
                && path[n - 2] == "runc"
                && path[n - 1] == "options"
            {
                child.insert("SystemdCgroup".to_string(), Value::Boolean(true));
                *patched += 1;
            }
            patch_runc_options(child, path, patched);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINERD_V1_DEFAULTS: &str = r#"
version = 2
root = "/var/lib/containerd"

[plugins]
  [plugins."io.containerd.grpc.v1.cri"]
    sandbox_image = "registry.k8s.io/pause:3.8"
    [plugins."io.containerd.grpc.v1.cri".containerd]
      default_runtime_name = "runc"
      [plugins."io.containerd.grpc.v1.cri".containerd.runtimes]
        [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc]
          runtime_type = "io.containerd.runc.v2"
          [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc.options]
            BinaryName = ""
            SystemdCgroup = false
"#;

    const CONTAINERD_V2_DEFAULTS: &str = r#"
version = 3

[plugins]
  [plugins."io.containerd.cri.v1.runtime".containerd.runtimes.runc]
    runtime_type = "io.containerd.runc.v2"
    [plugins."io.containerd.cri.v1.runtime".containerd.runtimes.runc.options]
      BinaryName = ""
"#;

    fn systemd_cgroup(config: &str, plugin: &str) -> Option<bool> {
        let table: Table = config.parse().unwrap();
        table["plugins"][plugin]["containerd"]["runtimes"]["runc"]["options"]
            .get("SystemdCgroup")
            .and_then(Value::as_bool)
    }

    #[test]
    fn test_enable_systemd_cgroup() {
        let patched = enable_systemd_cgroup(CONTAINERD_V1_DEFAULTS).unwrap();
        assert_eq!(systemd_cgroup(&patched, "io.containerd.grpc.v1.cri"), Some(true));

        let table: Table = patched.parse().unwrap();
        assert_eq!(table["root"].as_str(), Some("/var/lib/containerd"));
        assert_eq!(
            table["plugins"]["io.containerd.grpc.v1.cri"]["sandbox_image"].as_str(),
            Some("registry.k8s.io/pause:3.8")
        );
    }

    #[test]
    fn test_enable_systemd_cgroup_when_key_absent() {
        let patched = enable_systemd_cgroup(CONTAINERD_V2_DEFAULTS).unwrap();
        assert_eq!(systemd_cgroup(&patched, "io.containerd.cri.v1.runtime"), Some(true));
    }

    #[test]
    fn test_enable_systemd_cgroup_requires_runc_table() {
        assert!(enable_systemd_cgroup("version = 2\n").is_err());
        assert!(enable_systemd_cgroup("not toml [").is_err());
    }
}
