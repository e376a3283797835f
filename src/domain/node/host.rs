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

//! Host-level preparation: hostname, swap, kernel modules, sysctl
//!
//! Each mutation is idempotent on its own. Swap handling is best-effort;
//! everything else aborts provisioning on failure.

use crate::domain::config::ProvisionConfig;
use crate::domain::node::report::ProvisionReport;
use crate::infrastructure::constants::{KERNEL_MODULES, SYSCTL_PARAMS};
use crate::infrastructure::system::{files, CommandRunner, HostCommand};
use crate::shared::error::Result;
use std::fs;
use tracing::info;

pub struct HostPreparer<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> HostPreparer<'a> {
    pub fn new(config: &'a ProvisionConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    pub async fn prepare(&self, report: &mut ProvisionReport) -> Result<()> {
        report.track("hostname", self.set_hostname()).await?;
        report.track_best_effort("swap", self.disable_swap()).await;
        report.track("kernel-modules", self.load_kernel_modules()).await?;
        report.track("sysctl", self.apply_sysctl()).await?;
        Ok(())
    }

    pub async fn set_hostname(&self) -> Result<()> {
        info!("Setting hostname to {}", self.config.hostname);
        self.runner
            .run(
                &HostCommand::new("hostnamectl")
                    .arg("set-hostname")
                    .arg(&self.config.hostname),
            )
            .await?;
        Ok(())
    }

    /// Turn swap off now and drop swap entries from fstab so it stays off.
    /// The fstab rewrite happens even when `swapoff` fails; the first error
    /// is returned afterwards.
    pub async fn disable_swap(&self) -> Result<()> {
        info!("Disabling swap");
        let runtime = self
            .runner
            .run(&HostCommand::new("swapoff").arg("-a"))
            .await
            .map(|_| ());
        let persistent = self.remove_fstab_swap();
        runtime.and(persistent)
    }

    fn remove_fstab_swap(&self) -> Result<()> {
        let fstab = &self.config.paths.fstab;
        let original = match fs::read_to_string(fstab) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let cleaned = strip_swap_entries(&original);
        if cleaned != original {
            info!("Removing swap entries from {}", fstab.display());
            fs::write(fstab, cleaned)?;
        }
        Ok(())
    }

    pub async fn load_kernel_modules(&self) -> Result<()> {
        let path = &self.config.paths.modules_load;
        if files::write_if_changed(path, &modules_load_config())? {
            info!("Wrote {}", path.display());
        }
        for module in KERNEL_MODULES {
            info!("Loading kernel module: {}", module);
            self.runner
                .run(&HostCommand::new("modprobe").arg(*module))
                .await?;
        }
        Ok(())
    }

    pub async fn apply_sysctl(&self) -> Result<()> {
        let path = &self.config.paths.sysctl_conf;
        if files::write_if_changed(path, &sysctl_config())? {
            info!("Wrote {}", path.display());
        }
        info!("Applying sysctl parameters");
        self.runner
            .run(&HostCommand::new("sysctl").arg("--system"))
            .await?;
        Ok(())
    }
}

pub fn modules_load_config() -> String {
    KERNEL_MODULES.iter().map(|m| format!("{}\n", m)).collect()
}

pub fn sysctl_config() -> String {
    SYSCTL_PARAMS
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, value))
        .collect()
}

/// Remove every uncommented fstab entry whose filesystem type is `swap`.
pub fn strip_swap_entries(fstab: &str) -> String {
    let cleaned = fstab
        .lines()
        .filter(|line| {
            line.trim_start().starts_with('#')
                || line.split_whitespace().nth(2) != Some("swap")
        })
        .collect::<Vec<_>>()
        .join("\n");
    if fstab.ends_with('\n') && !cleaned.is_empty() {
        cleaned + "\n"
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::report::StepStatus;
    use crate::infrastructure::system::ScriptedRunner;

    #[test]
    fn test_strip_swap_entries() {
        let fstab = "\
UUID=1234 / ext4 defaults 0 1
/swap.img none swap sw 0 0
# /swapfile none swap sw 0 0
UUID=5678 /boot ext4 defaults 0 2
";
        assert_eq!(
            strip_swap_entries(fstab),
            "\
UUID=1234 / ext4 defaults 0 1
# /swapfile none swap sw 0 0
UUID=5678 /boot ext4 defaults 0 2
"
        );
    }

    #[test]
    fn test_strip_swap_entries_without_swap_is_identity() {
        let fstab = "UUID=1234 / ext4 defaults 0 1\n";
        assert_eq!(strip_swap_entries(fstab), fstab);
    }

    #[test]
    fn test_kernel_config_contents() {
        assert_eq!(modules_load_config(), "overlay\nbr_netfilter\n");
        assert_eq!(
            sysctl_config(),
            "net.bridge.bridge-nf-call-iptables = 1\n\
             net.bridge.bridge-nf-call-ip6tables = 1\n\
             net.ipv4.ip_forward = 1\n"
        );
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionConfig::for_tests(dir.path());
        fs::create_dir_all(config.paths.fstab.parent().unwrap()).unwrap();
        fs::write(&config.paths.fstab, "/swap.img none swap sw 0 0\n").unwrap();

        let runner = ScriptedRunner::new();
        let preparer = HostPreparer::new(&config, &runner);

        let mut first = ProvisionReport::new();
        preparer.prepare(&mut first).await.unwrap();
        let mut second = ProvisionReport::new();
        preparer.prepare(&mut second).await.unwrap();

        assert!(!first.failed() && !second.failed());
        assert_eq!(fs::read_to_string(&config.paths.fstab).unwrap(), "");
        assert_eq!(
            fs::read_to_string(&config.paths.modules_load).unwrap(),
            "overlay\nbr_netfilter\n"
        );
        assert_eq!(runner.count("hostnamectl set-hostname node-a"), 2);
        assert_eq!(runner.count("modprobe br_netfilter"), 2);
        assert_eq!(runner.count("sysctl --system"), 2);
    }

    #[tokio::test]
    async fn test_swap_failure_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionConfig::for_tests(dir.path());
        fs::create_dir_all(config.paths.fstab.parent().unwrap()).unwrap();
        fs::write(
            &config.paths.fstab,
            "UUID=1 / ext4 defaults 0 1\n/swap.img none swap sw 0 0\n",
        )
        .unwrap();
        let runner = ScriptedRunner::new().fail("swapoff", 255, "swapoff: not permitted");

        let mut report = ProvisionReport::new();
        HostPreparer::new(&config, &runner)
            .prepare(&mut report)
            .await
            .unwrap();

        match report.status_of("swap") {
            Some(StepStatus::Warned(reason)) => assert!(reason.contains("not permitted")),
            other => panic!("expected a warning for swap, got {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(&config.paths.fstab).unwrap(),
            "UUID=1 / ext4 defaults 0 1\n"
        );
        assert!(runner.ran("sysctl --system"));
    }

    #[tokio::test]
    async fn test_sysctl_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionConfig::for_tests(dir.path());
        let runner = ScriptedRunner::new().fail("sysctl", 1, "permission denied");

        let mut report = ProvisionReport::new();
        let result = HostPreparer::new(&config, &runner).prepare(&mut report).await;

        assert!(result.is_err());
        assert!(matches!(report.status_of("sysctl"), Some(StepStatus::Failed(_))));
    }
}
