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

#![allow(dead_code)]

use clap::Parser;
use kube_node_setup::cli::CliArgs;
use kube_node_setup::domain::config::{HostPaths, Settings};
use kube_node_setup::infrastructure::system::{CommandOutput, ScriptedRunner};
use std::fs;
use std::path::{Path, PathBuf};

pub const DISCOVERY_HASH: &str =
    "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

pub const CONTAINERD_DEFAULTS: &str = r#"
version = 2

[plugins]
  [plugins."io.containerd.grpc.v1.cri"]
    [plugins."io.containerd.grpc.v1.cri".containerd]
      default_runtime_name = "runc"
      [plugins."io.containerd.grpc.v1.cri".containerd.runtimes]
        [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc]
          runtime_type = "io.containerd.runc.v2"
          [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc.options]
            SystemdCgroup = false
"#;

pub const CUSTOM_RESOURCES: &str = r#"---
apiVersion: operator.tigera.io/v1
kind: Installation
metadata:
  name: default
spec:
  calicoNetwork:
    ipPools:
    - name: default-ipv4-ippool
      blockSize: 26
      cidr: 192.168.0.0/16
      encapsulation: VXLANCrossSubnet
      natOutgoing: Enabled
      nodeSelector: all()
---
apiVersion: operator.tigera.io/v1
kind: APIServer
metadata:
  name: default
spec: {}
"#;

/// A throwaway filesystem root standing in for the host.
pub struct Scratch {
    pub dir: tempfile::TempDir,
}

impl Scratch {
    pub fn ubuntu(version: &str) -> Self {
        let scratch = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        scratch.write_os_release("ubuntu", version);
        scratch.write(
            "etc/fstab",
            "UUID=abcd / ext4 defaults 0 1\n/swap.img none swap sw 0 0\n",
        );
        fs::create_dir_all(scratch.home()).unwrap();
        scratch
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn home(&self) -> PathBuf {
        self.root().join("root")
    }

    pub fn paths(&self) -> HostPaths {
        HostPaths::rooted(self.root())
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    pub fn write_os_release(&self, id: &str, version: &str) {
        self.write(
            "etc/os-release",
            &format!("NAME=\"{id}\"\nID={id}\nVERSION_ID=\"{version}\"\n"),
        );
    }

    /// Defaults relocated under the scratch root, with a fast readiness loop.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.paths = self.paths();
        settings.readiness.max_attempts = 3;
        settings.readiness.interval_secs = 0;
        settings
    }
}

pub fn parse(args: &[&str]) -> CliArgs {
    let mut argv = vec!["kube-node-setup"];
    argv.extend_from_slice(args);
    CliArgs::try_parse_from(argv).unwrap()
}

pub fn join_command(endpoint: &str, token: &str) -> String {
    format!(
        "kubeadm join {} --token {} \\\n\t--discovery-token-ca-cert-hash {}\n",
        endpoint, token, DISCOVERY_HASH
    )
}

/// Delegated tools answer the way they do on a healthy root session.
pub fn healthy_host() -> ScriptedRunner {
    ScriptedRunner::new()
        .respond("id -u", CommandOutput::success("0\n"))
        .respond("id -g", CommandOutput::success("0\n"))
        .respond("containerd config default", CommandOutput::success(CONTAINERD_DEFAULTS))
        .respond(
            "curl -fsSL https://raw.githubusercontent.com/projectcalico",
            CommandOutput::success(CUSTOM_RESOURCES),
        )
        .respond(
            "kubeadm token create",
            CommandOutput::success(join_command("10.0.0.1:6443", "abcdef.0123456789abcdef")),
        )
}
