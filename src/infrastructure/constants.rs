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

/// Provisioning defaults
pub const DEFAULT_K8S_VERSION: &str = "1.31";
pub const DEFAULT_POD_CIDR: &str = "192.168.0.0/16";
pub const DEFAULT_CALICO_VERSION: &str = "v3.28.0";

/// Ubuntu releases whose package repositories the install steps are known to work against
pub const SUPPORTED_OS_VERSIONS: &[&str] = &["20.04", "22.04", "24.04"];

/// Readiness polling
pub const READINESS_MAX_ATTEMPTS: usize = 150;
pub const READINESS_INTERVAL_SECONDS: u64 = 2;

/// Log sink
pub const LOG_FILE: &str = "/var/log/kube-node-setup.log";
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Host file locations
pub const OS_RELEASE_PATH: &str = "/etc/os-release";
pub const FSTAB_PATH: &str = "/etc/fstab";
pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/k8s.conf";
pub const SYSCTL_CONF_PATH: &str = "/etc/sysctl.d/k8s.conf";
pub const CONTAINERD_CONFIG_PATH: &str = "/etc/containerd/config.toml";
pub const APT_KEYRING_PATH: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";
pub const APT_SOURCES_PATH: &str = "/etc/apt/sources.list.d/kubernetes.list";
pub const ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";
pub const JOIN_DESCRIPTOR_PATH: &str = "/etc/kubernetes/join-descriptor.json";

/// Kernel configuration
pub const KERNEL_MODULES: &[&str] = &["overlay", "br_netfilter"];
pub const SYSCTL_PARAMS: &[(&str, &str)] = &[
    ("net.bridge.bridge-nf-call-iptables", "1"),
    ("net.bridge.bridge-nf-call-ip6tables", "1"),
    ("net.ipv4.ip_forward", "1"),
];

/// Packages
pub const BASE_PACKAGES: &[&str] = &[
    "apt-transport-https",
    "ca-certificates",
    "curl",
    "gpg",
];
pub const CONTAINER_RUNTIME_PACKAGE: &str = "containerd";
pub const KUBE_PACKAGES: &[&str] = &["kubelet", "kubeadm", "kubectl"];
pub const KUBE_REPO_BASE_URL: &str = "https://pkgs.k8s.io/core:/stable:";

/// Calico manifests
pub const CALICO_MANIFEST_BASE_URL: &str =
    "https://raw.githubusercontent.com/projectcalico/calico";
pub const CALICO_OPERATOR_MANIFEST: &str = "tigera-operator.yaml";
pub const CALICO_CUSTOM_RESOURCES_MANIFEST: &str = "custom-resources.yaml";
pub const CALICO_INSTALLATION_KIND: &str = "Installation";

/// Shell startup files that receive the KUBECONFIG export for root
pub const SHELL_STARTUP_FILES: &[&str] = &[".bashrc", ".profile"];

/// Environment variables
pub const ENV_CONF_FILE: &str = "KUBE_NODE_SETUP_CONF";
pub const ENV_HOME: &str = "HOME";
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
