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

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported OS version '{found}' (supported: {supported})")]
    UnsupportedOs { found: String, supported: String },

    #[error("Failed to execute command '{cmd}': {source}")]
    CommandLaunch {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Command failed with {}: {cmd}{}", exit_label(.code), stderr_suffix(.stderr))]
    CommandFailed {
        cmd: String,
        code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Kubernetes API error: {0}")]
    Kube(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<kube::Error> for ProvisionError {
    fn from(err: kube::Error) -> Self {
        ProvisionError::Kube(err.to_string())
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(s) if !s.is_empty() => format!("\n  stderr: {}", s),
        _ => String::new(),
    }
}

impl ProvisionError {
    pub fn config(context: impl Into<String>) -> Self {
        Self::Config(context.into())
    }

    pub fn manifest(context: impl Into<String>) -> Self {
        Self::Manifest(context.into())
    }

    /// True for errors caused by the invocation itself rather than the host.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
