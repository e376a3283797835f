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

//! Per-step outcome record kept while provisioning runs

use crate::shared::error::Result;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    /// Failed, but the step is best-effort and provisioning continued.
    Warned(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: &'static str,
    pub status: StepStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub steps: Vec<StepReport>,
    pub join_descriptor: Option<PathBuf>,
}

impl ProvisionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a fatal step and record its outcome. Errors are passed through.
    pub async fn track<T, F>(&mut self, name: &'static str, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!("==> {}", name);
        let started = Instant::now();
        let result = step.await;
        let status = match &result {
            Ok(_) => StepStatus::Done,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        self.push(name, status, started.elapsed());
        result
    }

    /// Run a best-effort step: a failure is logged and recorded, never returned.
    pub async fn track_best_effort<F>(&mut self, name: &'static str, step: F)
    where
        F: Future<Output = Result<()>>,
    {
        info!("==> {}", name);
        let started = Instant::now();
        let status = match step.await {
            Ok(()) => StepStatus::Done,
            Err(e) => {
                warn!("{} failed, continuing: {}", name, e);
                StepStatus::Warned(e.to_string())
            }
        };
        self.push(name, status, started.elapsed());
    }

    fn push(&mut self, name: &'static str, status: StepStatus, elapsed: Duration) {
        self.steps.push(StepReport {
            name,
            status,
            elapsed,
        });
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    pub fn status_of(&self, name: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.status)
    }

    pub fn failed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    pub fn total_elapsed(&self) -> Duration {
        self.steps.iter().map(|s| s.elapsed).sum()
    }
}
