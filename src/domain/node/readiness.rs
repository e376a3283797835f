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

//! Bounded wait for a freshly bootstrapped API server

use crate::domain::config::ReadinessSettings;
use crate::infrastructure::kubernetes::ClusterProbe;
use crate::shared::error::{ProvisionError, Result};
use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Fixed-interval retry bounded by a total number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1) as u32
    }
}

impl From<&ReadinessSettings> for RetryPolicy {
    fn from(settings: &ReadinessSettings) -> Self {
        Self::new(settings.max_attempts, settings.interval())
    }
}

/// Retry `op` until it succeeds or `policy.max_attempts` calls have failed,
/// returning the last error in that case.
pub async fn retry_until<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let backoff = ConstantBuilder::default()
        .with_delay(policy.interval)
        .with_max_times(policy.max_attempts.saturating_sub(1));

    op.retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|err: &ProvisionError, after: Duration| {
            debug!("Not ready yet ({}), retrying in {:?}", err, after);
        })
        .await
}

pub struct ReadinessWaiter<'a> {
    probe: &'a dyn ClusterProbe,
    policy: RetryPolicy,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(probe: &'a dyn ClusterProbe, policy: RetryPolicy) -> Self {
        Self { probe, policy }
    }

    /// Returns the number of probes it took. Exhausting the policy is fatal.
    pub async fn wait(&self) -> Result<usize> {
        info!(
            "Waiting for the API server ({} probe, up to {} attempts every {:?})",
            self.probe.name(),
            self.policy.max_attempts,
            self.policy.interval
        );

        let attempts = AtomicUsize::new(0);
        let counter = &attempts;
        let probe = self.probe;
        let result = retry_until(self.policy, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            probe.probe().await
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(()) => {
                info!("API server is ready after {} attempt(s)", attempts);
                Ok(attempts)
            }
            Err(last) => Err(ProvisionError::Timeout(format!(
                "API server did not become ready after {} attempts ({}s): {}",
                attempts,
                self.policy.ceiling().as_secs(),
                last
            ))),
        }
    }
}
