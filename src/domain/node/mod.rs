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

//! Node provisioning steps

pub mod cni;
pub mod host;
pub mod initializer;
pub mod join;
pub mod packages;
pub mod preflight;
pub mod provisioner;
pub mod readiness;
pub mod report;

pub use self::join::JoinDescriptor;
pub use self::provisioner::Provisioner;
pub use self::readiness::{ReadinessWaiter, RetryPolicy};
pub use self::report::{ProvisionReport, StepReport, StepStatus};
