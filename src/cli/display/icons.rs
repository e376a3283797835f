//! Status icons for CLI output

use crate::domain::node::StepStatus;

/// Status icons for step outcomes
pub struct StatusIcon;

impl StatusIcon {
    /// Step completed
    pub const SUCCESS: &'static str = "✓";

    /// Best-effort step failed, provisioning continued
    pub const WARNING: &'static str = "⚠";

    /// Step failed and stopped provisioning
    pub const ERROR: &'static str = "✗";

    pub fn get_step_icon(status: &StepStatus) -> &'static str {
        match status {
            StepStatus::Done => Self::SUCCESS,
            StepStatus::Warned(_) => Self::WARNING,
            StepStatus::Failed(_) => Self::ERROR,
        }
    }

    pub fn get_status_text(status: &StepStatus) -> &'static str {
        match status {
            StepStatus::Done => "Done",
            StepStatus::Warned(_) => "Warning",
            StepStatus::Failed(_) => "Failed",
        }
    }
}
