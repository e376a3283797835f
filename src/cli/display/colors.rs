//! Color theme for CLI output

use crate::domain::node::StepStatus;
use comfy_table::Color as TableColor;

/// Color theme for terminal output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: TableColor,
    pub warning: TableColor,
    pub error: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: TableColor::Green,
            warning: TableColor::Yellow,
            error: TableColor::Red,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    /// Get color for a step outcome
    pub fn get_step_color(&self, status: &StepStatus) -> TableColor {
        match status {
            StepStatus::Done => self.success,
            StepStatus::Warned(_) => self.warning,
            StepStatus::Failed(_) => self.error,
        }
    }
}
