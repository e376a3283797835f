//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::node::{ProvisionReport, StepStatus};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    /// Create a new table renderer with default theme
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    /// Render the per-step outcome of a provisioning run
    pub fn render_report(&self, title: &str, report: &ProvisionReport) -> String {
        if report.steps.is_empty() {
            return "No provisioning steps were run".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").set_alignment(CellAlignment::Right),
                Cell::new("STEP").set_alignment(CellAlignment::Left),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("TIME").set_alignment(CellAlignment::Right),
                Cell::new("DETAIL").set_alignment(CellAlignment::Left),
            ]);

        for (index, step) in report.steps.iter().enumerate() {
            let detail = match &step.status {
                StepStatus::Done => String::new(),
                StepStatus::Warned(reason) | StepStatus::Failed(reason) => first_line(reason),
            };
            table.add_row(vec![
                Cell::new(index + 1).set_alignment(CellAlignment::Right),
                Cell::new(step.name),
                Cell::new(format!(
                    "{} {}",
                    StatusIcon::get_step_icon(&step.status),
                    StatusIcon::get_status_text(&step.status)
                ))
                .fg(self.theme.get_step_color(&step.status)),
                Cell::new(format!("{:.1}s", step.elapsed.as_secs_f64()))
                    .fg(self.theme.muted)
                    .set_alignment(CellAlignment::Right),
                Cell::new(detail),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ {} {} ─╮\n",
            title,
            format!(
                "[{} steps, {:.1}s]",
                report.steps.len(),
                report.total_elapsed().as_secs_f64()
            )
            .bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Legend: {} Done  {} Warning  {} Failed\n",
            StatusIcon::SUCCESS.green(),
            StatusIcon::WARNING.yellow(),
            StatusIcon::ERROR.red()
        ));

        output
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::StepReport;
    use std::time::Duration;

    #[test]
    fn test_render_empty_report() {
        let renderer = TableRenderer::new();
        let output = renderer.render_report("node-a", &ProvisionReport::new());
        assert!(output.contains("No provisioning steps were run"));
    }

    #[test]
    fn test_render_steps() {
        let renderer = TableRenderer::new();
        let mut report = ProvisionReport::new();
        report.steps = vec![
            StepReport {
                name: "hostname",
                status: StepStatus::Done,
                elapsed: Duration::from_millis(120),
            },
            StepReport {
                name: "swap",
                status: StepStatus::Warned("swapoff failed\n  stderr: busy".to_string()),
                elapsed: Duration::from_millis(5),
            },
            StepReport {
                name: "kubeadm-init",
                status: StepStatus::Failed("Command failed with exit code 1".to_string()),
                elapsed: Duration::from_secs(3),
            },
        ];

        let output = renderer.render_report("node-a", &report);
        assert!(output.contains("node-a"));
        assert!(output.contains("hostname"));
        assert!(output.contains("swapoff failed"));
        assert!(!output.contains("stderr: busy"));
        assert!(output.contains("kubeadm-init"));
        assert!(output.contains("3.0s"));
    }
}
