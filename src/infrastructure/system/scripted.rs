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

//! In-memory [`CommandRunner`] that answers from a script and records every
//! invocation. Commands without a matching rule succeed with empty output.

use super::command::{CommandOutput, CommandRunner, HostCommand};
use crate::shared::error::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

struct Rule {
    prefix: String,
    responses: VecDeque<CommandOutput>,
}

impl Rule {
    /// Pops responses in order; the last one repeats forever.
    fn next(&mut self) -> CommandOutput {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_default()
        } else {
            self.responses.front().cloned().unwrap_or_default()
        }
    }
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<HostCommand>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command whose command line starts with `prefix`.
    /// Rules added later take precedence.
    pub fn respond(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.respond_sequence(prefix, vec![output])
    }

    pub fn respond_sequence(
        self,
        prefix: impl Into<String>,
        outputs: Vec<CommandOutput>,
    ) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                prefix: prefix.into(),
                responses: outputs.into(),
            });
        }
        self
    }

    pub fn fail(self, prefix: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        self.respond(prefix, CommandOutput::failure(code, stderr))
    }

    pub fn history(&self) -> Vec<HostCommand> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.history().iter().map(HostCommand::command_line).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    /// Position of the first command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.command_lines()
            .iter()
            .position(|line| line.starts_with(prefix))
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, command: &HostCommand) -> Result<CommandOutput> {
        let line = command.command_line();
        if let Ok(mut history) = self.history.lock() {
            history.push(command.clone());
        }

        let output = match self.rules.lock() {
            Ok(mut rules) => rules
                .iter_mut()
                .rev()
                .find(|rule| line.starts_with(&rule.prefix))
                .map(Rule::next)
                .unwrap_or_else(|| CommandOutput::success("")),
            Err(_) => CommandOutput::success(""),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_commands_succeed() {
        let runner = ScriptedRunner::new();
        let output = runner.run(&HostCommand::new("swapoff").arg("-a")).await.unwrap();
        assert!(output.is_success());
        assert_eq!(runner.command_lines(), vec!["swapoff -a"]);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last_response() {
        let runner = ScriptedRunner::new().respond_sequence(
            "kubectl",
            vec![CommandOutput::failure(1, "refused"), CommandOutput::success("ok")],
        );
        let cmd = HostCommand::new("kubectl").arg("cluster-info");
        assert_eq!(runner.execute(&cmd).await.unwrap().code, Some(1));
        assert!(runner.execute(&cmd).await.unwrap().is_success());
        assert!(runner.execute(&cmd).await.unwrap().is_success());
        assert_eq!(runner.count("kubectl cluster-info"), 3);
    }

    #[tokio::test]
    async fn test_later_rules_take_precedence() {
        let runner = ScriptedRunner::new()
            .respond("kubeadm", CommandOutput::success("generic"))
            .fail("kubeadm init", 1, "boom");
        assert!(runner.run(&HostCommand::new("kubeadm").arg("init")).await.is_err());
        assert_eq!(
            runner
                .run(&HostCommand::new("kubeadm").arg("version"))
                .await
                .unwrap()
                .stdout,
            "generic"
        );
    }
}
