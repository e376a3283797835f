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

//! Delegated command execution
//!
//! Every external tool the provisioner drives (`apt-get`, `kubeadm`, `kubectl`,
//! `sysctl`, ...) goes through [`CommandRunner`], so the orchestration can be
//! exercised without touching the host.

use crate::shared::error::{ProvisionError, Result};
use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A single invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Command line as it would be typed, used for logging and matching.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn trimmed_stderr(&self) -> Option<String> {
        let trimmed = self.stderr.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion. Only a failure to launch is an error;
    /// a non-zero exit is reported through [`CommandOutput::code`].
    async fn execute(&self, command: &HostCommand) -> Result<CommandOutput>;

    /// Run the command and treat any non-zero exit as fatal.
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        let output = self.execute(command).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ProvisionError::CommandFailed {
                cmd: command.command_line(),
                code: output.code,
                stderr: output.trimmed_stderr(),
            })
        }
    }
}

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn execute(&self, command: &HostCommand) -> Result<CommandOutput> {
        let cmd_line = command.command_line();
        debug!("Running: {}", cmd_line);

        let mut process = tokio::process::Command::new(&command.program);
        process
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = process
            .spawn()
            .map_err(|source| ProvisionError::CommandLaunch {
                cmd: cmd_line.clone(),
                source,
            })?;

        // Feed stdin from a separate task so a chatty child cannot fill its
        // stdout pipe while we are still writing.
        let writer = match (command.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(input.as_bytes()).await
            })),
            _ => None,
        };

        // Relay output line by line while the child runs, so long steps like
        // `kubeadm init` show progress instead of one burst at exit.
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(relay(out, |line: &str| info!("{}", line))));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(relay(err, |line: &str| warn!("{}", line))));

        let status = child
            .wait()
            .await
            .map_err(|source| ProvisionError::CommandLaunch {
                cmd: cmd_line.clone(),
                source,
            })?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to write stdin of '{}': {}", cmd_line, e),
                Err(e) => warn!("stdin writer for '{}' did not finish: {}", cmd_line, e),
            }
        }

        let output = CommandOutput {
            code: status.code(),
            stdout: captured(stdout, &cmd_line).await,
            stderr: captured(stderr, &cmd_line).await,
        };

        Ok(output)
    }
}

/// Log every non-blank line of `reader` as it arrives and return everything read.
async fn relay<R>(reader: R, log: fn(&str)) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if !line.trim().is_empty() {
            log(line.trim_end());
        }
        collected.push_str(&line);
    }
    Ok(collected)
}

async fn captured(relay: Option<JoinHandle<std::io::Result<String>>>, cmd_line: &str) -> String {
    match relay {
        Some(handle) => match handle.await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Failed to read output of '{}': {}", cmd_line, e);
                String::new()
            }
            Err(e) => {
                warn!("Output reader for '{}' did not finish: {}", cmd_line, e);
                String::new()
            }
        },
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::logging::line_layer;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_subscriber::{layer::SubscriberExt, Registry};

    #[test]
    fn test_command_line() {
        let cmd = HostCommand::new("kubeadm")
            .arg("init")
            .arg("--pod-network-cidr=10.244.0.0/16");
        assert_eq!(cmd.command_line(), "kubeadm init --pod-network-cidr=10.244.0.0/16");
        assert_eq!(HostCommand::new("swapoff").command_line(), "swapoff");
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(&HostCommand::new("sh").args(["-c", "echo ready"]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "ready");
    }

    #[tokio::test]
    async fn test_system_runner_logs_lines_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        let file = Arc::new(fs::File::create(&path).unwrap());
        let _guard = tracing::subscriber::set_default(Registry::default().with(line_layer(file)));

        let run = tokio::spawn(async {
            SystemCommandRunner::new()
                .run(&HostCommand::new("sh").args([
                    "-c",
                    "echo started; echo pulling images >&2; sleep 2; echo done",
                ]))
                .await
        });

        let mut seen_before_exit = false;
        for _ in 0..150 {
            let log = fs::read_to_string(&path).unwrap();
            if log.contains("[INFO] started") && log.contains("[WARN] pulling images") {
                seen_before_exit = !run.is_finished();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen_before_exit);

        let output = run.await.unwrap().unwrap();
        assert_eq!(output.stdout, "started\ndone\n");
        assert_eq!(output.stderr, "pulling images\n");
        assert!(fs::read_to_string(&path).unwrap().contains("[INFO] done"));
    }

    #[tokio::test]
    async fn test_system_runner_feeds_stdin() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(&HostCommand::new("cat").stdin("kind: Installation\n"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "kind: Installation\n");
    }

    #[tokio::test]
    async fn test_system_runner_non_zero_exit() {
        let runner = SystemCommandRunner::new();
        let cmd = HostCommand::new("sh").args(["-c", "echo boom >&2; exit 3"]);

        let output = runner.execute(&cmd).await.unwrap();
        assert_eq!(output.code, Some(3));

        match runner.run(&cmd).await {
            Err(ProvisionError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.as_deref(), Some("boom"));
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::new();
        let result = runner
            .execute(&HostCommand::new("definitely-not-a-real-binary-xyz"))
            .await;
        assert!(matches!(result, Err(ProvisionError::CommandLaunch { .. })));
    }
}
