//! Command executors: where a resolved key code becomes a device action.

use std::process::Stdio;
use std::sync::Arc;

use tl_link::{CommandExecutor, ExecError, KeyCode};

use crate::config::{ExecutorConfig, ExecutorKind};

/// Build the executor selected by `[executor]`.
pub fn from_config(cfg: &ExecutorConfig) -> Arc<dyn CommandExecutor> {
    match cfg.kind {
        ExecutorKind::Log => Arc::new(LogExecutor),
        ExecutorKind::Shell => Arc::new(ShellExecutor::new(&cfg.program, cfg.args.clone())),
    }
}

/// Logs every key event and does nothing else.
pub struct LogExecutor;

#[async_trait::async_trait]
impl CommandExecutor for LogExecutor {
    async fn execute(&self, code: KeyCode) -> Result<(), ExecError> {
        tracing::info!(code = %code, "key event");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Runs `program args… <code>`, e.g. `input keyevent 223`.
///
/// The code is passed as a single argument, never through a shell.
pub struct ShellExecutor {
    program: String,
    args: Vec<String>,
}

impl ShellExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, code: KeyCode) -> Result<(), ExecError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(code.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(program = %self.program, code = %code, "key event executed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shell"
    }
}
