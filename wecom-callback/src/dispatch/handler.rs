//! Downstream message handlers.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::types::DispatchJob;

/// Failures of a downstream handler invocation.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("failed to start handler: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("handler exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that acts on a dispatched message.
///
/// Implementations run on dispatcher workers, never on the request path.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, job: &DispatchJob) -> Result<(), HandlerError>;
}

/// Runs an external command with the job's four arguments appended.
///
/// Arguments are passed as argv, never through a shell, so message content
/// cannot inject commands.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    base_args: Vec<String>,
}

impl CommandHandler {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Build from a whitespace-separated command line such as `python3 command.py`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl MessageHandler for CommandHandler {
    async fn handle(&self, job: &DispatchJob) -> Result<(), HandlerError> {
        debug!(
            program = %self.program,
            sender_id = %job.sender_id,
            message_type_code = job.message_type_code,
            "handler_command_starting"
        );

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(job.args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(HandlerError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            program = %self.program,
            sender_id = %job.sender_id,
            stdout_length = output.stdout.len(),
            "handler_command_complete"
        );

        Ok(())
    }
}
