//! External diagram compiler.
//!
//! Rendering pipes the formatted text into a child process and collects what
//! it writes to stdout. The child is spawned with `kill_on_drop`, so dropping
//! the future (cancellation or deadline) also terminates the process.

use crate::error::{DberdError, DberdResult};
use crate::models::TargetKind;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// A command line that reads a diagram on stdin and writes it to stdout.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    pub target: TargetKind,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl RenderCommand {
    pub fn new(target: TargetKind, program: impl Into<PathBuf>) -> Self {
        Self {
            target,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the command with `input` on stdin and return its stdout.
    ///
    /// A non-zero exit status becomes [`DberdError::Render`] carrying the
    /// process's stderr.
    pub async fn run(&self, input: &[u8]) -> DberdResult<Vec<u8>> {
        let target = self.target.as_str();
        info!(
            program = %self.program.display(),
            args = ?self.args,
            bytes = input.len(),
            "Starting diagram renderer"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DberdError::render(
                    target,
                    format!("failed to start {}: {}", self.program.display(), e),
                )
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DberdError::render(target, "renderer stdin was not captured"))?;

        let input = input.to_vec();
        let write = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|e| DberdError::render(target, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DberdError::render(
                target,
                format!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim()),
            ));
        }
        written.map_err(|e| DberdError::render(target, format!("writing input: {}", e)))?;

        debug!(bytes = output.stdout.len(), "Diagram rendered");
        Ok(output.stdout)
    }
}
