//! Running scripts on the target machine

use crate::ExecError;
use async_trait::async_trait;
use checkcore::CommandStatus;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Runs a command vector with a script fed on stdin
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, argv: &[String], script: &[u8]) -> Result<CommandStatus, ExecError>;

    fn executor_type(&self) -> &'static str;
}

/// Spawns the command vector as a local child process
#[derive(Debug, Clone, Default)]
pub struct LocalProcessExecutor;

impl LocalProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for LocalProcessExecutor {
    #[instrument(skip(self, script), level = "debug")]
    async fn run(&self, argv: &[String], script: &[u8]) -> Result<CommandStatus, ExecError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecError::Config("empty command".to_string()))?;
        let start = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {}", program, e)))?;

        // Feed stdin from its own task so a chatty child cannot block on a full
        // stdout pipe while we are still writing
        let writer = child.stdin.take().map(|mut stdin| {
            let script = script.to_vec();
            tokio::spawn(async move {
                let result = stdin.write_all(&script).await;
                drop(stdin);
                result
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The child may exit without reading all of its input
                Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(ExecError::Io(e.to_string())),
                Err(e) => return Err(ExecError::Io(e.to_string())),
            }
        }

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            program = %program,
            exit_code,
            duration = ?start.elapsed(),
            "command completed"
        );

        Ok(CommandStatus::new(exit_code)
            .with_stdout(String::from_utf8_lossy(&output.stdout))
            .with_stderr(String::from_utf8_lossy(&output.stderr)))
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> Vec<String> {
        vec!["sh".to_string()]
    }

    #[tokio::test]
    async fn test_script_on_stdin() {
        let status = LocalProcessExecutor::new()
            .run(&sh(), b"echo hello\necho oops >&2\nexit 3\n")
            .await
            .unwrap();

        assert_eq!(status.exit_code, 3);
        assert_eq!(status.stdout.trim(), "hello");
        assert_eq!(status.stderr.trim(), "oops");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_child_ignoring_stdin() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "exit 0".to_string()];
        let script = vec![b'#'; 1 << 20];

        let status = LocalProcessExecutor::new().run(&argv, &script).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let argv = vec!["/nonexistent/checkflow-shell".to_string()];
        let err = LocalProcessExecutor::new().run(&argv, b"").await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let err = LocalProcessExecutor::new().run(&[], b"").await.unwrap_err();
        assert!(matches!(err, ExecError::Config(_)));
    }
}
