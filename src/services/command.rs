//! Runs external programs (ffmpeg, the speech engine) with a wall-clock limit.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default limit for one invocation: 5 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Diagnostic output kept from a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program}: failed to spawn: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program}: I/O error: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    #[error("{program}: exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program}: timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Builder for one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    stdin_data: Option<Vec<u8>>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            stdin_data: None,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn stdin(&mut self, data: Vec<u8>) -> &mut Self {
        self.stdin_data = Some(data);
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run to completion. A non-zero exit and a timeout are both errors; the
    /// child is killed when the timeout fires.
    pub async fn execute(&self) -> Result<CommandOutput, CommandError> {
        let program = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.stdin_data.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let Some(ref data) = self.stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(data).await.map_err(|source| CommandError::Io {
                    program: program.clone(),
                    source,
                })?;
                // Dropping stdin closes the pipe.
            }
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if !output.status.success() {
                    return Err(CommandError::Exit {
                        program,
                        code: output.status.code(),
                        stderr: tail(&stderr, 500),
                    });
                }
                Ok(CommandOutput { stdout, stderr })
            }
            Ok(Err(source)) => Err(CommandError::Io { program, source }),
            Err(_elapsed) => Err(CommandError::Timeout {
                program,
                timeout: self.timeout,
            }),
        }
    }
}

/// Last `max` characters of a diagnostic stream (ffmpeg puts the cause at the end).
fn tail(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    let count = trimmed.chars().count();
    if count <= max {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let result = ToolCommand::new("nonexistent_tool_xyz_12345").execute().await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new("sleep")
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        match result {
            Err(CommandError::Timeout { .. }) => {}
            // Minimal environments may lack `sleep`.
            Err(CommandError::Spawn { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let result = ToolCommand::new("cat").stdin(b"narration".to_vec()).execute().await;
        if let Ok(out) = result {
            assert_eq!(out.stdout, "narration");
        }
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("  abcdef  ", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
    }
}
