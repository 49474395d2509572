//! Subprocess-backed command runner.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Output line from a running command.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Callback receiving streamed output lines.
pub type LineHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Runs commands as child processes of the current process.
#[derive(Clone, Default)]
pub struct SystemRunner {
    line_handler: Option<LineHandler>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a handler for streamed lines. Without one, streamed lines go to `debug!`.
    pub fn with_line_handler(mut self, handler: LineHandler) -> Self {
        self.line_handler = Some(handler);
        self
    }

    fn execute(spec: &CommandSpec, handler: Option<LineHandler>) -> RunnerResult<ExecutionResult> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(&spec.env);
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("Executing: {}", spec.display());

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RunnerError::CommandNotFound(spec.program.clone()),
            _ => RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", spec.program, e)),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            RunnerError::ExecutionFailed(format!("{}: stdout not captured", spec.program))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            RunnerError::ExecutionFailed(format!("{}: stderr not captured", spec.program))
        })?;

        let stdout_handle = collect_lines(stdout, LogStream::Stdout, spec.stream_output, handler.clone());
        let stderr_handle = collect_lines(stderr, LogStream::Stderr, spec.stream_output, handler);

        let status = if spec.timeout_seconds > 0 {
            let timeout = Duration::from_secs(spec.timeout_seconds);
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) => {
                        if start.elapsed() > timeout {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(RunnerError::Timeout(spec.timeout_seconds));
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    Err(e) => {
                        return Err(RunnerError::ExecutionFailed(format!(
                            "Failed to wait for process: {}",
                            e
                        )));
                    }
                }
            }
        } else {
            child.wait().map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        Ok(ExecutionResult {
            exit_code: status.code().map(i64::from).unwrap_or(-1),
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn collect_lines<R: Read + Send + 'static>(
    reader: R,
    stream: LogStream,
    forward: bool,
    handler: Option<LineHandler>,
) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut output = String::new();
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            output.push_str(&line);
            output.push('\n');
            if !forward {
                continue;
            }
            match &handler {
                Some(handler) => handler(LogLine {
                    timestamp: Utc::now(),
                    stream,
                    message: line,
                }),
                None => debug!("[{}] {}", stream, line),
            }
        }
        output
    })
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        info!("Running {}", spec.display());
        let spec = spec.clone();
        let handler = self.line_handler.clone();
        tokio::task::spawn_blocking(move || Self::execute(&spec, handler))
            .await
            .map_err(|e| RunnerError::ExecutionFailed(format!("Command task failed: {}", e)))?
    }
}
