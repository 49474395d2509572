//! Scripted `CommandRunner` for tests.
//!
//! Replays queued outputs and records every invocation, so resolution can be
//! tested without a terraform binary.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Canned output of one scripted invocation.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub timeout_seconds: u64,
    pub stream_output: bool,
}

/// Runner that records invocations and replays queued responses in order,
/// cycling when more calls arrive than responses were queued.
#[derive(Clone)]
pub struct MockRunner {
    unavailable: Arc<RwLock<HashSet<String>>>,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Every run fails with this message when set.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            unavailable: Arc::new(RwLock::new(HashSet::new())),
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Fail runs of `program` as if it were not installed.
    pub fn set_unavailable(self, program: impl Into<String>) -> Self {
        self.unavailable.write().insert(program.into());
        self
    }

    /// Queue the output of the next invocation.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Make every invocation fail to spawn.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Invocations so far, oldest first.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        self.captured_calls.write().push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            env: spec.env.clone(),
            workdir: spec.workdir.clone(),
            timeout_seconds: spec.timeout_seconds,
            stream_output: spec.stream_output,
        });

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        if self.unavailable.read().contains(&spec.program) {
            return Err(RunnerError::CommandNotFound(spec.program.clone()));
        }

        let response = self.next_response();
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
