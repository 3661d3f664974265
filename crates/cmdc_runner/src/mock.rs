//! Mock remote executor for testing.
//!
//! Provides scripted remote processes so the session manager, the status
//! probe and the pipeline can be exercised without an SSH server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, RemoteConnection, RemoteExecutor, RemoteProcess};

/// Scripted behaviour of one remote process.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Output items emitted in order
    pub output: Vec<ProcessOutput>,
    pub exit_code: Option<u32>,
    pub signal: Option<String>,
    /// Pause before each output item
    pub chunk_delay: Option<Duration>,
    /// Pause inside `exec` before the process starts
    pub exec_delay: Option<Duration>,
    /// Keep running after the output until released or interrupted
    pub hold: bool,
    /// Fail the stream after the output instead of exiting
    pub stream_error: Option<String>,
}

impl MockResponse {
    /// Exit 0 after printing `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        let output = if stdout.is_empty() {
            Vec::new()
        } else {
            vec![ProcessOutput::Stdout(stdout.into_bytes())]
        };
        Self {
            output,
            exit_code: Some(0),
            signal: None,
            chunk_delay: None,
            exec_delay: None,
            hold: false,
            stream_error: None,
        }
    }

    /// Exit with `exit_code` after printing `stderr`.
    pub fn failure(exit_code: u32, stderr: impl Into<String>) -> Self {
        Self {
            output: vec![ProcessOutput::Stderr(stderr.into().into_bytes())],
            exit_code: Some(exit_code),
            ..Self::success("")
        }
    }

    /// Emit exactly these items, then exit 0.
    pub fn chunks(output: Vec<ProcessOutput>) -> Self {
        Self {
            output,
            ..Self::success("")
        }
    }

    pub fn with_exit_code(mut self, code: u32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Pause before each output item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Stall `exec` for `delay`, like a channel that is slow to open.
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Keep the process running until [`MockExecutor::release`] or an interrupt.
    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }

    /// Break the stream after the output.
    pub fn with_stream_error(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub command: Option<String>,
}

impl CapturedCall {
    fn new(method: &str, command: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            command: command.map(str::to_string),
        }
    }
}

type CallLog = Arc<RwLock<Vec<CapturedCall>>>;

/// Mock remote executor.
///
/// Responses are looked up by exact command first, then taken from the
/// default list in rotation. Without any response a command succeeds with
/// no output.
#[derive(Clone)]
pub struct MockExecutor {
    by_command: Arc<RwLock<HashMap<String, MockResponse>>>,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: CallLog,
    connect_failure: Arc<RwLock<Option<String>>>,
    auth_failure: Arc<RwLock<Option<String>>>,
    exec_failure: Arc<RwLock<Option<String>>>,
    connect_delay: Arc<RwLock<Option<Duration>>>,
    release: Arc<watch::Sender<bool>>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        let (release, _) = watch::channel(false);
        Self {
            by_command: Arc::new(RwLock::new(HashMap::new())),
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            connect_failure: Arc::new(RwLock::new(None)),
            auth_failure: Arc::new(RwLock::new(None)),
            exec_failure: Arc::new(RwLock::new(None)),
            connect_delay: Arc::new(RwLock::new(None)),
            release: Arc::new(release),
        }
    }

    /// Respond to `command` with `response`.
    pub fn respond_to(self, command: impl Into<String>, response: MockResponse) -> Self {
        self.by_command.write().insert(command.into(), response);
        self
    }

    /// Add a response used for commands without a dedicated one.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Make `connect` fail with a connection error.
    pub fn simulate_connect_failure(self, message: impl Into<String>) -> Self {
        *self.connect_failure.write() = Some(message.into());
        self
    }

    /// Make `connect` fail with an authentication error.
    pub fn simulate_auth_failure(self, message: impl Into<String>) -> Self {
        *self.auth_failure.write() = Some(message.into());
        self
    }

    /// Make every `exec` fail.
    pub fn simulate_exec_failure(self, message: impl Into<String>) -> Self {
        *self.exec_failure.write() = Some(message.into());
        self
    }

    /// Pause inside `connect`.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.connect_delay.write() = Some(delay);
        self
    }

    /// Let every held process exit.
    pub fn release(&self) {
        self.release.send_replace(true);
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Clear captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get the call count for a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Commands passed to `exec`, in order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == "exec")
            .filter_map(|c| c.command.clone())
            .collect()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn response_for(&self, command: &str) -> MockResponse {
        if let Some(response) = self.by_command.read().get(command) {
            return response.clone();
        }
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
impl RemoteExecutor for MockExecutor {
    async fn connect(&self) -> RunnerResult<Box<dyn RemoteConnection>> {
        self.record_call(CapturedCall::new("connect", None));

        let delay = *self.connect_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(msg) = self.connect_failure.read().clone() {
            return Err(RunnerError::Connect(msg));
        }
        if let Some(msg) = self.auth_failure.read().clone() {
            return Err(RunnerError::Auth(msg));
        }

        Ok(Box::new(MockConnection {
            executor: self.clone(),
        }))
    }

    fn target(&self) -> String {
        "mock".to_string()
    }
}

struct MockConnection {
    executor: MockExecutor,
}

#[async_trait]
impl RemoteConnection for MockConnection {
    async fn exec(&self, command: &str) -> RunnerResult<Box<dyn RemoteProcess>> {
        self.executor
            .record_call(CapturedCall::new("exec", Some(command)));

        if let Some(msg) = self.executor.exec_failure.read().clone() {
            return Err(RunnerError::Stream(msg));
        }

        let response = self.executor.response_for(command);
        if let Some(delay) = response.exec_delay {
            tokio::time::sleep(delay).await;
        }
        let release = response.hold.then(|| self.executor.release.subscribe());
        Ok(Box::new(MockProcess {
            queue: response.output.into(),
            exit_code: response.exit_code,
            signal: response.signal,
            delay: response.chunk_delay,
            release,
            stream_error: response.stream_error,
            interrupted: false,
            finished: false,
            calls: self.executor.captured_calls.clone(),
            command: command.to_string(),
        }))
    }

    async fn close(&self) {
        self.executor.record_call(CapturedCall::new("close", None));
    }
}

struct MockProcess {
    queue: VecDeque<ProcessOutput>,
    exit_code: Option<u32>,
    signal: Option<String>,
    delay: Option<Duration>,
    release: Option<watch::Receiver<bool>>,
    stream_error: Option<String>,
    interrupted: bool,
    finished: bool,
    calls: CallLog,
    command: String,
}

#[async_trait]
impl RemoteProcess for MockProcess {
    async fn next(&mut self) -> RunnerResult<Option<ProcessOutput>> {
        if self.finished {
            return Ok(None);
        }

        if !self.queue.is_empty() {
            // Sleep before popping so a cancelled poll loses nothing
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            return Ok(self.queue.pop_front());
        }

        if let Some(msg) = self.stream_error.take() {
            self.finished = true;
            return Err(RunnerError::Stream(msg));
        }

        if !self.interrupted {
            if let Some(release) = self.release.as_mut() {
                // A dropped sender counts as released
                let _ = release.wait_for(|released| *released).await;
                self.release = None;
            }
        }

        self.finished = true;
        if self.interrupted {
            return Ok(Some(ProcessOutput::Exit {
                code: None,
                signal: Some("INT".to_string()),
            }));
        }
        Ok(Some(ProcessOutput::Exit {
            code: self.exit_code,
            signal: self.signal.take(),
        }))
    }

    async fn interrupt(&mut self) -> RunnerResult<()> {
        self.calls
            .write()
            .push(CapturedCall::new("interrupt", Some(&self.command)));
        self.interrupted = true;
        Ok(())
    }
}
