//! Scripted reasoning service for testing.
//!
//! Returns queued answers in order and records every request, so the
//! translator, analyzer and pipeline can be exercised without network
//! access.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{CompletionRequest, ReasoningService};
use crate::error::{LlmError, LlmResult};

/// Queued answer.
#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
}

/// Reasoning service double.
#[derive(Clone, Default)]
pub struct ScriptedService {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.queue.lock().push_back(Scripted::Reply(text.into()));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.queue.lock().push_back(Scripted::Fail(message.into()));
        self
    }

    /// Delay every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        // An empty script behaves like an unreachable service
        let next = self.queue.lock().pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(LlmError::Transport(message)),
            None => Err(LlmError::Transport("no scripted reply".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
