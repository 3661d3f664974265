//! Request orchestration.
//!
//! The [`Orchestrator`] is the surface front-ends call: `submit` a
//! natural-language request, `cancel` the running one, `refresh_status` and
//! `subscribe` to lifecycle events. Everything observers need arrives on
//! the bus; the return values only acknowledge acceptance.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use cmdc_analyzer::{AnalysisRequest, Analyzer};
use cmdc_core::{
    CommandAnalysis, CommandFinished, EventBus, EventFilter, Invocation, InvocationId,
    InvocationState, LifecycleEvent, Subscription,
};
use cmdc_llm::ReasoningService;
use cmdc_runner::{
    RemoteExecutor, RunnerError, RunningInvocation, SessionManager, SshExecutor, StatusProbe,
    SystemSnapshot,
};
use cmdc_translate::{TranslationResult, Translator};

use crate::config::AppConfig;
use crate::context::ConversationContext;
use crate::error::{PipelineError, PipelineResult};

/// A request to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub input: String,
    /// Caller-chosen id; generated when absent
    pub invocation_id: Option<InvocationId>,
    /// Originating front-end, echoed in `commandIssued`
    pub source: Option<String>,
}

impl SubmitRequest {
    /// Create a request with a generated id.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            invocation_id: None,
            source: None,
        }
    }

    /// Use a caller-supplied invocation id.
    pub fn with_id(mut self, id: impl Into<InvocationId>) -> Self {
        self.invocation_id = Some(id.into());
        self
    }

    /// Tag the request with its origin.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Acknowledgement of an accepted request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub invocation_id: InvocationId,
    pub system_command: String,
    pub translation: TranslationResult,
}

/// Wires translator, session manager, analyzer and status probe together.
#[derive(Clone)]
pub struct Orchestrator {
    translator: Arc<Translator>,
    sessions: SessionManager,
    analyzer: Option<Arc<Analyzer>>,
    probe: StatusProbe,
    context: Arc<Mutex<ConversationContext>>,
}

impl Orchestrator {
    /// Create an orchestrator with the rule-based analyzer.
    pub fn new(translator: Translator, sessions: SessionManager) -> Self {
        let probe = StatusProbe::new(sessions.executor());
        Self {
            translator: Arc::new(translator),
            sessions,
            analyzer: Some(Arc::new(Analyzer::new())),
            probe,
            context: Arc::new(Mutex::new(ConversationContext::new(10))),
        }
    }

    /// Replace the analyzer; `None` disables post-execution analysis.
    pub fn with_analyzer(mut self, analyzer: Option<Analyzer>) -> Self {
        self.analyzer = analyzer.map(Arc::new);
        self
    }

    /// Set how many past requests are kept as context.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.context = Arc::new(Mutex::new(ConversationContext::new(limit)));
        self
    }

    pub fn with_probe(mut self, probe: StatusProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Build from configuration with the SSH transport and, when credentials
    /// are present in the environment, the reasoning service.
    pub fn from_config(config: &AppConfig) -> PipelineResult<Self> {
        let executor = SshExecutor::new(config.ssh.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Self::from_parts(config, Arc::new(executor), config.reasoning_service())
    }

    /// Build from configuration with explicit transport and service.
    pub fn from_parts(
        config: &AppConfig,
        executor: Arc<dyn RemoteExecutor>,
        service: Option<Arc<dyn ReasoningService>>,
    ) -> PipelineResult<Self> {
        let table = config.phrase_table()?;

        let mut translator = Translator::new(table).with_options(config.translator_options());
        if config.translator.use_service {
            if let Some(service) = &service {
                translator = translator.with_service(service.clone());
            }
        }

        let analyzer = config.analyzer.enabled.then(|| {
            let analyzer = Analyzer::new().with_options(config.analyzer_options());
            match (&service, config.analyzer.use_service) {
                (Some(service), true) => analyzer.with_service(service.clone()),
                _ => analyzer,
            }
        });

        let bus = EventBus::new(config.bus.capacity);
        let sessions = SessionManager::new(executor, bus, config.session_options());

        Ok(Self::new(translator, sessions)
            .with_analyzer(analyzer)
            .with_history_limit(config.history.limit))
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn bus(&self) -> &EventBus {
        self.sessions.bus()
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Check whether a request is running.
    pub fn is_busy(&self) -> bool {
        self.sessions.is_busy()
    }

    /// Past requests, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.context.lock().history()
    }

    pub fn last_snapshot(&self) -> Option<SystemSnapshot> {
        self.context.lock().snapshot().cloned()
    }

    /// Subscribe to lifecycle events matching `filter`.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.bus().subscribe(filter)
    }

    /// Translate and start a request.
    ///
    /// Returns once the command runs on the remote host. Output, the
    /// terminal event and the analysis follow on the bus.
    pub async fn submit(&self, request: SubmitRequest) -> PipelineResult<Submission> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let id = request
            .invocation_id
            .unwrap_or_else(InvocationId::generate);

        if let Some(active) = self.sessions.active_invocation() {
            return Err(self.reject_busy(&id, active));
        }

        let mut invocation = Invocation::new(id.clone(), input);
        if let Some(source) = request.source {
            invocation = invocation.with_source(source);
        }
        invocation.transition(InvocationState::Translating).map_err(RunnerError::from)?;

        let context = self.context.lock().translation_context();
        let translation = self.translator.translate(input, &context).await;
        debug!(
            invocation = %id,
            source = %translation.source,
            confidence = translation.confidence,
            "translated"
        );

        let running = match self.sessions.start(invocation, translation.plan.clone()).await {
            Ok(running) => running,
            Err(RunnerError::Busy { active }) => return Err(self.reject_busy(&id, active)),
            // Every other start failure is already published for this id
            Err(e) => return Err(e.into()),
        };

        self.context.lock().record(input);
        self.spawn_follow_up(running);

        info!(invocation = %id, command = %translation.command, "request accepted");
        Ok(Submission {
            invocation_id: id,
            system_command: translation.command.clone(),
            translation,
        })
    }

    /// Interrupt the running request and return its id.
    pub fn cancel(&self) -> PipelineResult<InvocationId> {
        Ok(self.sessions.interrupt()?)
    }

    /// Take a status snapshot and keep it as translation context.
    pub async fn refresh_status(&self) -> SystemSnapshot {
        let snapshot = self.probe.snapshot().await;
        self.context.lock().set_snapshot(snapshot.clone());
        snapshot
    }

    /// Reject `id` while `active` holds the session.
    ///
    /// The rejected id gets a terminal event, unless it is the running
    /// invocation's own id, whose stream must stay untouched.
    fn reject_busy(&self, id: &InvocationId, active: InvocationId) -> PipelineError {
        let reused = *id == active;
        let error = PipelineError::Busy { active };
        warn!(invocation = %id, error = %error, "request rejected");
        if reused {
            return error;
        }
        self.bus().publish(LifecycleEvent::Finished(CommandFinished::failed(
            id.clone(),
            error.to_string(),
        )));
        error
    }

    /// Wait for the invocation and publish its analysis once it completed.
    fn spawn_follow_up(&self, running: RunningInvocation) {
        let analyzer = self.analyzer.clone();
        let bus = self.bus().clone();

        tokio::spawn(async move {
            let id = running.id().clone();
            let invocation = match running.wait().await {
                Ok(invocation) => invocation,
                Err(e) => {
                    error!(invocation = %id, error = %e, "invocation task failed");
                    return;
                }
            };

            let Some(analyzer) = analyzer else { return };
            if invocation.state != InvocationState::Completed {
                return;
            }

            let request = AnalysisRequest::new(
                invocation.raw_input.clone(),
                invocation.resolved_command.clone().unwrap_or_default(),
                invocation.captured_text(),
            );
            let analysis = analyzer.analyze(&request).await;
            debug!(invocation = %id, concerns = analysis.concerns.len(), "analysis ready");
            bus.publish(LifecycleEvent::Analysis(CommandAnalysis {
                invocation_id: id,
                analysis: Some(analysis),
                error: None,
            }));
        });
    }
}
