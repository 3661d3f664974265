//! End-to-end orchestration against the mock executor.

use std::sync::Arc;
use std::time::Duration;

use cmdc_core::{EventFilter, EventKind, InvocationId, LifecycleEvent, Subscription};
use cmdc_llm::ScriptedService;
use cmdc_pipeline::{AppConfig, ChatTranscript, Orchestrator, PipelineError, SubmitRequest};
use cmdc_runner::{MockExecutor, MockResponse, RunnerError};
use cmdc_translate::TranslationSource;

fn orchestrator(executor: &MockExecutor) -> Orchestrator {
    Orchestrator::from_parts(&AppConfig::default(), Arc::new(executor.clone()), None).unwrap()
}

async fn next_event(sub: &mut Subscription) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out waiting for events")
        .expect("bus closed")
}

/// Collect events until one of kind `last` arrives.
async fn events_until(sub: &mut Subscription, last: EventKind) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(sub).await;
        let done = event.kind() == last;
        events.push(event);
        if done {
            return events;
        }
    }
}

fn kinds(events: &[LifecycleEvent]) -> Vec<EventKind> {
    events.iter().map(LifecycleEvent::kind).collect()
}

#[tokio::test]
async fn test_submit_runs_and_analyses() {
    let executor = MockExecutor::new().respond_to(
        "uptime",
        MockResponse::success(" 12:00 up 5 days, load average: 2.50, 1.10, 0.90\n"),
    );
    let orchestrator = orchestrator(&executor);
    let mut sub = orchestrator.subscribe(EventFilter::Invocation("req-1".into()));

    let submission = orchestrator
        .submit(SubmitRequest::new("uptime").with_id("req-1").with_source("test"))
        .await
        .unwrap();
    assert_eq!(submission.invocation_id, InvocationId::new("req-1"));
    assert_eq!(submission.system_command, "uptime");
    assert_eq!(submission.translation.source, TranslationSource::ExactMatch);

    let events = events_until(&mut sub, EventKind::Analysis).await;
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Issued,
            EventKind::OutputChunk,
            EventKind::Finished,
            EventKind::Analysis
        ]
    );

    let LifecycleEvent::Issued(issued) = &events[0] else {
        panic!("expected commandIssued");
    };
    assert_eq!(issued.source.as_deref(), Some("test"));

    let LifecycleEvent::Analysis(analysis) = &events[3] else {
        panic!("expected commandAnalysis");
    };
    let result = analysis.analysis.as_ref().unwrap();
    assert!(result.has_concerns());
    assert_eq!(orchestrator.history(), vec!["uptime"]);
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let executor = MockExecutor::new();
    let orchestrator = orchestrator(&executor);

    let err = orchestrator.submit(SubmitRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput));
    assert_eq!(err.http_status(), 400);
    assert!(!executor.was_called("connect"));
}

#[tokio::test]
async fn test_busy_rejection_and_cancel() {
    let executor = MockExecutor::new().respond_to(
        "free -h",
        MockResponse::success("Mem: 3.7Gi\n").held(),
    );
    let orchestrator = orchestrator(&executor);
    let mut first = orchestrator.subscribe(EventFilter::Invocation("first".into()));
    let mut second = orchestrator.subscribe(EventFilter::Invocation("second".into()));

    orchestrator
        .submit(SubmitRequest::new("memory").with_id("first"))
        .await
        .unwrap();

    let err = orchestrator
        .submit(SubmitRequest::new("disk space").with_id("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Busy { ref active } if active.as_str() == "first"));
    assert_eq!(err.http_status(), 409);

    let LifecycleEvent::Finished(rejected) = next_event(&mut second).await else {
        panic!("expected commandFinished for the rejected request");
    };
    assert!(rejected.error.unwrap().contains("already running"));

    assert_eq!(orchestrator.cancel().unwrap(), InvocationId::new("first"));
    let events = events_until(&mut first, EventKind::Stopped).await;
    assert!(!events.iter().any(|e| e.kind() == EventKind::Finished));

    assert!(matches!(orchestrator.cancel(), Err(PipelineError::NothingRunning)));
    assert!(!executor.executed_commands().contains(&"df -h".to_string()));
    assert_eq!(orchestrator.history(), vec!["memory"]);
}

#[tokio::test]
async fn test_reused_id_leaves_running_stream_untouched() {
    let executor = MockExecutor::new().respond_to(
        "free -h",
        MockResponse::success("Mem: 3.7Gi\n").held(),
    );
    let orchestrator = orchestrator(&executor);
    let mut sub = orchestrator.subscribe(EventFilter::Invocation("same".into()));

    orchestrator
        .submit(SubmitRequest::new("memory").with_id("same"))
        .await
        .unwrap();
    let err = orchestrator
        .submit(SubmitRequest::new("memory").with_id("same"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Busy { ref active } if active.as_str() == "same"));

    executor.release();
    let events = events_until(&mut sub, EventKind::Analysis).await;
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Issued,
            EventKind::OutputChunk,
            EventKind::Finished,
            EventKind::Analysis,
        ]
    );
    let LifecycleEvent::Finished(finished) = &events[2] else {
        panic!("expected commandFinished");
    };
    assert!(finished.error.is_none());
    assert_eq!(finished.code, Some(0));
    assert_eq!(orchestrator.history(), vec!["memory"]);
}

#[tokio::test]
async fn test_interrupted_request_is_not_analysed() {
    let executor = MockExecutor::new().respond_to("free -h", MockResponse::success("x\n").held());
    let orchestrator = orchestrator(&executor);
    let mut sub = orchestrator.subscribe(EventFilter::Invocation("inv".into()));

    orchestrator
        .submit(SubmitRequest::new("memory").with_id("inv"))
        .await
        .unwrap();
    orchestrator.cancel().unwrap();
    events_until(&mut sub, EventKind::Stopped).await;

    let extra = tokio::time::timeout(Duration::from_millis(200), sub.recv()).await;
    assert!(extra.is_err(), "no analysis expected after an interrupt");
}

#[tokio::test]
async fn test_connect_failure_is_published() {
    let executor = MockExecutor::new().simulate_connect_failure("no route to host");
    let orchestrator = orchestrator(&executor);
    let mut sub = orchestrator.subscribe(EventFilter::Invocation("inv".into()));

    let err = orchestrator
        .submit(SubmitRequest::new("memory").with_id("inv"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Runner(RunnerError::Connect(_))));
    assert_eq!(err.http_status(), 500);

    let LifecycleEvent::Finished(finished) = next_event(&mut sub).await else {
        panic!("expected commandFinished");
    };
    assert!(finished.error.unwrap().contains("no route to host"));
    assert!(orchestrator.history().is_empty());
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_unknown_input_runs_fallback() {
    let executor = MockExecutor::new();
    let orchestrator = orchestrator(&executor);

    let submission = orchestrator
        .submit(SubmitRequest::new("zxqv"))
        .await
        .unwrap();
    assert!(submission.translation.is_fallback());
    assert!(executor.executed_commands()[0].starts_with("printf"));
}

#[tokio::test]
async fn test_service_translation_sees_history_and_status() {
    let reply = r#"{"translation": {"command": "ls /srv/share"}, "confidence": 0.92}"#;
    let service = ScriptedService::new().reply(reply);
    let executor = MockExecutor::new()
        .respond_to("uptime", MockResponse::success("load average: 0.10, 0.10, 0.10"));
    let orchestrator = Orchestrator::from_parts(
        &AppConfig::default(),
        Arc::new(executor.clone()),
        Some(Arc::new(service.clone())),
    )
    .unwrap()
    .with_analyzer(None);

    let snapshot = orchestrator.refresh_status().await;
    assert!(snapshot.is_reachable());
    assert!(orchestrator.last_snapshot().is_some());

    let mut sub = orchestrator.subscribe(EventFilter::All);
    orchestrator.submit(SubmitRequest::new("uptime")).await.unwrap();
    events_until(&mut sub, EventKind::Finished).await;

    let submission = orchestrator
        .submit(SubmitRequest::new("zxqv srv"))
        .await
        .unwrap();
    assert_eq!(submission.system_command, "ls /srv/share");

    let prompt = &service.requests()[0].prompt;
    assert!(prompt.contains("[\"uptime\"]"));
    assert!(prompt.contains("load average: 0.10"));
}

#[tokio::test]
async fn test_chat_transcript_follows_submission() {
    let executor = MockExecutor::new().respond_to("free -h", MockResponse::success("Mem: 3.7Gi\n"));
    let orchestrator = orchestrator(&executor);
    let mut sub = orchestrator.subscribe(EventFilter::All);
    let mut chat = ChatTranscript::new();
    chat.track("msg-9".into());

    orchestrator
        .submit(SubmitRequest::new("memory").with_id("msg-9").with_source("chat"))
        .await
        .unwrap();

    let mut last = None;
    for event in events_until(&mut sub, EventKind::Finished).await {
        if let Some(message) = chat.apply(&event) {
            last = Some(message);
        }
    }

    let last = last.unwrap();
    assert!(last.starts_with("✅"));
    assert!(last.contains("Executing: free -h\nMem: 3.7Gi\nCommand completed."));
}
