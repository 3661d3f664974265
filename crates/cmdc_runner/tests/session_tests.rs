//! Session manager behaviour against the mock executor.

use std::sync::Arc;
use std::time::Duration;

use cmdc_core::{
    CommandPlan, CommandStep, EventBus, EventKind, Invocation, InvocationId, InvocationState,
    LifecycleEvent, OutputStream, Subscription,
};
use cmdc_runner::{
    MockExecutor, MockResponse, ProcessOutput, RunnerError, SessionManager, SessionOptions,
    STOPPED_MESSAGE,
};

fn manager_with(executor: &MockExecutor, options: SessionOptions) -> SessionManager {
    SessionManager::new(Arc::new(executor.clone()), EventBus::default(), options)
}

fn manager(executor: &MockExecutor) -> SessionManager {
    manager_with(executor, SessionOptions::default())
}

fn invocation(id: &str, input: &str) -> Invocation {
    Invocation::new(InvocationId::new(id), input)
}

/// Collect events until the invocation's terminal event.
async fn events_until_terminal(sub: &mut Subscription) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for events")
            .expect("bus closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn kinds(events: &[LifecycleEvent]) -> Vec<EventKind> {
    events.iter().map(LifecycleEvent::kind).collect()
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let executor = MockExecutor::new().respond_to(
        "free -h",
        MockResponse::chunks(vec![
            ProcessOutput::Stdout(b"Mem: 3.7Gi".to_vec()),
            ProcessOutput::Stderr(b"warning".to_vec()),
            ProcessOutput::Stdout(b" 1.2Gi used\n".to_vec()),
        ]),
    );
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_invocation(InvocationId::new("inv-1"));

    let running = manager
        .start(invocation("inv-1", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap();
    let events = events_until_terminal(&mut sub).await;

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Issued,
            EventKind::OutputChunk,
            EventKind::OutputChunk,
            EventKind::OutputChunk,
            EventKind::Finished,
        ]
    );
    match &events[0] {
        LifecycleEvent::Issued(issued) => {
            assert_eq!(issued.command, "memory");
            assert_eq!(issued.system_command, "free -h");
        }
        other => panic!("unexpected event {:?}", other),
    }
    let seqs: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::OutputChunk(o) => Some(o.seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    match events.last() {
        Some(LifecycleEvent::Finished(f)) => {
            assert_eq!(f.code, Some(0));
            assert!(f.error.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }

    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Completed);
    assert_eq!(finished.stream_bytes(OutputStream::Stderr), b"warning".to_vec());
}

#[tokio::test]
async fn test_output_bytes_round_trip() {
    let payload: Vec<u8> = vec![0x00, 0xff, 0xfe, b'\n', 0xc3, 0x28, b'o', b'k'];
    let executor = MockExecutor::new().add_response(MockResponse::chunks(vec![
        ProcessOutput::Stdout(payload[..3].to_vec()),
        ProcessOutput::Stdout(payload[3..].to_vec()),
    ]));
    let manager = manager(&executor);

    let running = manager
        .start(invocation("inv-bytes", "cat blob"), CommandPlan::single("cat blob"))
        .await
        .unwrap();
    let finished = running.wait().await.unwrap();
    assert_eq!(finished.captured_bytes(), payload);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_busy() {
    let executor = MockExecutor::new().add_response(MockResponse::success("tick").held());
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-a", "watch"), CommandPlan::single("watch"))
        .await
        .unwrap();
    assert!(manager.is_busy());
    assert_eq!(manager.active_invocation(), Some(InvocationId::new("inv-a")));

    let err = manager
        .start(invocation("inv-b", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    match err {
        RunnerError::Busy { active } => assert_eq!(active.as_str(), "inv-a"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(executor.call_count("connect"), 1);

    executor.release();
    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Completed);

    // Nothing was ever published for the rejected invocation
    let events = events_until_terminal(&mut sub).await;
    assert!(events.iter().all(|e| e.invocation_id().as_str() == "inv-a"));
}

#[tokio::test]
async fn test_interrupt_stops_held_process() {
    let executor = MockExecutor::new().add_response(MockResponse::success("tick\n").held());
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-stop", "watch"), CommandPlan::single("watch"))
        .await
        .unwrap();

    // Wait for the first output so the process is streaming
    loop {
        let event = sub.recv().await.unwrap();
        if event.kind() == EventKind::OutputChunk {
            break;
        }
    }

    let stopped = manager.interrupt().unwrap();
    assert_eq!(stopped.as_str(), "inv-stop");
    assert!(!manager.is_busy());

    let events = events_until_terminal(&mut sub).await;
    match events.last() {
        Some(LifecycleEvent::Stopped(s)) => assert_eq!(s.message, STOPPED_MESSAGE),
        other => panic!("unexpected event {:?}", other),
    }

    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Interrupted);
    assert!(executor.was_called("interrupt"));
    assert!(executor.was_called("close"));
}

#[tokio::test]
async fn test_interrupt_is_idempotent() {
    let executor = MockExecutor::new().add_response(MockResponse::success("").held());
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-twice", "watch"), CommandPlan::single("watch"))
        .await
        .unwrap();

    assert!(manager.interrupt().is_ok());
    assert!(matches!(manager.interrupt(), Err(RunnerError::NoActiveSession)));
    running.wait().await.unwrap();

    let events = events_until_terminal(&mut sub).await;
    assert_eq!(
        events.iter().filter(|e| e.kind() == EventKind::Stopped).count(),
        1
    );
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_connect_failure_publishes_finished() {
    let executor = MockExecutor::new().simulate_connect_failure("no route to host");
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let err = manager
        .start(invocation("inv-down", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Connect(_)));
    assert!(!manager.is_busy());

    let events = events_until_terminal(&mut sub).await;
    assert_eq!(kinds(&events), vec![EventKind::Finished]);
    match &events[0] {
        LifecycleEvent::Finished(f) => {
            assert!(f.error.as_deref().unwrap().contains("no route to host"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_failure_is_reported() {
    let executor = MockExecutor::new().simulate_auth_failure("public key rejected");
    let manager = manager(&executor);

    let err = manager
        .start(invocation("inv-auth", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Auth(_)));
    assert!(err.is_remote());
}

#[tokio::test]
async fn test_connect_timeout() {
    let executor = MockExecutor::new().with_connect_delay(Duration::from_millis(500));
    let manager = manager_with(
        &executor,
        SessionOptions::default().connect_timeout(Duration::from_millis(20)),
    );

    let err = manager
        .start(invocation("inv-slow", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Connect(_)));
    assert!(!manager.is_busy());
}

#[tokio::test]
async fn test_stream_error_is_terminal() {
    let executor = MockExecutor::new()
        .add_response(MockResponse::success("partial").with_stream_error("connection reset"));
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-reset", "logs"), CommandPlan::single("journalctl"))
        .await
        .unwrap();
    let events = events_until_terminal(&mut sub).await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::Issued, EventKind::OutputChunk, EventKind::Finished]
    );
    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Failed);
    assert!(finished.error.unwrap().contains("connection reset"));
    assert!(!manager.is_busy());
}

#[tokio::test]
async fn test_runtime_ceiling() {
    let executor = MockExecutor::new().add_response(MockResponse::success("").held());
    let manager = manager_with(
        &executor,
        SessionOptions::default().max_runtime(Some(Duration::from_millis(50))),
    );
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-slow", "watch"), CommandPlan::single("watch"))
        .await
        .unwrap();
    let events = events_until_terminal(&mut sub).await;

    match events.last() {
        Some(LifecycleEvent::Finished(f)) => {
            assert!(f.error.as_deref().unwrap().contains("timed out"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Failed);
    assert!(executor.was_called("interrupt"));
    assert!(!manager.is_busy());
}

#[tokio::test]
async fn test_steps_run_in_order_with_sections() {
    let executor = MockExecutor::new()
        .respond_to("ip -br addr", MockResponse::success("eth0 UP"))
        .respond_to("ip -br route", MockResponse::success("default via 10.0.0.1"));
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_all();

    let plan = CommandPlan::new(vec![
        CommandStep::new("ip -br addr"),
        CommandStep::labelled("Routing", "ip -br route"),
    ])
    .unwrap();
    let running = manager
        .start(invocation("inv-net", "network"), plan)
        .await
        .unwrap();
    let events = events_until_terminal(&mut sub).await;

    let sections: Vec<Option<String>> = events
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::OutputChunk(o) => Some(o.section.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sections, vec![None, Some("Routing".to_string())]);
    assert_eq!(executor.executed_commands(), vec!["ip -br addr", "ip -br route"]);
    assert_eq!(executor.call_count("connect"), 1);

    running.wait().await.unwrap();
}

#[tokio::test]
async fn test_failed_step_stops_plan() {
    let executor = MockExecutor::new()
        .respond_to("sudo smartctl -H /dev/sda", MockResponse::failure(2, "permission denied"))
        .respond_to("sudo smartctl -A /dev/sda", MockResponse::success("attrs"));
    let manager = manager(&executor);

    let plan = CommandPlan::new(vec![
        CommandStep::labelled("SMART Status", "sudo smartctl -H /dev/sda"),
        CommandStep::labelled("SMART Attributes", "sudo smartctl -A /dev/sda"),
    ])
    .unwrap();
    let finished = manager
        .start(invocation("inv-smart", "smart monitor"), plan)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(finished.exit_code, Some(2));
    assert_eq!(finished.state, InvocationState::Completed);
    assert_eq!(executor.executed_commands(), vec!["sudo smartctl -H /dev/sda"]);
}

#[tokio::test]
async fn test_exec_failure_releases_session() {
    let executor = MockExecutor::new().simulate_exec_failure("channel open refused");
    let manager = manager(&executor);

    let err = manager
        .start(invocation("inv-exec", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Stream(_)));
    assert!(!manager.is_busy());
    assert!(executor.was_called("close"));
}

/// Poll until `command` has been handed to the executor.
async fn wait_for_exec(executor: &MockExecutor, command: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !executor.executed_commands().iter().any(|c| c == command) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("command never executed");
}

fn two_step_plan() -> CommandPlan {
    CommandPlan::new(vec![
        CommandStep::new("cat /proc/mdstat"),
        CommandStep::labelled("Details", "sudo mdadm --detail /dev/md0"),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_interrupt_during_slow_step_exec() {
    let executor = MockExecutor::new()
        .respond_to("cat /proc/mdstat", MockResponse::success("md0 : active raid1"))
        .respond_to(
            "sudo mdadm --detail /dev/md0",
            MockResponse::success("State : clean").with_exec_delay(Duration::from_secs(30)),
        );
    let manager = manager(&executor);
    let mut sub = manager.bus().subscribe_invocation(InvocationId::new("inv-raid"));

    let running = manager
        .start(invocation("inv-raid", "raid status"), two_step_plan())
        .await
        .unwrap();
    wait_for_exec(&executor, "sudo mdadm --detail /dev/md0").await;

    let id = manager.interrupt().unwrap();
    assert_eq!(id.as_str(), "inv-raid");

    let events = events_until_terminal(&mut sub).await;
    match events.last() {
        Some(LifecycleEvent::Stopped(stopped)) => assert_eq!(stopped.message, STOPPED_MESSAGE),
        other => panic!("unexpected event {:?}", other),
    }
    let finished = tokio::time::timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("task still stuck in exec")
        .unwrap();
    assert_eq!(finished.state, InvocationState::Interrupted);
    assert!(executor.was_called("close"));
}

#[tokio::test]
async fn test_runtime_ceiling_during_slow_step_exec() {
    let executor = MockExecutor::new()
        .respond_to("cat /proc/mdstat", MockResponse::success("md0 : active raid1"))
        .respond_to(
            "sudo mdadm --detail /dev/md0",
            MockResponse::success("State : clean").with_exec_delay(Duration::from_secs(30)),
        );
    let manager = manager_with(
        &executor,
        SessionOptions::default().max_runtime(Some(Duration::from_millis(100))),
    );
    let mut sub = manager.bus().subscribe_all();

    let running = manager
        .start(invocation("inv-ceiling", "raid status"), two_step_plan())
        .await
        .unwrap();
    let events = events_until_terminal(&mut sub).await;

    match events.last() {
        Some(LifecycleEvent::Finished(f)) => {
            assert!(f.error.as_deref().unwrap().contains("timed out"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let finished = running.wait().await.unwrap();
    assert_eq!(finished.state, InvocationState::Failed);
    assert!(!manager.is_busy());
}

#[tokio::test]
async fn test_first_exec_is_bounded_by_connect_timeout() {
    let executor = MockExecutor::new().add_response(
        MockResponse::success("").with_exec_delay(Duration::from_secs(30)),
    );
    let manager = manager_with(
        &executor,
        SessionOptions::default().connect_timeout(Duration::from_millis(50)),
    );
    let mut sub = manager.bus().subscribe_all();

    let err = manager
        .start(invocation("inv-stall", "memory"), CommandPlan::single("free -h"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Stream(_)));
    assert!(!manager.is_busy());

    let events = events_until_terminal(&mut sub).await;
    assert_eq!(kinds(&events), vec![EventKind::Finished]);
}
