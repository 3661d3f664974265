//! Single-session remote execution.
//!
//! At most one invocation runs at a time. The slot is claimed with a
//! compare-and-set before any network work, so a second `start` is
//! rejected without disturbing the running command. Each accepted
//! invocation is driven by its own task, which is the only publisher of
//! that invocation's `Issued`, output and terminal events.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cmdc_core::{
    CommandFinished, CommandIssued, CommandOutput, CommandPlan, CommandStep, CommandStopped,
    EventBus, Invocation, InvocationId, InvocationState, LifecycleEvent, OutputStream,
};

use crate::config::SessionOptions;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, RemoteConnection, RemoteExecutor, RemoteProcess};

/// Message carried by the `Stopped` event.
pub const STOPPED_MESSAGE: &str = "Command interrupted and SSH connection closed";

struct ActiveSession {
    invocation_id: InvocationId,
    cancel: Option<oneshot::Sender<()>>,
}

type Slot = Arc<Mutex<Option<ActiveSession>>>;

/// Handle to an accepted invocation.
#[derive(Debug)]
pub struct RunningInvocation {
    id: InvocationId,
    handle: JoinHandle<Invocation>,
}

impl RunningInvocation {
    /// Id of the accepted invocation.
    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    /// Wait for the invocation to reach a terminal state.
    pub async fn wait(self) -> RunnerResult<Invocation> {
        self.handle
            .await
            .map_err(|e| RunnerError::TaskFailed(e.to_string()))
    }
}

/// Owns the single remote session.
#[derive(Clone)]
pub struct SessionManager {
    executor: Arc<dyn RemoteExecutor>,
    bus: EventBus,
    options: SessionOptions,
    slot: Slot,
}

impl SessionManager {
    /// Create a session manager publishing on `bus`.
    pub fn new(executor: Arc<dyn RemoteExecutor>, bus: EventBus, options: SessionOptions) -> Self {
        Self {
            executor,
            bus,
            options,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Bus carrying lifecycle events.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Transport used for new connections.
    pub fn executor(&self) -> Arc<dyn RemoteExecutor> {
        self.executor.clone()
    }

    /// Check whether an invocation holds the session.
    pub fn is_busy(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Invocation currently holding the session.
    pub fn active_invocation(&self) -> Option<InvocationId> {
        self.slot.lock().as_ref().map(|s| s.invocation_id.clone())
    }

    /// Start `plan` for `invocation`.
    ///
    /// Returns once the first step runs on the remote host. `Busy` leaves
    /// everything untouched and publishes nothing; every other error has
    /// already been published as a terminal event for the invocation.
    pub async fn start(
        &self,
        mut invocation: Invocation,
        plan: CommandPlan,
    ) -> RunnerResult<RunningInvocation> {
        let id = invocation.id.clone();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        {
            let mut slot = self.slot.lock();
            if let Some(active) = slot.as_ref() {
                return Err(RunnerError::Busy {
                    active: active.invocation_id.clone(),
                });
            }
            *slot = Some(ActiveSession {
                invocation_id: id.clone(),
                cancel: Some(cancel_tx),
            });
        }

        if let Err(e) = invocation.transition(InvocationState::Running) {
            return Err(self.abort(&id, e.into()));
        }
        let steps = plan.into_steps();
        let Some(first) = steps.first().cloned() else {
            return Err(self.abort(&id, RunnerError::Config("empty command plan".to_string())));
        };
        invocation.resolved_command = Some(
            steps
                .iter()
                .map(CommandStep::render)
                .collect::<Vec<_>>()
                .join(" && "),
        );

        debug!(invocation = %id, remote = %self.executor.target(), "connecting");
        let limit = self.options.connect_timeout;
        let connect = tokio::time::timeout(limit, self.executor.connect());
        let connection = tokio::select! {
            _ = &mut cancel_rx => {
                self.publish_stopped(&id);
                return Err(RunnerError::Interrupted);
            }
            result = connect => match result {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => return Err(self.abort(&id, e)),
                Err(_) => {
                    let e = RunnerError::Connect(format!("timed out after {:?}", limit));
                    return Err(self.abort(&id, e));
                }
            },
        };

        let process = tokio::select! {
            _ = &mut cancel_rx => {
                connection.close().await;
                self.publish_stopped(&id);
                return Err(RunnerError::Interrupted);
            }
            result = tokio::time::timeout(limit, connection.exec(&first.command)) => match result {
                Ok(Ok(process)) => process,
                Ok(Err(e)) => {
                    connection.close().await;
                    return Err(self.abort(&id, e));
                }
                Err(_) => {
                    connection.close().await;
                    let e = RunnerError::Stream(format!("exec timed out after {:?}", limit));
                    return Err(self.abort(&id, e));
                }
            },
        };

        info!(invocation = %id, command = %first.command, "command issued");
        self.bus.publish(LifecycleEvent::Issued(CommandIssued {
            invocation_id: id.clone(),
            command: invocation.raw_input.clone(),
            system_command: invocation.resolved_command.clone().unwrap_or_default(),
            source: invocation.source_tag.clone(),
        }));

        let driver = Driver {
            bus: self.bus.clone(),
            slot: self.slot.clone(),
            options: self.options.clone(),
            invocation,
            connection,
            process,
            steps,
            step: 0,
            stdout: StreamDecoder::default(),
            stderr: StreamDecoder::default(),
        };
        let handle = tokio::spawn(driver.run(cancel_rx));

        Ok(RunningInvocation { id, handle })
    }

    /// Interrupt the active invocation.
    ///
    /// Frees the session immediately; the invocation's task sends SIGINT,
    /// closes the connection and publishes `Stopped`.
    pub fn interrupt(&self) -> RunnerResult<InvocationId> {
        let active = self.slot.lock().take();
        match active {
            Some(mut session) => {
                if let Some(cancel) = session.cancel.take() {
                    let _ = cancel.send(());
                }
                info!(invocation = %session.invocation_id, "interrupt requested");
                Ok(session.invocation_id)
            }
            None => Err(RunnerError::NoActiveSession),
        }
    }

    /// Release the slot and publish a terminal failure.
    fn abort(&self, id: &InvocationId, error: RunnerError) -> RunnerError {
        release(&self.slot, id);
        warn!(invocation = %id, error = %error, "invocation failed");
        self.bus.publish(LifecycleEvent::Finished(CommandFinished::failed(
            id.clone(),
            error.to_string(),
        )));
        error
    }

    fn publish_stopped(&self, id: &InvocationId) {
        info!(invocation = %id, "invocation interrupted before start");
        self.bus.publish(LifecycleEvent::Stopped(CommandStopped {
            invocation_id: id.clone(),
            message: STOPPED_MESSAGE.to_string(),
        }));
    }
}

/// Free the slot if `id` still holds it.
fn release(slot: &Slot, id: &InvocationId) {
    let mut slot = slot.lock();
    if slot.as_ref().map(|s| &s.invocation_id) == Some(id) {
        *slot = None;
    }
}

/// Incremental UTF-8 decoding of one output stream.
///
/// A multi-byte character split across two packets is held back until the
/// rest arrives; other invalid bytes are replaced.
#[derive(Default)]
struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    fn decode(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let keep = incomplete_tail(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }
}

/// Length of a truncated multi-byte sequence at the end of `bytes`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let floor = bytes.len().saturating_sub(3);
    for start in (floor..bytes.len()).rev() {
        let byte = bytes[start];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => 1,
        };
        let have = bytes.len() - start;
        return if have < width { have } else { 0 };
    }
    0
}

/// Per-invocation task state.
struct Driver {
    bus: EventBus,
    slot: Slot,
    options: SessionOptions,
    invocation: Invocation,
    connection: Box<dyn RemoteConnection>,
    process: Box<dyn RemoteProcess>,
    steps: Vec<CommandStep>,
    step: usize,
    stdout: StreamDecoder,
    stderr: StreamDecoder,
}

impl Driver {
    async fn run(mut self, mut cancel_rx: oneshot::Receiver<()>) -> Invocation {
        let deadline = self.options.max_runtime.map(|limit| Instant::now() + limit);
        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = &mut cancel_rx => return self.stop().await,
                _ = &mut timer => return self.time_out().await,
                next = self.process.next() => match next {
                    Ok(Some(ProcessOutput::Stdout(data))) => self.output(OutputStream::Stdout, data),
                    Ok(Some(ProcessOutput::Stderr(data))) => self.output(OutputStream::Stderr, data),
                    Ok(Some(ProcessOutput::Exit { code, signal })) => {
                        let success = code == Some(0) && signal.is_none();
                        if success && self.step + 1 < self.steps.len() {
                            self.step += 1;
                            let command = self.steps[self.step].command.clone();
                            debug!(invocation = %self.invocation.id, step = self.step, command = %command, "next step");

                            // Cancel and the ceiling stay live while the next channel opens
                            tokio::select! {
                                biased;

                                _ = &mut cancel_rx => return self.stop().await,
                                _ = &mut timer => return self.time_out().await,
                                result = self.connection.exec(&command) => match result {
                                    Ok(process) => self.process = process,
                                    Err(e) => return self.fail(e).await,
                                },
                            }
                            continue;
                        }
                        return self.finish(code, signal).await;
                    }
                    Ok(None) => {
                        let e = RunnerError::Stream("stream closed without exit status".to_string());
                        return self.fail(e).await;
                    }
                    Err(e) => return self.fail(e).await,
                },
            }
        }
    }

    fn section(&self) -> Option<String> {
        self.steps.get(self.step).and_then(|s| s.label.clone())
    }

    fn output(&mut self, stream: OutputStream, data: Vec<u8>) {
        let section = self.section();
        let text = match stream {
            OutputStream::Stdout => self.stdout.decode(&data),
            OutputStream::Stderr => self.stderr.decode(&data),
        };
        let id = self.invocation.id.clone();
        let chunk = self.invocation.push_output(stream, data, section);
        let event = CommandOutput::from_chunk_text(id, chunk, text);
        self.bus.publish(LifecycleEvent::OutputChunk(event));
    }

    async fn finish(mut self, code: Option<u32>, signal: Option<String>) -> Invocation {
        self.connection.close().await;
        release(&self.slot, &self.invocation.id);

        self.invocation.exit_code = code;
        self.invocation.signal = signal.clone();
        if let Err(e) = self.invocation.transition(InvocationState::Completed) {
            warn!(error = %e, "unexpected invocation state");
        }

        info!(invocation = %self.invocation.id, code = ?code, signal = ?signal, "command finished");
        self.bus.publish(LifecycleEvent::Finished(CommandFinished::exited(
            self.invocation.id.clone(),
            code,
            signal,
        )));
        self.invocation
    }

    async fn stop(mut self) -> Invocation {
        if let Err(e) = self.process.interrupt().await {
            warn!(invocation = %self.invocation.id, error = %e, "failed to send SIGINT");
        }
        self.connection.close().await;

        if let Err(e) = self.invocation.transition(InvocationState::Interrupted) {
            warn!(error = %e, "unexpected invocation state");
        }

        info!(invocation = %self.invocation.id, "command interrupted");
        self.bus.publish(LifecycleEvent::Stopped(CommandStopped {
            invocation_id: self.invocation.id.clone(),
            message: STOPPED_MESSAGE.to_string(),
        }));
        self.invocation
    }

    async fn time_out(mut self) -> Invocation {
        let limit = self.options.max_runtime.unwrap_or_default();
        if let Err(e) = self.process.interrupt().await {
            warn!(invocation = %self.invocation.id, error = %e, "failed to send SIGINT");
        }
        self.fail(RunnerError::Timeout(limit)).await
    }

    async fn fail(mut self, error: RunnerError) -> Invocation {
        self.connection.close().await;
        release(&self.slot, &self.invocation.id);

        let message = error.to_string();
        if let Err(e) = self.invocation.fail(message.clone()) {
            warn!(error = %e, "unexpected invocation state");
        }

        warn!(invocation = %self.invocation.id, error = %message, "command failed");
        self.bus.publish(LifecycleEvent::Finished(CommandFinished::failed(
            self.invocation.id.clone(),
            message,
        )));
        self.invocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockExecutor, MockResponse};

    fn manager(executor: MockExecutor) -> SessionManager {
        SessionManager::new(
            Arc::new(executor),
            EventBus::default(),
            SessionOptions::default(),
        )
    }

    #[test]
    fn test_decoder_joins_split_characters() {
        let mut decoder = StreamDecoder::default();
        let bytes = "temp 48.3°C ✓\n".as_bytes();
        let degree = bytes.iter().position(|b| *b == 0xc2).unwrap();
        let check = bytes.len() - 3;

        let mut text = decoder.decode(&bytes[..degree + 1]);
        assert_eq!(text, "temp 48.3");
        text.push_str(&decoder.decode(&bytes[degree + 1..check + 1]));
        text.push_str(&decoder.decode(&bytes[check + 1..]));
        assert_eq!(text, "temp 48.3°C ✓\n");
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = StreamDecoder::default();
        assert_eq!(decoder.decode(&[b'o', 0xff, b'k']), "o\u{fffd}k");
        assert_eq!(incomplete_tail(b"plain"), 0);
        assert_eq!(incomplete_tail(&[0xe2, 0x9c]), 2);
        assert_eq!(incomplete_tail(&[0xe2, 0x9c, 0x93]), 0);
    }

    #[tokio::test]
    async fn test_interrupt_without_session() {
        let manager = manager(MockExecutor::new());
        let mut sub = manager.bus().subscribe_all();

        assert!(matches!(
            manager.interrupt(),
            Err(RunnerError::NoActiveSession)
        ));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_empty_plan_is_rejected() {
        let manager = manager(MockExecutor::new());
        let invocation = Invocation::new("inv-empty".into(), "nothing");

        let err = manager
            .start(invocation, CommandPlan::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Config(_)));
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn test_resolved_command_is_rendered_plan() {
        let executor = MockExecutor::new();
        let manager = manager(executor);
        let plan = CommandPlan::new(vec![
            CommandStep::new("uptime"),
            CommandStep::labelled("Routing", "ip -br route"),
        ])
        .unwrap();

        let running = manager
            .start(Invocation::new("inv-r".into(), "network"), plan)
            .await
            .unwrap();
        let finished = running.wait().await.unwrap();
        assert_eq!(
            finished.resolved_command.as_deref(),
            Some("uptime && echo '=== Routing ===' && ip -br route")
        );
        assert_eq!(finished.state, InvocationState::Completed);
    }

    #[tokio::test]
    async fn test_slot_released_after_completion() {
        let manager = manager(MockExecutor::new().add_response(MockResponse::success("ok")));
        let running = manager
            .start(Invocation::new("inv-1".into(), "ls"), CommandPlan::single("ls"))
            .await
            .unwrap();
        assert_eq!(running.id().as_str(), "inv-1");
        running.wait().await.unwrap();
        assert!(!manager.is_busy());
        assert!(manager.active_invocation().is_none());
    }
}
