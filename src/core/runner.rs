//! Background operation runner
//!
//! Runs one long operation at a time on a worker thread and relays its
//! progress to a [`ProgressObserver`] that lives on the controlling context.
//!
//! The worker never touches the observer. It mutates the run's
//! [`ProgressState`] under a lock and pushes a snapshot into an unbounded
//! channel inside the same critical section, so snapshots arrive in the order
//! they were produced. The controlling context drains that channel with
//! [`OperationRunner::dispatch_pending`] (from a GUI idle/timer callback) or
//! [`OperationRunner::wait`] (from async code). The terminal outcome travels on
//! a separate oneshot channel and is only delivered after the progress channel
//! has closed, which makes it the last callback of every run.
//!
//! Cancellation is cooperative: [`OperationRunner::cancel`] sets a flag that
//! the operation polls through [`ProgressSink::checkpoint`]. An operation that
//! never polls the flag runs to completion; its outcome is still reported as
//! cancelled.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::message_parser::MessageProgressParser;
use crate::core::models::{
    AppError, AppResult, ErrorKind, OperationError, OperationResult, ProgressEvent, ProgressState,
};
use crate::core::observer::ProgressObserver;
use crate::core::step_sequencer::StepSequencer;

pub type OperationBody<P> =
    Box<dyn FnOnce(&ProgressSink) -> Result<P, OperationError> + Send + 'static>;

/// A unit of long-running work, consumed by one run
pub struct Operation<P> {
    name: String,
    steps: Vec<String>,
    parser: MessageProgressParser,
    body: OperationBody<P>,
}

impl<P> Operation<P> {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&ProgressSink) -> Result<P, OperationError> + Send + 'static,
    {
        Self {
            name: name.into(),
            steps: Vec::new(),
            parser: MessageProgressParser::new(),
            body: Box::new(body),
        }
    }

    /// Declare named steps; without them the run is single-step
    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Parser applied to free-form messages sent through [`ProgressSink::message`]
    pub fn with_parser(mut self, parser: MessageProgressParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

/// Shared cooperative cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true only for the call that set it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Returned by [`OperationRunner::start`]; can request cancellation from any thread
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancelToken,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Timing summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub operation: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug)]
enum RunMessage {
    Progress(ProgressState),
    StepChanged { index: usize, name: String },
}

#[derive(Debug)]
struct SinkInner {
    state: ProgressState,
    sequencer: StepSequencer,
}

/// Worker-side handle an operation reports through
#[derive(Debug)]
pub struct ProgressSink {
    run_id: Uuid,
    cancel: CancelToken,
    parser: MessageProgressParser,
    inner: Mutex<SinkInner>,
    sender: mpsc::UnboundedSender<RunMessage>,
}

impl ProgressSink {
    fn new(
        run_id: Uuid,
        cancel: CancelToken,
        steps: Vec<String>,
        parser: MessageProgressParser,
        sender: mpsc::UnboundedSender<RunMessage>,
    ) -> Self {
        let sequencer = StepSequencer::new(steps);
        let mut state = ProgressState::new(run_id, sequencer.step_count());
        state.current_step_name = sequencer.current_step_name().map(str::to_string);

        Self {
            run_id,
            cancel,
            parser,
            inner: Mutex::new(SinkInner { state, sequencer }),
            sender,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation checkpoint; use with `?` inside the operation body
    pub fn checkpoint(&self) -> Result<(), OperationError> {
        if self.cancel.is_cancelled() {
            debug!("Run {} observed cancellation at checkpoint", self.run_id);
            Err(OperationError::cancelled())
        } else {
            Ok(())
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn emit(&self, event: ProgressEvent) -> AppResult<()> {
        match event {
            ProgressEvent::Percent { value, message } => {
                self.percent(value, message.as_deref());
                Ok(())
            }
            ProgressEvent::StepStarted { index, name } => self.begin_step(index, Some(&name)),
            ProgressEvent::StepCompleted { index } => self.step_completed(index),
            ProgressEvent::Indeterminate { message } => {
                self.indeterminate(message);
                Ok(())
            }
        }
    }

    /// Progress within the current step (overall progress in single-step mode)
    pub fn percent(&self, value: f64, message: Option<&str>) {
        let mut inner = self.inner.lock();
        let overall = inner.sequencer.update_step_progress(value);
        inner.state.advance_to(overall);
        inner.state.indeterminate = false;
        if let Some(message) = message {
            inner.state.current_message = message.to_string();
        }
        self.publish(&mut inner);
    }

    pub fn step_started(&self, index: usize) -> AppResult<()> {
        self.begin_step(index, None)
    }

    pub fn step_completed(&self, index: usize) -> AppResult<()> {
        let mut inner = self.inner.lock();
        let step_count = inner.sequencer.step_count();
        if index >= step_count {
            return Err(AppError::OutOfRange { index, step_count });
        }

        // Completing a step that was never begun begins it first
        if inner.sequencer.current_index() != index {
            inner.sequencer.begin_step(index)?;
            inner.state.current_step_index = index;
            inner.state.current_step_name = inner.sequencer.step_name(index).map(str::to_string);
        }

        let overall = inner.sequencer.complete_step();
        inner.state.advance_to(overall);
        inner.state.indeterminate = false;
        let name = inner.state.current_step_name.clone().unwrap_or_default();
        inner.state.current_message = format!("{name} complete");
        self.publish(&mut inner);
        Ok(())
    }

    pub fn indeterminate(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.state.indeterminate = true;
        inner.state.current_message = message.into();
        self.publish(&mut inner);
    }

    /// Free-form status text. Text matching a registered pattern also moves
    /// the bar; anything else only updates the status message.
    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        let parsed = self.parser.parse(&text);

        let mut inner = self.inner.lock();
        if let Some(percent) = parsed {
            inner.state.advance_to(percent);
            inner.state.indeterminate = false;
        }
        inner.state.current_message = text;
        self.publish(&mut inner);
    }

    /// Jump to 100% and mark every step done
    pub fn finish(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.sequencer.complete_all();
        inner.state.advance_to(100.0);
        inner.state.current_step_index = inner.sequencer.step_count();
        inner.state.current_step_name = None;
        inner.state.indeterminate = false;
        inner.state.current_message = message.into();
        self.publish(&mut inner);
    }

    fn begin_step(&self, index: usize, name: Option<&str>) -> AppResult<()> {
        let mut inner = self.inner.lock();
        let overall = inner.sequencer.begin_step(index)?;
        inner.state.advance_to(overall);

        let name = name
            .filter(|n| !n.is_empty())
            .or_else(|| inner.sequencer.step_name(index))
            .unwrap_or_default()
            .to_string();

        inner.state.current_step_index = index;
        inner.state.current_step_name = Some(name.clone());
        inner.state.indeterminate = false;
        inner.state.current_message = format!("Starting {name}");

        self.send(RunMessage::StepChanged { index, name });
        self.publish(&mut inner);
        Ok(())
    }

    // Callers hold the lock so snapshots leave in production order
    fn publish(&self, inner: &mut SinkInner) {
        inner.state.cancelled = self.cancel.is_cancelled();
        self.send(RunMessage::Progress(inner.state.clone()));
    }

    fn send(&self, message: RunMessage) {
        if self.sender.send(message).is_err() {
            debug!("Run {} has no listener, dropping progress update", self.run_id);
        }
    }
}

struct WorkerRuntime {
    handle: Handle,
    owned: Option<Runtime>,
}

impl WorkerRuntime {
    fn acquire() -> AppResult<Self> {
        match Handle::try_current() {
            Ok(handle) => {
                debug!("Operation runner using existing tokio runtime");
                Ok(Self {
                    handle,
                    owned: None,
                })
            }
            Err(_) => {
                debug!("No tokio runtime found, creating dedicated runtime for operations");
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .thread_name("operation-runner-worker")
                    .build()
                    .map_err(|e| AppError::Runtime(format!("Failed to build runtime: {}", e)))?;
                Ok(Self {
                    handle: runtime.handle().clone(),
                    owned: Some(runtime),
                })
            }
        }
    }
}

impl Drop for WorkerRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

struct ActiveRun<P> {
    run_id: Uuid,
    name: String,
    cancel: CancelToken,
    observer: Box<dyn ProgressObserver<P>>,
    progress_rx: mpsc::UnboundedReceiver<RunMessage>,
    outcome_rx: oneshot::Receiver<OperationResult<P>>,
    progress_closed: bool,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Runs one operation at a time and relays its events to an observer
pub struct OperationRunner<P> {
    runtime: WorkerRuntime,
    state: RunState,
    active: Option<ActiveRun<P>>,
    last_progress: Option<ProgressState>,
    last_report: Option<RunReport>,
}

impl<P: Send + 'static> OperationRunner<P> {
    /// Uses the ambient tokio runtime, or a dedicated one when called outside a runtime
    pub fn new() -> AppResult<Self> {
        Ok(Self::with_runtime(WorkerRuntime::acquire()?))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self::with_runtime(WorkerRuntime {
            handle,
            owned: None,
        })
    }

    fn with_runtime(runtime: WorkerRuntime) -> Self {
        Self {
            runtime,
            state: RunState::Idle,
            active: None,
            last_progress: None,
            last_report: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Latest snapshot delivered to the controlling context
    pub fn progress(&self) -> Option<&ProgressState> {
        self.last_progress.as_ref()
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Dispatch `operation` to a worker thread without blocking the caller.
    ///
    /// Fails with [`AppError::AlreadyRunning`] until the previous run's
    /// terminal event has been delivered.
    pub fn start<O>(&mut self, operation: Operation<P>, observer: O) -> AppResult<RunHandle>
    where
        O: ProgressObserver<P> + 'static,
    {
        if self.state == RunState::Running {
            warn!(
                "Rejected start of '{}': another operation is still running",
                operation.name
            );
            return Err(AppError::AlreadyRunning);
        }

        let Operation {
            name,
            steps,
            parser,
            body,
        } = operation;

        let run_id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let step_count = steps.len();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let sink = ProgressSink::new(run_id, cancel.clone(), steps, parser, progress_tx);
        let initial_state = sink.inner.lock().state.clone();

        // The sink is dropped when the body returns, which closes the progress channel
        let worker = self.runtime.handle.spawn_blocking(move || {
            let result = body(&sink);
            let cancelled = sink.is_cancelled();
            (result, cancelled)
        });

        let supervisor_cancel = cancel.clone();
        self.runtime.handle.spawn(async move {
            let outcome = match worker.await {
                Ok((_, true)) => OperationResult::Cancelled,
                Ok((Ok(payload), false)) => OperationResult::Success(payload),
                Ok((Err(err), false)) if err.is_cancellation() => OperationResult::Cancelled,
                Ok((Err(err), false)) => OperationResult::Failure {
                    kind: err.kind,
                    detail: err.detail,
                },
                Err(_) if supervisor_cancel.is_cancelled() => OperationResult::Cancelled,
                Err(join_err) => {
                    let detail = panic_detail(join_err);
                    error!("Run {} worker crashed: {}", run_id, detail);
                    OperationResult::Failure {
                        kind: ErrorKind::Internal,
                        detail,
                    }
                }
            };

            if outcome_tx.send(outcome).is_err() {
                debug!("Runner dropped before run {} reported its outcome", run_id);
            }
        });

        self.state = RunState::Running;
        self.last_progress = Some(initial_state);
        self.active = Some(ActiveRun {
            run_id,
            name: name.clone(),
            cancel: cancel.clone(),
            observer: Box::new(observer),
            progress_rx,
            outcome_rx,
            progress_closed: false,
            started_at: Utc::now(),
            started: Instant::now(),
        });

        info!(
            "🚀 Started operation '{}' (run {}, {} steps)",
            name, run_id, step_count
        );
        Ok(RunHandle { run_id, cancel })
    }

    /// Request cooperative cancellation of the running operation.
    ///
    /// Idempotent; a no-op when nothing is running. Returns true only for the
    /// call that actually raised the flag.
    pub fn cancel(&self) -> bool {
        match &self.active {
            Some(active) if self.state == RunState::Running => {
                let first = active.cancel.cancel();
                if first {
                    info!(
                        "⏹️ Cancellation requested for '{}' (run {})",
                        active.name, active.run_id
                    );
                }
                first
            }
            _ => {
                debug!("Cancel ignored: no running operation");
                false
            }
        }
    }

    /// Deliver every event that is ready without blocking.
    ///
    /// Meant to be called from the controlling context's idle or timer hook.
    /// Returns the number of observer callbacks made.
    pub fn dispatch_pending(&mut self) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };

        let mut delivered = 0;
        while !active.progress_closed {
            match active.progress_rx.try_recv() {
                Ok(message) => {
                    Self::deliver(active, &mut self.last_progress, message);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) => return delivered,
                Err(TryRecvError::Disconnected) => active.progress_closed = true,
            }
        }

        let outcome = match active.outcome_rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return delivered,
            Err(oneshot::error::TryRecvError::Closed) => lost_outcome(),
        };
        self.finish(outcome);
        delivered + 1
    }

    /// Drive delivery until the running operation's terminal event
    pub async fn wait(&mut self) -> RunState {
        loop {
            let Some(active) = self.active.as_mut() else {
                return self.state;
            };

            if !active.progress_closed {
                match active.progress_rx.recv().await {
                    Some(message) => Self::deliver(active, &mut self.last_progress, message),
                    None => active.progress_closed = true,
                }
                continue;
            }

            let outcome = (&mut active.outcome_rx)
                .await
                .unwrap_or_else(|_| lost_outcome());
            self.finish(outcome);
        }
    }

    /// Poll-and-sleep variant of [`wait`](Self::wait) for controllers that are
    /// not async. Must not be called from inside a tokio task.
    pub fn wait_blocking(&mut self, poll_interval: Duration) -> RunState {
        while self.state == RunState::Running {
            if self.dispatch_pending() == 0 {
                std::thread::sleep(poll_interval);
            }
        }
        self.state
    }

    fn deliver(
        active: &mut ActiveRun<P>,
        last_progress: &mut Option<ProgressState>,
        message: RunMessage,
    ) {
        match message {
            RunMessage::Progress(state) => {
                active.observer.on_progress(&state);
                *last_progress = Some(state);
            }
            RunMessage::StepChanged { index, name } => {
                active.observer.on_step_changed(index, &name);
            }
        }
    }

    fn finish(&mut self, outcome: OperationResult<P>) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        let state = match &outcome {
            OperationResult::Success(_) => RunState::Succeeded,
            OperationResult::Failure { .. } => RunState::Failed,
            OperationResult::Cancelled => RunState::Cancelled,
        };

        let mut final_progress = self
            .last_progress
            .take()
            .unwrap_or_else(|| ProgressState::new(active.run_id, 0));
        final_progress.terminal = true;
        final_progress.cancelled = state == RunState::Cancelled;
        self.last_progress = Some(final_progress);

        let elapsed = active.started.elapsed();
        self.state = state;
        self.last_report = Some(RunReport {
            run_id: active.run_id,
            operation: active.name.clone(),
            state,
            started_at: active.started_at,
            finished_at: Utc::now(),
            elapsed,
        });

        match outcome {
            OperationResult::Success(payload) => {
                info!(
                    "✅ Operation '{}' completed in {:.1}s",
                    active.name,
                    elapsed.as_secs_f64()
                );
                active.observer.on_success(payload);
            }
            OperationResult::Failure { kind, detail } => {
                warn!(
                    "❌ Operation '{}' failed after {:.1}s ({}): {}",
                    active.name,
                    elapsed.as_secs_f64(),
                    kind,
                    detail
                );
                active.observer.on_failure(kind, &detail);
            }
            OperationResult::Cancelled => {
                info!(
                    "🚫 Operation '{}' cancelled after {:.1}s",
                    active.name,
                    elapsed.as_secs_f64()
                );
                active.observer.on_cancelled();
            }
        }
    }
}

impl<P> Drop for OperationRunner<P> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            warn!(
                "Runner dropped while '{}' is running, requesting cancellation",
                active.name
            );
            active.cancel.cancel();
        }
    }
}

fn lost_outcome<P>() -> OperationResult<P> {
    OperationResult::Failure {
        kind: ErrorKind::Internal,
        detail: "worker exited without reporting an outcome".to_string(),
    }
}

fn panic_detail(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("worker task aborted: {}", err);
    }

    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("operation panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("operation panicked: {}", message)
    } else {
        "operation panicked".to_string()
    }
}
