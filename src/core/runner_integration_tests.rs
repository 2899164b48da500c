//! Integration tests for the operation runner
//!
//! These tests run real operations on worker threads and validate what the
//! observer sees on the controlling side: event order, the single terminal
//! callback, cancellation precedence and the start gate.

#[cfg(test)]
mod tests {
    use super::super::config::ProgressConfig;
    use super::super::message_parser::MessageProgressParser;
    use super::super::models::{AppError, ErrorKind, OperationError, ProgressState};
    use super::super::observer::ProgressObserver;
    use super::super::runner::{Operation, OperationRunner, RunState};
    use parking_lot::Mutex;
    use std::fmt::Debug;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Observed {
        Progress(ProgressState),
        Step(usize, String),
        Success(String),
        Failure(ErrorKind, String),
        Cancelled,
    }

    impl Observed {
        fn is_terminal(&self) -> bool {
            matches!(
                self,
                Observed::Success(_) | Observed::Failure(..) | Observed::Cancelled
            )
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Observed>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Observed> {
            self.events.lock().clone()
        }

        fn progress(&self) -> Vec<ProgressState> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Observed::Progress(state) => Some(state),
                    _ => None,
                })
                .collect()
        }

        fn terminal_count(&self) -> usize {
            self.events().iter().filter(|e| e.is_terminal()).count()
        }
    }

    impl<P: Debug> ProgressObserver<P> for Recorder {
        fn on_progress(&mut self, state: &ProgressState) {
            self.events.lock().push(Observed::Progress(state.clone()));
        }

        fn on_step_changed(&mut self, index: usize, name: &str) {
            self.events.lock().push(Observed::Step(index, name.to_string()));
        }

        fn on_success(&mut self, payload: P) {
            self.events
                .lock()
                .push(Observed::Success(format!("{:?}", payload)));
        }

        fn on_failure(&mut self, kind: ErrorKind, detail: &str) {
            self.events
                .lock()
                .push(Observed::Failure(kind, detail.to_string()));
        }

        fn on_cancelled(&mut self) {
            self.events.lock().push(Observed::Cancelled);
        }
    }

    fn assert_non_decreasing(states: &[ProgressState]) {
        for pair in states.windows(2) {
            assert!(
                pair[1].overall_percent >= pair[0].overall_percent,
                "progress went backwards: {} -> {}",
                pair[0].overall_percent,
                pair[1].overall_percent
            );
        }
    }

    /// Test a multi-step run from start to success
    #[tokio::test]
    async fn test_multi_step_success() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::new("two steps", |sink| {
            sink.step_started(0).unwrap();
            sink.percent(50.0, Some("fetching"));
            sink.step_completed(0).unwrap();
            sink.step_started(1).unwrap();
            sink.percent(100.0, Some("saving"));
            Ok(42u32)
        })
        .with_steps(["fetch", "save"]);

        runner.start(operation, recorder.clone()).unwrap();
        assert_eq!(runner.state(), RunState::Running);

        assert_eq!(runner.wait().await, RunState::Succeeded);

        let events = recorder.events();
        assert_eq!(events.first(), Some(&Observed::Step(0, "fetch".to_string())));
        assert!(events.contains(&Observed::Step(1, "save".to_string())));
        assert_eq!(events.last(), Some(&Observed::Success("42".to_string())));
        assert_eq!(recorder.terminal_count(), 1);

        let overall: Vec<f64> = recorder
            .progress()
            .iter()
            .map(|s| s.overall_percent)
            .collect();
        assert_eq!(overall, vec![0.0, 25.0, 50.0, 50.0, 100.0]);

        let final_state = runner.progress().unwrap();
        assert!(final_state.terminal);
        assert!(!final_state.cancelled);
        assert_eq!(final_state.overall_percent, 100.0);

        let report = runner.last_report().unwrap();
        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(report.operation, "two steps");
        assert!(report.finished_at >= report.started_at);
    }

    /// Test that a second start before the first run finishes is rejected
    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let mut runner = OperationRunner::new().unwrap();
        let first = Recorder::default();
        let second = Recorder::default();

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let blocking = Operation::new("blocking", move |sink| {
            sink.percent(10.0, Some("waiting for release"));
            release_rx
                .recv()
                .map_err(|_| OperationError::internal("release channel closed"))?;
            Ok("first")
        });
        let handle = runner.start(blocking, first.clone()).unwrap();

        let rejected = runner.start(Operation::new("other", |_| Ok("second")), second.clone());
        assert!(matches!(rejected, Err(AppError::AlreadyRunning)));
        assert_eq!(runner.state(), RunState::Running);

        release_tx.send(()).unwrap();
        assert_eq!(runner.wait().await, RunState::Succeeded);

        assert_eq!(runner.last_report().unwrap().run_id, handle.run_id());
        assert_eq!(
            first.events().last(),
            Some(&Observed::Success("\"first\"".to_string()))
        );
        assert!(second.events().is_empty());
    }

    /// Test that an operation stopping at a checkpoint reports cancellation
    #[tokio::test]
    async fn test_cancel_at_checkpoint() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let operation = Operation::new("long loop", move |sink| {
            let _ = started_tx.send(());
            for i in 0..2_000 {
                sink.checkpoint()?;
                sink.percent(i as f64 / 20.0, None);
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });

        runner.start(operation, recorder.clone()).unwrap();
        started_rx.await.unwrap();

        assert!(runner.cancel());
        assert!(!runner.cancel());

        assert_eq!(runner.wait().await, RunState::Cancelled);
        assert_eq!(recorder.events().last(), Some(&Observed::Cancelled));
        assert_eq!(recorder.terminal_count(), 1);
        assert!(runner.progress().unwrap().cancelled);
    }

    /// Test that cancellation wins even when the operation returns Ok
    #[tokio::test]
    async fn test_cancel_takes_precedence_over_success() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let operation = Operation::new("quiet exit", move |sink| {
            let _ = started_tx.send(());
            while !sink.is_cancelled() {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(7u8)
        });

        let handle = runner.start(operation, recorder.clone()).unwrap();
        started_rx.await.unwrap();
        assert!(handle.cancel());

        assert_eq!(runner.wait().await, RunState::Cancelled);
        let events = recorder.events();
        assert_eq!(events, vec![Observed::Cancelled]);
    }

    /// Test that an error returned after cancellation is reported as cancelled
    #[tokio::test]
    async fn test_cancel_takes_precedence_over_failure() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let operation = Operation::<()>::new("interrupted fetch", move |sink| {
            let _ = started_tx.send(());
            while !sink.is_cancelled() {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(OperationError::transient_io("connection closed during shutdown"))
        });

        runner.start(operation, recorder.clone()).unwrap();
        started_rx.await.unwrap();
        assert!(runner.cancel());

        assert_eq!(runner.wait().await, RunState::Cancelled);
        assert_eq!(recorder.events(), vec![Observed::Cancelled]);
        assert_eq!(runner.last_report().unwrap().state, RunState::Cancelled);
    }

    /// Test that a panic after cancellation is reported as cancelled
    #[tokio::test]
    async fn test_cancel_takes_precedence_over_panic() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let operation = Operation::<()>::new("panics on shutdown", move |sink| {
            let _ = started_tx.send(());
            while !sink.is_cancelled() {
                std::thread::sleep(Duration::from_millis(2));
            }
            panic!("worker torn down mid-write");
        });

        runner.start(operation, recorder.clone()).unwrap();
        started_rx.await.unwrap();
        assert!(runner.cancel());

        assert_eq!(runner.wait().await, RunState::Cancelled);
        assert_eq!(recorder.events(), vec![Observed::Cancelled]);
        assert_eq!(recorder.terminal_count(), 1);
    }

    /// Test that a failing operation yields exactly one failure, last
    #[tokio::test]
    async fn test_failure_mid_run() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::<()>::new("flaky fetch", |sink| {
            sink.percent(30.0, Some("downloading"));
            Err(OperationError::transient_io("connection reset"))
        });

        runner.start(operation, recorder.clone()).unwrap();
        assert_eq!(runner.wait().await, RunState::Failed);

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Observed::Progress(s) if s.overall_percent == 30.0));
        assert_eq!(
            events[1],
            Observed::Failure(ErrorKind::TransientIo, "connection reset".to_string())
        );
    }

    /// Test that a panic inside the operation is contained
    #[tokio::test]
    async fn test_panic_becomes_internal_failure() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::<()>::new("panicking", |_sink| panic!("boom"));

        runner.start(operation, recorder.clone()).unwrap();
        assert_eq!(runner.wait().await, RunState::Failed);

        match recorder.events().last() {
            Some(Observed::Failure(ErrorKind::Internal, detail)) => {
                assert!(detail.contains("boom"), "unexpected detail: {detail}");
            }
            other => panic!("expected internal failure, got {other:?}"),
        }
    }

    /// Test ordering when several worker threads report at once
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_producers_keep_order() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::new("fan out", |sink| {
            std::thread::scope(|scope| {
                for t in 0..4 {
                    scope.spawn(move || {
                        for i in 0..50 {
                            let message = format!("t{t}-{i}");
                            sink.percent((i * 2) as f64, Some(&message));
                        }
                    });
                }
            });
            Ok(())
        });

        runner.start(operation, recorder.clone()).unwrap();
        assert_eq!(runner.wait().await, RunState::Succeeded);

        let states = recorder.progress();
        assert_eq!(states.len(), 200);
        assert_non_decreasing(&states);

        let mut last_seen = [None::<usize>; 4];
        for state in &states {
            let (thread, seq) = state
                .current_message
                .trim_start_matches('t')
                .split_once('-')
                .map(|(t, i)| (t.parse::<usize>().unwrap(), i.parse::<usize>().unwrap()))
                .unwrap();
            if let Some(previous) = last_seen[thread] {
                assert!(seq > previous, "thread {thread} reordered: {previous} then {seq}");
            }
            last_seen[thread] = Some(seq);
        }
    }

    /// Test free-form messages routed through the phase parser
    #[tokio::test]
    async fn test_messages_drive_phase_progress() {
        let mut parser = MessageProgressParser::new();
        parser
            .register_pattern("Transcript download:", (0.0, 50.0))
            .unwrap();
        parser
            .register_pattern("Thumbnail download:", (50.0, 100.0))
            .unwrap();

        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::new("channel download", |sink| {
            sink.message("Transcript download: 5/10");
            sink.message("Skipping video without captions");
            sink.message("Transcript download: 2/10");
            sink.message("Thumbnail download: 10/10");
            Ok(())
        })
        .with_parser(parser);

        runner.start(operation, recorder.clone()).unwrap();
        runner.wait().await;

        let states = recorder.progress();
        let overall: Vec<f64> = states.iter().map(|s| s.overall_percent).collect();
        assert_eq!(overall, vec![25.0, 25.0, 25.0, 100.0]);
        assert_eq!(states[1].current_message, "Skipping video without captions");
    }

    /// Test the default configuration's steps and phases together
    #[tokio::test]
    async fn test_default_config_phase_messages_always_advance() {
        let config = ProgressConfig::default();
        let parser = config.build_parser().unwrap();
        let labels: Vec<String> = config.phases.iter().map(|p| p.label.clone()).collect();
        assert_eq!(config.steps.len(), labels.len());

        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let phase_labels = labels.clone();
        let operation = Operation::new("default channel download", move |sink| {
            sink.indeterminate("Resolving channel");
            for (step, label) in phase_labels.iter().enumerate() {
                sink.step_started(step)?;
                for i in 1..=8 {
                    sink.message(format!("{} {}/8", label, i));
                }
                sink.step_completed(step)?;
            }
            Ok(())
        })
        .with_steps(config.steps.clone())
        .with_parser(parser);

        runner.start(operation, recorder.clone()).unwrap();
        assert_eq!(runner.wait().await, RunState::Succeeded);

        let states = recorder.progress();
        assert_non_decreasing(&states);

        let matched: Vec<f64> = states
            .iter()
            .filter(|s| labels.iter().any(|l| s.current_message.starts_with(l.as_str())))
            .map(|s| s.overall_percent)
            .collect();
        assert_eq!(matched.len(), 16);
        for pair in matched.windows(2) {
            assert!(
                pair[1] > pair[0],
                "phase message did not advance: {} -> {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(matched[7], 50.0);
        assert_eq!(matched[15], 100.0);
    }

    /// Test that only the runner's final snapshot carries the terminal flag
    #[tokio::test]
    async fn test_terminal_flag_set_after_terminal_callback() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        let operation = Operation::<()>::new("short", |sink| {
            sink.percent(20.0, Some("working"));
            sink.finish("done");
            Err(OperationError::validation("bad channel"))
        });

        runner.start(operation, recorder.clone()).unwrap();
        assert!(!runner.progress().unwrap().terminal);
        assert_eq!(runner.wait().await, RunState::Failed);

        let states = recorder.progress();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| !s.terminal));

        let final_state = runner.progress().unwrap();
        assert!(final_state.terminal);
        assert!(!final_state.cancelled);
        assert_eq!(final_state.overall_percent, 100.0);
        assert_eq!(final_state.current_message, "done");
    }

    /// Test the terminal gate: cancel is a no-op afterwards and a new run may start
    #[tokio::test]
    async fn test_restart_after_terminal() {
        let mut runner = OperationRunner::new().unwrap();

        runner
            .start(Operation::new("first", |_| Ok(1)), Recorder::default())
            .unwrap();
        assert_eq!(runner.wait().await, RunState::Succeeded);
        let first_run = runner.last_report().unwrap().run_id;

        assert!(!runner.cancel());
        assert_eq!(runner.state(), RunState::Succeeded);

        let recorder = Recorder::default();
        runner
            .start(
                Operation::new("second", |sink| {
                    sink.percent(5.0, None);
                    Ok(2)
                }),
                recorder.clone(),
            )
            .unwrap();
        let progress = runner.progress().unwrap();
        assert!(!progress.terminal);
        assert_eq!(progress.overall_percent, 0.0);

        assert_eq!(runner.wait().await, RunState::Succeeded);
        assert_ne!(runner.last_report().unwrap().run_id, first_run);
        assert_eq!(recorder.progress()[0].overall_percent, 5.0);
    }

    /// Test polling delivery from a controller without a tokio runtime
    #[test]
    fn test_dispatch_pending_without_runtime() {
        let mut runner = OperationRunner::new().unwrap();
        let recorder = Recorder::default();

        assert_eq!(runner.dispatch_pending(), 0);

        let operation = Operation::new("polled", |sink| {
            sink.indeterminate("Resolving channel");
            sink.percent(40.0, Some("Fetching videos"));
            Ok("done")
        });
        runner.start(operation, recorder.clone()).unwrap();

        assert_eq!(
            runner.wait_blocking(Duration::from_millis(5)),
            RunState::Succeeded
        );

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Observed::Progress(s) if s.indeterminate));
        assert!(matches!(&events[1], Observed::Progress(s) if s.overall_percent == 40.0));
        assert_eq!(events[2], Observed::Success("\"done\"".to_string()));
        assert_eq!(runner.dispatch_pending(), 0);
    }

    /// Test that a bad step index inside an operation surfaces as an internal failure
    #[test]
    fn test_step_misuse_fails_run_on_current_thread_runtime() {
        tokio_test::block_on(async {
            let mut runner = OperationRunner::new().unwrap();
            let recorder = Recorder::default();

            let operation = Operation::new("misused steps", |sink| {
                sink.step_started(0)?;
                sink.step_started(5)?;
                Ok(())
            })
            .with_steps(["only step"]);
            runner.start(operation, recorder.clone()).unwrap();

            assert_eq!(runner.wait().await, RunState::Failed);
            let events = recorder.events();
            assert_eq!(events[0], Observed::Step(0, "only step".to_string()));
            match events.last() {
                Some(Observed::Failure(ErrorKind::Internal, detail)) => {
                    assert!(detail.contains("out of range"), "unexpected detail: {detail}");
                }
                other => panic!("expected internal failure, got {other:?}"),
            }
            assert_eq!(recorder.terminal_count(), 1);
        });
    }
}
