// End-to-end behaviour of the gateway: lines in, windows out, commands back.
//
// The stub classifier buckets windows by mean |a|:
//   < 0.3 default, < 0.8 up-down, < 1.5 left-right, otherwise circle-right.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver};

use gesturegate::classify::ClassificationAdapter;
use gesturegate::config::DeviceConfig;
use gesturegate::drivers::feedback::DeviceCommander;
use gesturegate::drivers::serial::CommandSink;
use gesturegate::ei::{Classifier, ModelProperties, RawOutput, StubClassifier};
use gesturegate::error::{ClassifierError, TransportError};
use gesturegate::events::{FeedbackDecision, TransportEvent};
use gesturegate::ingest::{SampleBuffer, SampleIngestor};
use gesturegate::scheduler::{Dispatch, InFlightSlot, TickOutcome, WindowScheduler};
use gesturegate::sequence::{MismatchPolicy, SequenceValidator};
use gesturegate::tasks::acquisition::Acquisition;
use gesturegate::tasks::ai::{ai_task, FeedbackPipeline, WindowOutcome};

const STUB_SEQUENCE: [&str; 4] = ["default", "up-down", "left-right", "circle-right"];

#[derive(Clone, Default)]
struct SharedSink {
    open: bool,
    lines: Arc<Mutex<Vec<String>>>,
}

impl SharedSink {
    fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl CommandSink for SharedSink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

/// Fails the first `failures` calls, then defers to the stub.
struct Flaky {
    inner: StubClassifier,
    failures: usize,
}

impl Classifier for Flaky {
    fn initialize(&mut self) -> Result<ModelProperties, ClassifierError> {
        self.inner.initialize()
    }

    fn properties(&self) -> Result<&ModelProperties, ClassifierError> {
        self.inner.properties()
    }

    fn classify(&mut self, features: &[f32]) -> Result<RawOutput, ClassifierError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ClassifierError::ClassificationFailed {
                code: -3,
                detail: "dsp error".into(),
            });
        }
        self.inner.classify(features)
    }
}

struct Rig {
    acquisition: Acquisition,
    windows: Receiver<Dispatch>,
    pipeline: FeedbackPipeline<SharedSink>,
    sink: SharedSink,
}

fn rig(classifier: Box<dyn Classifier>, policy: MismatchPolicy, sink: SharedSink) -> Rig {
    let buffer = SampleBuffer::new();
    let (window_tx, windows) = bounded(1);
    let scheduler = WindowScheduler::new(buffer.clone(), InFlightSlot::new(), window_tx);
    let acquisition = Acquisition::new(SampleIngestor::new(buffer), scheduler, "ACK");

    let labels = STUB_SEQUENCE.iter().map(|l| l.to_string()).collect();
    let validator = SequenceValidator::new(labels, policy, "unknown").unwrap();
    let adapter = ClassificationAdapter::new(classifier).unwrap();
    let commander = DeviceCommander::new(sink.clone(), &DeviceConfig::default());

    Rig {
        acquisition,
        windows,
        pipeline: FeedbackPipeline::new(adapter, validator, commander),
        sink,
    }
}

fn stub_rig(policy: MismatchPolicy) -> Rig {
    rig(Box::new(StubClassifier::new()), policy, SharedSink::open())
}

/// Feed `n` samples of magnitude `a` on every axis.
fn feed(rig: &mut Rig, a: f32, n: usize) {
    for _ in 0..n {
        rig.acquisition
            .on_transport_event(TransportEvent::Line(format!("{a},{a},{a}")));
    }
}

/// One tick plus synchronous processing of whatever was dispatched.
fn window(rig: &mut Rig) -> Option<WindowOutcome> {
    match rig.acquisition.on_tick() {
        TickOutcome::Dispatched { .. } => {
            let Dispatch { window, permit } = rig.windows.try_recv().unwrap();
            let outcome = rig.pipeline.process(&window);
            drop(permit);
            Some(outcome)
        }
        _ => None,
    }
}

fn decision(outcome: Option<WindowOutcome>) -> FeedbackDecision {
    match outcome {
        Some(WindowOutcome::Decided { decision, .. }) => decision,
        other => panic!("expected a decision, got {other:?}"),
    }
}

#[test]
fn full_sequence_completes_a_cycle() {
    let mut rig = stub_rig(MismatchPolicy::Hold);

    for a in [0.1, 0.5, 1.0, 2.0] {
        feed(&mut rig, a, 10);
        assert!(decision(window(&mut rig)).is_match());
    }

    assert_eq!(rig.pipeline.validator().cursor(), 0);
    assert_eq!(rig.pipeline.validator().completed_cycles(), 1);
    assert_eq!(rig.sink.lines(), vec!["LED_ON"; 4]);
}

#[test]
fn mismatch_policy_decides_the_cursor() {
    for (policy, cursor) in [(MismatchPolicy::Hold, 1), (MismatchPolicy::Reset, 0)] {
        let mut rig = stub_rig(policy);

        feed(&mut rig, 0.1, 5);
        assert!(decision(window(&mut rig)).is_match());

        // Expected up-down, the stub says circle-right.
        feed(&mut rig, 2.0, 5);
        assert_eq!(
            decision(window(&mut rig)),
            FeedbackDecision::Mismatched {
                expected: "up-down".into(),
                actual: "circle-right".into(),
            }
        );
        assert_eq!(rig.pipeline.validator().cursor(), cursor);
        assert_eq!(rig.sink.lines(), vec!["LED_ON", "BUZZER_ON"]);
    }
}

#[test]
fn empty_window_is_not_classified() {
    let mut rig = stub_rig(MismatchPolicy::Hold);
    rig.acquisition
        .on_transport_event(TransportEvent::Line("ACK LED_ON".into()));
    rig.acquisition
        .on_transport_event(TransportEvent::Line("not,a,sample".into()));

    assert_eq!(rig.acquisition.on_tick(), TickOutcome::NoData);
    assert!(rig.windows.try_recv().is_err());
    assert!(rig.sink.lines().is_empty());
}

#[test]
fn busy_tick_carries_samples_into_next_window() {
    let mut rig = stub_rig(MismatchPolicy::Hold);

    feed(&mut rig, 0.1, 4);
    assert_eq!(
        rig.acquisition.on_tick(),
        TickOutcome::Dispatched { seq: 1, samples: 4 }
    );
    let first = rig.windows.try_recv().unwrap();

    // First window still in flight.
    feed(&mut rig, 0.5, 3);
    assert_eq!(rig.acquisition.on_tick(), TickOutcome::Busy);
    feed(&mut rig, 0.5, 2);

    rig.pipeline.process(&first.window);
    drop(first.permit);

    assert_eq!(
        rig.acquisition.on_tick(),
        TickOutcome::Dispatched { seq: 2, samples: 5 }
    );
    assert_eq!(rig.acquisition.stats().skipped, 1);
}

#[test]
fn closed_transport_drops_command_but_keeps_decision() {
    let mut rig = rig(
        Box::new(StubClassifier::new()),
        MismatchPolicy::Hold,
        SharedSink::default(),
    );

    feed(&mut rig, 0.1, 3);
    match window(&mut rig) {
        Some(WindowOutcome::Decided {
            decision, delivery, ..
        }) => {
            assert!(decision.is_match());
            assert!(matches!(delivery, Err(TransportError::Unavailable)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.pipeline.validator().cursor(), 1);
    assert!(rig.sink.lines().is_empty());
    assert_eq!(rig.pipeline.commander().dropped(), 1);
}

#[test]
fn classification_failure_skips_one_window_only() {
    let flaky = Flaky {
        inner: StubClassifier::new(),
        failures: 1,
    };
    let mut rig = rig(Box::new(flaky), MismatchPolicy::Hold, SharedSink::open());

    feed(&mut rig, 0.1, 3);
    assert!(matches!(
        window(&mut rig),
        Some(WindowOutcome::Failed { seq: 1, .. })
    ));
    assert_eq!(rig.pipeline.validator().cursor(), 0);
    assert!(rig.sink.lines().is_empty());

    feed(&mut rig, 0.1, 3);
    assert!(decision(window(&mut rig)).is_match());
    assert_eq!(rig.sink.lines(), vec!["LED_ON"]);
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn threaded_loop_and_worker() {
    let sink = SharedSink::open();
    let buffer = SampleBuffer::new();
    let slot = InFlightSlot::new();
    let (window_tx, window_rx) = bounded(1);
    let scheduler = WindowScheduler::new(buffer.clone(), slot.clone(), window_tx);
    let acquisition = Acquisition::new(SampleIngestor::new(buffer.clone()), scheduler, "ACK");

    let labels = STUB_SEQUENCE.iter().map(|l| l.to_string()).collect();
    let validator = SequenceValidator::new(labels, MismatchPolicy::Hold, "unknown").unwrap();
    let adapter = ClassificationAdapter::new(Box::new(StubClassifier::new())).unwrap();
    let commander = DeviceCommander::new(sink.clone(), &DeviceConfig::default());
    let pipeline = FeedbackPipeline::new(adapter, validator, commander);

    let (event_tx, event_rx) = unbounded();
    let (tick_tx, tick_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = bounded(1);

    let worker = thread::spawn(move || ai_task(window_rx, pipeline));
    let main_loop = thread::spawn(move || acquisition.run(event_rx, tick_rx, shutdown_rx));

    event_tx
        .send(TransportEvent::Opened("/dev/null".into()))
        .unwrap();
    for _ in 0..3 {
        event_tx
            .send(TransportEvent::Line("0.1,0.1,0.1".into()))
            .unwrap();
    }
    wait_for("samples", || buffer.len() == 3);

    tick_tx.send(Instant::now()).unwrap();
    wait_for("command", || sink.lines().len() == 1);
    wait_for("slot release", || !slot.is_busy());

    shutdown_tx.send(()).unwrap();
    let stats = main_loop.join().unwrap();
    let pipeline = worker.join().unwrap();

    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.windows, 1);
    assert_eq!(sink.lines(), vec!["LED_ON"]);
    assert_eq!(pipeline.validator().cursor(), 1);
}
