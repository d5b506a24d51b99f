use super::*;
use crate::flow::field::FlowField;
use crate::project::nodes::Node;
use crate::render::target::InMemoryTarget;
use crate::source::frames::SyntheticFrameSource;
use std::sync::mpsc;

fn nodes() -> NodeList {
    // 4 output seconds show 1 source second.
    NodeList::new(vec![Node::new(0.0, 0.0), Node::new(4.0, 1.0)]).unwrap()
}

fn synthetic() -> Arc<dyn FrameSource> {
    Arc::new(SyntheticFrameSource::new(16, 8, 8, 4.0).unwrap())
}

fn inputs(flow: Option<Box<dyn FlowSource>>) -> RenderInputs {
    RenderInputs {
        nodes: nodes(),
        frames: synthetic(),
        flow,
    }
}

fn recorder() -> (Arc<dyn TaskObserver>, Arc<Mutex<Vec<TaskEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let observer: Arc<dyn TaskObserver> = Arc::new(move |e: &TaskEvent| {
        sink.lock().unwrap().push(e.clone());
    });
    (observer, events)
}

fn task_with_target() -> (RenderTask, InMemoryTarget, Arc<Mutex<Vec<TaskEvent>>>) {
    let mut task = RenderTask::new(nodes().bounds());
    task.set_fps(2.0).unwrap();
    let target = InMemoryTarget::new();
    task.set_render_target(Box::new(target.clone())).unwrap();
    let (observer, events) = recorder();
    task.subscribe(observer);
    (task, target, events)
}

fn assert_event_protocol(events: &[TaskEvent]) -> (u64, TerminalEvent) {
    let Some(TaskEvent::Sized { total, .. }) = events.first() else {
        panic!("first event must be Sized: {events:?}");
    };
    let Some(TaskEvent::Terminal(terminal)) = events.last() else {
        panic!("last event must be Terminal: {events:?}");
    };
    let mut last = 0;
    for e in &events[1..events.len() - 1] {
        match e {
            TaskEvent::Progress(v) => {
                assert!(*v >= last, "progress went backwards");
                assert!(*v <= *total, "progress beyond total");
                last = *v;
            }
            other => panic!("unexpected mid-run event {other:?}"),
        }
    }
    (*total, terminal.clone())
}

/// Frame source whose `frame` blocks until the test releases it.
struct GatedSource {
    inner: SyntheticFrameSource,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl FrameSource for GatedSource {
    fn fps(&self) -> f64 {
        self.inner.fps()
    }
    fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }
    fn dimensions(&self, size: FrameSize) -> (u32, u32) {
        self.inner.dimensions(size)
    }
    fn frame(&self, index: u64, size: FrameSize) -> SlowmoResult<FrameRGBA> {
        let _ = self.gate.lock().unwrap().recv();
        self.inner.frame(index, size)
    }
    fn describe(&self) -> String {
        "gated".to_string()
    }
}

fn gated_inputs() -> (RenderInputs, mpsc::Sender<()>) {
    let (tx, rx) = mpsc::channel();
    let frames: Arc<dyn FrameSource> = Arc::new(GatedSource {
        inner: SyntheticFrameSource::new(16, 8, 8, 4.0).unwrap(),
        gate: Mutex::new(rx),
    });
    (
        RenderInputs {
            nodes: nodes(),
            frames,
            flow: None,
        },
        tx,
    )
}

#[derive(Clone)]
struct ZeroFlow {
    calls: Arc<Mutex<u32>>,
}

impl FlowSource for ZeroFlow {
    fn name(&self) -> &'static str {
        "zero"
    }
    fn forward_flow(&mut self, pair: FramePair<'_>) -> SlowmoResult<FlowField> {
        *self.calls.lock().unwrap() += 1;
        Ok(FlowField::zero(pair.left.width, pair.left.height))
    }
    fn boxed_clone(&self) -> Box<dyn FlowSource> {
        Box::new(self.clone())
    }
}

#[test]
fn start_without_target_fails_and_emits_nothing() {
    let mut task = RenderTask::new(nodes().bounds());
    let (observer, events) = recorder();
    task.subscribe(observer);
    assert!(matches!(task.start(inputs(None)), Err(SlowmoError::NoTarget)));
    assert_eq!(task.state(), RunState::Idle);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn abort_before_start_has_no_effect() {
    let (mut task, target, events) = task_with_target();
    task.abort();
    assert_eq!(task.state(), RunState::Idle);
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(task.wait(), RunState::Idle);
    assert!(task.has_target());
    assert_eq!(target.frame_count(), 0);
}

#[test]
fn full_run_follows_event_protocol() {
    let (mut task, target, events) = task_with_target();
    task.start(inputs(None)).unwrap();
    assert_eq!(task.wait(), RunState::Finished);

    let events = events.lock().unwrap().clone();
    let (total, terminal) = assert_event_protocol(&events);
    assert_eq!(total, 8);
    assert_eq!(terminal.kind, TerminalKind::Finished);
    assert_eq!(events[events.len() - 2], TaskEvent::Progress(8));

    let written = target.frames();
    let indices: Vec<u64> = written.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
    assert!(target.is_ended());
    assert_eq!(target.config().unwrap().width, 16);
    assert!(task.has_target(), "target returns to the task after the run");
}

#[test]
fn linear_mode_blends_between_source_frames() {
    let (mut task, target, _) = task_with_target();
    task.start(inputs(None)).unwrap();
    task.wait();

    let src = SyntheticFrameSource::new(16, 8, 8, 4.0).unwrap();
    let f0 = src.frame(0, FrameSize::Original).unwrap();
    let f1 = src.frame(1, FrameSize::Original).unwrap();
    let frames = target.frames();
    // Output frame 0 sits exactly on source frame 0, output frame 1 halfway to source frame 1.
    assert_eq!(frames[0].1, f0);
    assert_eq!(frames[1].1, interpolate::blend(&f0, &f1, 0.5).unwrap());
    assert_eq!(frames[2].1, f1);
}

#[test]
fn nearest_and_small_size_are_honoured() {
    let (mut task, target, _) = task_with_target();
    task.set_interpolation(InterpolationMode::Nearest).unwrap();
    task.set_size(FrameSize::Small).unwrap();
    task.start(inputs(None)).unwrap();
    task.wait();

    let src = SyntheticFrameSource::new(16, 8, 8, 4.0).unwrap();
    let frames = target.frames();
    assert_eq!((frames[1].1.width, frames[1].1.height), (8, 4));
    assert_eq!(frames[1].1, src.frame(1, FrameSize::Small).unwrap());
}

#[test]
fn flow_mode_without_flow_source_aborts() {
    let (mut task, _target, events) = task_with_target();
    task.set_interpolation(InterpolationMode::Flow).unwrap();
    task.start(inputs(None)).unwrap();
    assert_eq!(task.wait(), RunState::Aborted);

    let events = events.lock().unwrap().clone();
    let (_, terminal) = assert_event_protocol(&events);
    assert_eq!(terminal.kind, TerminalKind::Aborted);
    assert!(terminal.reason.contains("flow source"));
}

#[test]
fn flow_mode_queries_flow_for_fractional_positions() {
    let (mut task, target, _) = task_with_target();
    task.set_interpolation(InterpolationMode::Flow).unwrap();
    let calls = Arc::new(Mutex::new(0));
    let flow = ZeroFlow {
        calls: Arc::clone(&calls),
    };
    task.start(inputs(Some(Box::new(flow)))).unwrap();
    assert_eq!(task.wait(), RunState::Finished);

    // Odd output frames fall halfway between source frames.
    assert_eq!(*calls.lock().unwrap(), 4);
    let src = SyntheticFrameSource::new(16, 8, 8, 4.0).unwrap();
    let f0 = src.frame(0, FrameSize::Original).unwrap();
    let f1 = src.frame(1, FrameSize::Original).unwrap();
    assert_eq!(
        target.frames()[1].1,
        interpolate::blend(&f0, &f1, 0.5).unwrap()
    );
}

#[test]
fn running_task_rejects_reconfiguration_and_stops_on_abort() {
    let (mut task, target, events) = task_with_target();
    let (inputs, release) = gated_inputs();
    task.start(inputs).unwrap();
    assert!(task.is_running());

    assert!(matches!(task.set_fps(30.0), Err(SlowmoError::Busy)));
    assert!(matches!(
        task.set_time_range(0.0, 1.0),
        Err(SlowmoError::Busy)
    ));
    assert!(matches!(
        task.set_render_target(Box::new(InMemoryTarget::new())),
        Err(SlowmoError::Busy)
    ));
    assert_eq!(task.settings().fps.get(), 2.0);

    task.abort();
    drop(release);
    assert_eq!(task.wait(), RunState::Stopped);

    let events = events.lock().unwrap().clone();
    let (total, terminal) = assert_event_protocol(&events);
    assert_eq!(terminal.kind, TerminalKind::Stopped);
    assert!((target.frame_count() as u64) < total);
    assert!(target.is_ended());
}

#[test]
fn second_start_while_running_is_a_no_op() {
    let (mut task, _target, events) = task_with_target();
    let (first, release) = gated_inputs();
    task.start(first).unwrap();
    task.start(inputs(None)).unwrap();
    drop(release);
    assert_eq!(task.wait(), RunState::Finished);

    let events = events.lock().unwrap();
    let sized = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Sized { .. }))
        .count();
    let terminals = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Terminal(_)))
        .count();
    assert_eq!((sized, terminals), (1, 1));
}

#[test]
fn restart_after_finish_runs_again_from_the_beginning() {
    let (mut task, target, events) = task_with_target();
    task.start(inputs(None)).unwrap();
    task.wait();
    task.set_time_range(1.0, 2.0).unwrap();
    task.start(inputs(None)).unwrap();
    assert_eq!(task.wait(), RunState::Finished);

    assert_eq!(target.frame_count(), 2);
    let events = events.lock().unwrap();
    let terminals = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Terminal(_)))
        .count();
    assert_eq!(terminals, 2);
}

#[test]
fn time_range_is_validated_and_clamped_to_bounds() {
    let mut task = RenderTask::new(TimeRange::new(0.0, 10.0).unwrap());
    task.set_time_range(2.0, 5.0).unwrap();
    assert_eq!(task.time_range(), TimeRange { start: 2.0, end: 5.0 });

    assert!(task.set_time_range(6.0, 3.0).is_err());
    assert_eq!(task.time_range(), TimeRange { start: 2.0, end: 5.0 });

    task.set_time_range(-3.0, 42.0).unwrap();
    assert_eq!(task.time_range(), TimeRange { start: 0.0, end: 10.0 });
    assert!(task.set_fps(0.0).is_err());
}

/// Frame source that panics on its first decode.
struct PanickingSource;

impl FrameSource for PanickingSource {
    fn fps(&self) -> f64 {
        4.0
    }
    fn frame_count(&self) -> u64 {
        8
    }
    fn dimensions(&self, _size: FrameSize) -> (u32, u32) {
        (16, 8)
    }
    fn frame(&self, _index: u64, _size: FrameSize) -> SlowmoResult<FrameRGBA> {
        panic!("decoder exploded");
    }
    fn describe(&self) -> String {
        "panicking".to_string()
    }
}

#[test]
fn worker_panic_aborts_and_keeps_the_task_usable() {
    let (mut task, target, events) = task_with_target();
    task.start(RenderInputs {
        nodes: nodes(),
        frames: Arc::new(PanickingSource),
        flow: None,
    })
    .unwrap();
    assert_eq!(task.wait(), RunState::Aborted);
    assert!(!task.is_running());

    let recorded = events.lock().unwrap().clone();
    let (total, terminal) = assert_event_protocol(&recorded);
    assert_eq!(total, 8);
    assert_eq!(terminal.kind, TerminalKind::Aborted);
    assert!(terminal.reason.contains("panicked"), "{}", terminal.reason);
    assert!(terminal.reason.contains("decoder exploded"));
    let terminals = recorded
        .iter()
        .filter(|e| matches!(e, TaskEvent::Terminal(_)))
        .count();
    assert_eq!(terminals, 1);

    assert!(task.has_target(), "target survives the panic");
    assert!(target.is_ended());
    task.set_fps(3.0).unwrap();
    task.start(inputs(None)).unwrap();
    assert_eq!(task.wait(), RunState::Finished);
    assert!(target.frame_count() > 0);
}
