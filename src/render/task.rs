use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::flow::source::{FlowSource, FramePair};
use crate::foundation::core::{Fps, FrameSize, InterpolationMode, TimeRange};
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::project::nodes::NodeList;
use crate::render::events::{TaskEvent, TaskObserver, TerminalEvent, TerminalKind};
use crate::render::frame::FrameRGBA;
use crate::render::interpolate;
use crate::render::target::{RenderTarget, TargetConfig};
use crate::source::frames::FrameSource;

/// Run state of a [`RenderTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Created or configured, never started.
    Idle,
    /// The worker is producing frames.
    Running,
    /// The last run wrote every frame.
    Finished,
    /// The last run was stopped on request.
    Stopped,
    /// The last run failed.
    Aborted,
}

impl RunState {
    /// `true` for `Finished`, `Stopped` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Finished | RunState::Stopped | RunState::Aborted
        )
    }
}

impl From<TerminalKind> for RunState {
    fn from(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Finished => RunState::Finished,
            TerminalKind::Stopped => RunState::Stopped,
            TerminalKind::Aborted => RunState::Aborted,
        }
    }
}

/// Per-task render preferences; also stored in project files.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Output frame rate.
    pub fps: Fps,
    /// Interpolation between source frames.
    pub interpolation: InterpolationMode,
    /// Render at original or half resolution.
    pub size: FrameSize,
}

/// Project data a run reads from.
///
/// The flow source is an independent copy so retuning the project's source never affects a run
/// in flight.
pub struct RenderInputs {
    /// Time mapping.
    pub nodes: NodeList,
    /// Source footage.
    pub frames: Arc<dyn FrameSource>,
    /// Flow provider for [`InterpolationMode::Flow`].
    pub flow: Option<Box<dyn FlowSource>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<RunState>,
    stop: AtomicBool,
}

impl Shared {
    fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// One configured rendering job over a time range of a project.
///
/// The frame loop runs on a dedicated worker thread; `start` and `abort` only signal it.
/// Configuration is rejected with [`SlowmoError::Busy`] while a run is in progress.
pub struct RenderTask {
    bounds: TimeRange,
    range: TimeRange,
    settings: RenderSettings,
    target: Option<Box<dyn RenderTarget>>,
    observers: Vec<Arc<dyn TaskObserver>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Box<dyn RenderTarget>>>,
}

impl RenderTask {
    /// Create an idle task whose range covers `bounds`.
    pub fn new(bounds: TimeRange) -> Self {
        Self {
            bounds,
            range: bounds,
            settings: RenderSettings::default(),
            target: None,
            observers: Vec::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::Idle),
                stop: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    /// Replace the render preferences in one go.
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register an observer for all future runs.
    pub fn subscribe(&mut self, observer: Arc<dyn TaskObserver>) {
        self.observers.push(observer);
    }

    /// Range the task was created with (node-graph bounds).
    pub fn bounds(&self) -> TimeRange {
        self.bounds
    }

    /// Configured output range.
    pub fn time_range(&self) -> TimeRange {
        self.range
    }

    /// Current render preferences.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// `true` when a target is attached, including one currently lent to a run.
    pub fn has_target(&self) -> bool {
        self.target.is_some() || self.worker.is_some()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    /// `true` while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Set the output range. Bounds are validated (`start <= end`) and then clamped into the
    /// node-graph bounds.
    pub fn set_time_range(&mut self, start: f64, end: f64) -> SlowmoResult<()> {
        self.ensure_idle()?;
        self.range = TimeRange::new(start, end)?.clamp_to(self.bounds);
        Ok(())
    }

    /// Set the output frame rate (must be finite and > 0).
    pub fn set_fps(&mut self, fps: f64) -> SlowmoResult<()> {
        self.ensure_idle()?;
        self.settings.fps = Fps::new(fps)?;
        Ok(())
    }

    /// Set the interpolation mode.
    pub fn set_interpolation(&mut self, mode: InterpolationMode) -> SlowmoResult<()> {
        self.ensure_idle()?;
        self.settings.interpolation = mode;
        Ok(())
    }

    /// Set the output frame size.
    pub fn set_size(&mut self, size: FrameSize) -> SlowmoResult<()> {
        self.ensure_idle()?;
        self.settings.size = size;
        Ok(())
    }

    /// Attach `target`, dropping any previously attached one.
    pub fn set_render_target(&mut self, target: Box<dyn RenderTarget>) -> SlowmoResult<()> {
        self.ensure_idle()?;
        tracing::debug!(target = %target.describe(), "render target attached");
        self.target = Some(target);
        Ok(())
    }

    /// Begin a run on a worker thread.
    ///
    /// A no-op while already running. From a terminal state a fresh run starts at the beginning
    /// of the range. Fails with [`SlowmoError::NoTarget`] when no target is attached.
    pub fn start(&mut self, inputs: RenderInputs) -> SlowmoResult<()> {
        self.reap();
        if self.is_running() {
            tracing::debug!("start ignored: already running");
            return Ok(());
        }
        let target = self.target.take().ok_or(SlowmoError::NoTarget)?;

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.set_state(RunState::Running);
        let job = RenderJob {
            range: self.range,
            settings: self.settings.clone(),
            inputs,
            target,
            observers: self.observers.clone(),
            shared: Arc::clone(&self.shared),
        };
        tracing::info!(
            start = self.range.start,
            end = self.range.end,
            fps = self.settings.fps.get(),
            "render task started"
        );

        let spawned = std::thread::Builder::new()
            .name("slowmo-render".to_string())
            .spawn(move || {
                let mut job = job;
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.run())) {
                    job.abort_after_panic(payload.as_ref());
                }
                job.target
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(RunState::Idle);
                Err(SlowmoError::render(format!(
                    "failed to spawn render worker: {e}"
                )))
            }
        }
    }

    /// Request the running worker to stop after the current frame. No-op when not running.
    pub fn abort(&self) {
        if self.is_running() {
            tracing::info!("render stop requested");
            self.shared.stop.store(true, Ordering::SeqCst);
        } else {
            tracing::debug!(state = ?self.state(), "abort ignored: not running");
        }
    }

    /// Block until the current run (if any) has ended and return the resulting state.
    pub fn wait(&mut self) -> RunState {
        if let Some(handle) = self.worker.take() {
            self.join(handle);
        }
        self.state()
    }

    fn ensure_idle(&mut self) -> SlowmoResult<()> {
        self.reap();
        if self.is_running() {
            return Err(SlowmoError::Busy);
        }
        Ok(())
    }

    /// Join a worker whose thread has exited and take the target back.
    fn reap(&mut self) {
        let ended = !self.is_running()
            || self
                .worker
                .as_ref()
                .is_some_and(|handle| handle.is_finished());
        if !ended {
            return;
        }
        if let Some(handle) = self.worker.take() {
            self.join(handle);
        }
    }

    fn join(&mut self, handle: JoinHandle<Box<dyn RenderTarget>>) {
        match handle.join() {
            Ok(target) => {
                if self.target.is_none() {
                    self.target = Some(target);
                }
            }
            Err(payload) => {
                let reason = format!(
                    "render worker panicked: {}",
                    panic_message(payload.as_ref())
                );
                tracing::error!(%reason, "render target lost");
                if !self.state().is_terminal() {
                    self.shared.set_state(RunState::Aborted);
                    let event = TaskEvent::Terminal(TerminalEvent {
                        kind: TerminalKind::Aborted,
                        reason,
                    });
                    for observer in &self.observers {
                        observer.on_event(&event);
                    }
                }
            }
        }
    }
}

impl Drop for RenderTask {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTask")
            .field("bounds", &self.bounds)
            .field("range", &self.range)
            .field("settings", &self.settings)
            .field("has_target", &self.target.is_some())
            .field("observers", &self.observers.len())
            .field("state", &self.state())
            .finish()
    }
}

enum Outcome {
    Completed,
    Stopped(u64),
}

/// Two most recently decoded source frames.
#[derive(Default)]
struct FrameCache {
    slots: Vec<(u64, Arc<FrameRGBA>)>,
}

impl FrameCache {
    fn fetch(
        &mut self,
        source: &dyn FrameSource,
        index: u64,
        size: FrameSize,
    ) -> SlowmoResult<Arc<FrameRGBA>> {
        if let Some((_, frame)) = self.slots.iter().find(|(i, _)| *i == index) {
            return Ok(Arc::clone(frame));
        }
        let frame = Arc::new(source.frame(index, size)?);
        if self.slots.len() == 2 {
            self.slots.remove(0);
        }
        self.slots.push((index, Arc::clone(&frame)));
        Ok(frame)
    }
}

struct RenderJob {
    range: TimeRange,
    settings: RenderSettings,
    inputs: RenderInputs,
    target: Box<dyn RenderTarget>,
    observers: Vec<Arc<dyn TaskObserver>>,
    shared: Arc<Shared>,
}

impl RenderJob {
    fn run(&mut self) {
        let total = self.range.frame_count(self.settings.fps);
        let destination = self.target.describe();
        self.emit(&TaskEvent::Sized {
            description: format!(
                "Rendering {total} frames ({:.2} s to {:.2} s at {} fps) to {destination}",
                self.range.start,
                self.range.end,
                self.settings.fps.get()
            ),
            total,
        });

        let outcome = self.render_frames(total);
        let closed = self.target.end();
        let (kind, reason) = match (outcome, closed) {
            (Ok(Outcome::Completed), Ok(())) => (
                TerminalKind::Finished,
                format!("Rendered {total} frames to {destination}"),
            ),
            (Ok(Outcome::Stopped(done)), Ok(())) => (
                TerminalKind::Stopped,
                format!("Rendering stopped after {done} of {total} frames"),
            ),
            (Err(e), _) | (Ok(_), Err(e)) => (TerminalKind::Aborted, e.to_string()),
        };

        match kind {
            TerminalKind::Aborted => tracing::error!(%reason, "render task aborted"),
            _ => tracing::info!(?kind, %reason, "render task ended"),
        }
        self.shared.set_state(kind.into());
        self.emit(&TaskEvent::Terminal(TerminalEvent { kind, reason }));
    }

    /// Close the target and report the run as aborted unless a terminal event already went out.
    fn abort_after_panic(&mut self, payload: &(dyn Any + Send)) {
        let reason = format!("render worker panicked: {}", panic_message(payload));
        tracing::error!(%reason, "render task aborted");
        if catch_unwind(AssertUnwindSafe(|| self.target.end())).is_err() {
            tracing::error!("render target panicked while closing");
        }
        if self.shared.state().is_terminal() {
            return;
        }
        self.shared.set_state(RunState::Aborted);
        self.emit(&TaskEvent::Terminal(TerminalEvent {
            kind: TerminalKind::Aborted,
            reason,
        }));
    }

    fn render_frames(&mut self, total: u64) -> SlowmoResult<Outcome> {
        if self.inputs.frames.frame_count() == 0 {
            return Err(SlowmoError::render("frame source has no frames"));
        }
        let (width, height) = self.inputs.frames.dimensions(self.settings.size);
        self.target.begin(TargetConfig {
            width,
            height,
            fps: self.settings.fps,
        })?;

        let mut cache = FrameCache::default();
        for i in 0..total {
            if self.shared.stop.load(Ordering::SeqCst) {
                return Ok(Outcome::Stopped(i));
            }
            let t = self.range.frame_time(self.settings.fps, i);
            let frame = self.render_frame_at(t, &mut cache)?;
            self.target.write_frame(i, &frame)?;
            self.emit(&TaskEvent::Progress(i + 1));
        }
        Ok(Outcome::Completed)
    }

    fn render_frame_at(&mut self, t: f64, cache: &mut FrameCache) -> SlowmoResult<Arc<FrameRGBA>> {
        let frames = Arc::clone(&self.inputs.frames);
        let size = self.settings.size;
        let last = frames.frame_count().saturating_sub(1);
        let pos = (self.inputs.nodes.source_time(t) * frames.fps()).clamp(0.0, last as f64);
        let left = pos.floor() as u64;
        let frac = pos - left as f64;
        if left >= last || frac <= f64::EPSILON {
            return cache.fetch(frames.as_ref(), left.min(last), size);
        }
        let right = left + 1;

        match self.settings.interpolation {
            InterpolationMode::Nearest => {
                let idx = if frac < 0.5 { left } else { right };
                cache.fetch(frames.as_ref(), idx, size)
            }
            InterpolationMode::Linear => {
                let l = cache.fetch(frames.as_ref(), left, size)?;
                let r = cache.fetch(frames.as_ref(), right, size)?;
                Ok(Arc::new(interpolate::blend(&l, &r, frac)?))
            }
            InterpolationMode::Flow => {
                let l = cache.fetch(frames.as_ref(), left, size)?;
                let r = cache.fetch(frames.as_ref(), right, size)?;
                let flow_source = self.inputs.flow.as_mut().ok_or_else(|| {
                    SlowmoError::render("flow interpolation requires a flow source")
                })?;
                let field = flow_source.forward_flow(FramePair {
                    left_index: left,
                    right_index: right,
                    left: &l,
                    right: &r,
                    size,
                })?;
                Ok(Arc::new(interpolate::flow_blend(&l, &r, &field, frac)?))
            }
        }
    }

    fn emit(&self, event: &TaskEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/task.rs"]
mod tests;
