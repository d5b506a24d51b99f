//! The renderer controller: one loaded project, one render task, polled progress.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::foundation::core::{FrameSize, InterpolationMode, TimeRange};
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::project::loader::load_project;
use crate::project::model::Project;
use crate::render::events::{TaskEvent, TaskObserver, TerminalEvent};
use crate::render::images::ImagesRenderTarget;
use crate::render::target::RenderTarget;
use crate::render::task::{RenderTask, RunState};
use crate::render::video::VideoRenderTarget;

/// Last recorded progress of the render task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Output frames written so far.
    pub done: u64,
    /// Output frames in the run.
    pub total: u64,
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

#[derive(Debug, Default)]
struct Tracked {
    progress: ProgressSnapshot,
    last_terminal: Option<TerminalEvent>,
}

/// Records task events for polling; one lock guards the whole snapshot.
#[derive(Debug, Default)]
struct ProgressTracker {
    inner: Mutex<Tracked>,
}

impl ProgressTracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self) {
        *self.lock() = Tracked::default();
    }

    fn progress(&self) -> ProgressSnapshot {
        self.lock().progress
    }

    fn last_terminal(&self) -> Option<TerminalEvent> {
        self.lock().last_terminal.clone()
    }
}

impl TaskObserver for ProgressTracker {
    fn on_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Sized { description, total } => {
                tracing::info!("{description}");
                let mut t = self.lock();
                t.progress = ProgressSnapshot {
                    done: 0,
                    total: *total,
                };
                t.last_terminal = None;
            }
            TaskEvent::Progress(done) => {
                self.lock().progress.done = *done;
            }
            TaskEvent::Terminal(terminal) => {
                tracing::info!(kind = ?terminal.kind, reason = %terminal.reason, "Rendering finished.");
                self.lock().last_terminal = Some(terminal.clone());
            }
        }
    }
}

/// Entry point for loading a project, configuring its render task and driving a render.
///
/// Configuration calls fail with [`SlowmoError::NoProject`] before a project is loaded and with
/// [`SlowmoError::Busy`] while rendering. `start` and `abort` never block; progress is polled
/// with [`SlowmoRenderer::progress`].
#[derive(Debug, Default)]
pub struct SlowmoRenderer {
    project: Option<Project>,
    tracker: Arc<ProgressTracker>,
}

impl SlowmoRenderer {
    /// Create a renderer with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a project file, replacing the current project.
    ///
    /// The previous project is torn down first, even if loading fails. Loader warnings are
    /// logged.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(&mut self, path: impl AsRef<Path>) -> SlowmoResult<()> {
        self.unload();
        let (project, warnings) = load_project(path.as_ref())?;
        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        self.install(project);
        Ok(())
    }

    /// Install an already built project and create its render task.
    ///
    /// The task range covers the node graph and the project's render settings apply.
    pub fn install(&mut self, mut project: Project) {
        self.unload();
        let mut task = RenderTask::new(project.nodes().bounds())
            .with_settings(project.render_settings().clone());
        task.subscribe(Arc::clone(&self.tracker) as Arc<dyn TaskObserver>);
        project.replace_render_task(task);
        tracing::info!(
            start = project.nodes().start_time(),
            end = project.nodes().end_time(),
            frames = %project.frames().describe(),
            "project loaded"
        );
        self.project = Some(project);
    }

    /// Register an extra observer on the current render task.
    ///
    /// Observers belong to the task and are discarded with it on the next load.
    pub fn subscribe(&mut self, observer: Arc<dyn TaskObserver>) -> SlowmoResult<()> {
        self.task_mut()?.subscribe(observer);
        Ok(())
    }

    /// Drop the current project, stopping any run in progress.
    pub fn unload(&mut self) {
        if let Some(project) = self.project.take() {
            tracing::debug!(nodes = project.nodes().len(), "unloading project");
        }
        self.tracker.reset();
    }

    /// The loaded project.
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Current render range.
    pub fn time_range(&self) -> Option<TimeRange> {
        self.project
            .as_ref()
            .and_then(Project::render_task)
            .map(RenderTask::time_range)
    }

    /// Set the render range; it is clamped into the node-graph bounds.
    pub fn set_time_range(&mut self, start: f64, end: f64) -> SlowmoResult<()> {
        self.task_mut()?.set_time_range(start, end)
    }

    /// Move the range start. The end is raised to `start` when it would fall behind it.
    pub fn set_start(&mut self, start: f64) -> SlowmoResult<()> {
        let task = self.task_mut()?;
        let end = task.time_range().end.max(start);
        task.set_time_range(start, end)
    }

    /// Move the range end; the start is left as is.
    pub fn set_end(&mut self, end: f64) -> SlowmoResult<()> {
        let task = self.task_mut()?;
        let start = task.time_range().start;
        task.set_time_range(start, end)
    }

    /// Set the output frame rate.
    pub fn set_fps(&mut self, fps: f64) -> SlowmoResult<()> {
        self.task_mut()?.set_fps(fps)
    }

    /// Render into a video file encoded with `codec`.
    pub fn set_video_render_target(
        &mut self,
        path: impl Into<PathBuf>,
        codec: impl Into<String>,
    ) -> SlowmoResult<()> {
        let target = VideoRenderTarget::new(path, codec)?;
        self.set_render_target(Box::new(target))
    }

    /// Render into numbered image files; `pattern` must contain `%1`.
    pub fn set_images_render_target(
        &mut self,
        pattern: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> SlowmoResult<()> {
        let target = ImagesRenderTarget::new(pattern, dir)?;
        self.set_render_target(Box::new(target))
    }

    /// Attach any render target, replacing the previous one.
    pub fn set_render_target(&mut self, target: Box<dyn RenderTarget>) -> SlowmoResult<()> {
        self.task_mut()?.set_render_target(target)
    }

    /// Set how frames between source frames are produced.
    pub fn set_interpolation(&mut self, mode: InterpolationMode) -> SlowmoResult<()> {
        self.task_mut()?.set_interpolation(mode)
    }

    /// Render at original size (`true`) or reduced size (`false`).
    pub fn set_size(&mut self, use_original: bool) -> SlowmoResult<()> {
        let size = if use_original {
            FrameSize::Original
        } else {
            FrameSize::Small
        };
        self.task_mut()?.set_size(size)
    }

    /// Tune the smoothness of the project's flow source.
    ///
    /// Returns `false` and logs a warning when there is no tunable flow source or the value is
    /// rejected; nothing is changed then.
    pub fn set_flow_lambda(&mut self, lambda: f32) -> bool {
        let Some(project) = self.project.as_mut() else {
            tracing::warn!(lambda, "cannot set flow lambda: no project loaded");
            return false;
        };
        let Some(flow) = project.flow_source_mut() else {
            tracing::warn!(lambda, "cannot set flow lambda: project has no flow source");
            return false;
        };
        let name = flow.name();
        match flow.tunable_lambda() {
            Some(tunable) => match tunable.set_lambda(lambda) {
                Ok(()) => {
                    tracing::debug!(lambda, source = name, "flow lambda set");
                    true
                }
                Err(e) => {
                    tracing::warn!(lambda, source = name, "flow lambda rejected: {e}");
                    false
                }
            },
            None => {
                tracing::warn!(
                    lambda,
                    source = name,
                    "flow source has no lambda parameter; not applicable"
                );
                false
            }
        }
    }

    /// Start rendering. A no-op while already running.
    pub fn start(&mut self) -> SlowmoResult<()> {
        self.project
            .as_mut()
            .ok_or(SlowmoError::NoProject)?
            .start_rendering()
    }

    /// Ask a running render to stop. Safe to call at any time.
    pub fn abort(&self) {
        if let Some(task) = self.project.as_ref().and_then(Project::render_task) {
            task.abort();
        }
    }

    /// Last recorded `(done, total)`.
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.progress()
    }

    /// `true` while a run is in progress.
    pub fn is_rendering(&self) -> bool {
        self.project
            .as_ref()
            .and_then(Project::render_task)
            .is_some_and(RenderTask::is_running)
    }

    /// State of the render task, if a project is loaded.
    pub fn state(&self) -> Option<RunState> {
        self.project
            .as_ref()
            .and_then(Project::render_task)
            .map(RenderTask::state)
    }

    /// Block until the current run ends and return its terminal event.
    pub fn wait(&mut self) -> Option<TerminalEvent> {
        if let Some(task) = self.project.as_mut().and_then(Project::render_task_mut) {
            task.wait();
        }
        self.tracker.last_terminal()
    }

    /// Terminal event of the most recent run.
    pub fn last_terminal(&self) -> Option<TerminalEvent> {
        self.tracker.last_terminal()
    }

    /// Whether the renderer is ready to start. Reasons it is not are appended to `message`,
    /// one per line.
    pub fn is_complete(&self, message: &mut String) -> bool {
        let missing = self.missing_configuration();
        for reason in &missing {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(reason);
        }
        missing.is_empty()
    }

    /// Reasons the renderer is not ready to start; empty when it is.
    pub fn missing_configuration(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.project.is_none() {
            missing.push("No project loaded.".to_string());
        }
        let has_target = self
            .project
            .as_ref()
            .and_then(Project::render_task)
            .is_some_and(RenderTask::has_target);
        if !has_target {
            missing.push("No render target set.".to_string());
        }
        missing
    }

    fn task_mut(&mut self) -> SlowmoResult<&mut RenderTask> {
        self.project
            .as_mut()
            .and_then(Project::render_task_mut)
            .ok_or(SlowmoError::NoProject)
    }
}

#[cfg(test)]
#[path = "../tests/unit/renderer.rs"]
mod tests;
