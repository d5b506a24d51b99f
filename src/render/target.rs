use std::sync::{Arc, Mutex, PoisonError};

use crate::foundation::core::Fps;
use crate::foundation::error::SlowmoResult;
use crate::render::frame::FrameRGBA;

/// Configuration provided to a [`RenderTarget`] at the start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frames-per-second.
    pub fps: Fps,
}

/// Sink receiving rendered frames.
///
/// Ordering contract: `begin` once, then `write_frame` with strictly increasing indices starting
/// at 0, then `end` once, whether the run finished or was stopped early.
pub trait RenderTarget: Send {
    /// Human-readable destination for logs and terminal messages.
    fn describe(&self) -> String;
    /// Called once before any frame is written.
    fn begin(&mut self, cfg: TargetConfig) -> SlowmoResult<()>;
    /// Write output frame `index`.
    fn write_frame(&mut self, index: u64, frame: &FrameRGBA) -> SlowmoResult<()>;
    /// Called once after the last frame.
    fn end(&mut self) -> SlowmoResult<()>;
}

#[derive(Debug, Default)]
struct Captured {
    cfg: Option<TargetConfig>,
    frames: Vec<(u64, FrameRGBA)>,
    ended: bool,
}

/// In-memory target for tests and embedding.
///
/// Clones share the captured frames, so a handle kept by the caller observes what the render
/// task wrote after the target itself was moved into the task.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTarget {
    inner: Arc<Mutex<Captured>>,
}

impl InMemoryTarget {
    /// Create an empty in-memory target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in the last `begin`, if any.
    pub fn config(&self) -> Option<TargetConfig> {
        self.lock().cfg.clone()
    }

    /// Copy of the frames written during the last run.
    pub fn frames(&self) -> Vec<(u64, FrameRGBA)> {
        self.lock().frames.clone()
    }

    /// Number of frames written during the last run.
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// `true` once `end` was called for the last run.
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderTarget for InMemoryTarget {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn begin(&mut self, cfg: TargetConfig) -> SlowmoResult<()> {
        let mut c = self.lock();
        c.cfg = Some(cfg);
        c.frames.clear();
        c.ended = false;
        Ok(())
    }

    fn write_frame(&mut self, index: u64, frame: &FrameRGBA) -> SlowmoResult<()> {
        self.lock().frames.push((index, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> SlowmoResult<()> {
        self.lock().ended = true;
        Ok(())
    }
}
