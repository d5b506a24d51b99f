use crate::foundation::error::{SlowmoError, SlowmoResult};

/// Closed time range `[start, end]` in output seconds.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    /// Inclusive range start (seconds).
    pub start: f64,
    /// Inclusive range end (seconds).
    pub end: f64,
}

impl TimeRange {
    /// Create a validated range with finite bounds and `start <= end`.
    pub fn new(start: f64, end: f64) -> SlowmoResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(SlowmoError::validation("time range bounds must be finite"));
        }
        if start > end {
            return Err(SlowmoError::validation(format!(
                "time range start {start} must be <= end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the range in seconds.
    pub fn duration(self) -> f64 {
        self.end - self.start
    }

    /// Clamp both bounds into `bounds`.
    pub fn clamp_to(self, bounds: TimeRange) -> Self {
        Self {
            start: self.start.clamp(bounds.start, bounds.end),
            end: self.end.clamp(bounds.start, bounds.end),
        }
    }

    /// Number of output frames rendered for this range at `fps`.
    ///
    /// Frames sit at `start + i / fps`; a zero-length range still renders one frame.
    pub fn frame_count(self, fps: Fps) -> u64 {
        ((self.duration() * fps.get()).floor() as u64).max(1)
    }

    /// Output time of frame `i` at `fps`.
    pub fn frame_time(self, fps: Fps, i: u64) -> f64 {
        self.start + (i as f64) / fps.get()
    }
}

/// Output frame rate in frames per second (finite, > 0).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Fps(f64);

impl Fps {
    /// Create a validated frame rate.
    pub fn new(fps: f64) -> SlowmoResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SlowmoError::validation(format!(
                "fps must be finite and > 0 (got {fps})"
            )));
        }
        Ok(Self(fps))
    }

    /// Frames per second as `f64`.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self(24.0)
    }
}

impl TryFrom<f64> for Fps {
    type Error = SlowmoError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fps> for f64 {
    fn from(value: Fps) -> Self {
        value.0
    }
}

/// Resolution at which frames are read and rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSize {
    /// Source resolution.
    #[default]
    Original,
    /// Half resolution in each dimension.
    Small,
}

impl FrameSize {
    /// Scale source dimensions to this frame size (never below 1x1).
    pub fn scale(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            FrameSize::Original => (width, height),
            FrameSize::Small => ((width / 2).max(1), (height / 2).max(1)),
        }
    }

    /// Short label used in cache file names.
    pub fn label(self) -> &'static str {
        match self {
            FrameSize::Original => "orig",
            FrameSize::Small => "small",
        }
    }
}

/// How an output frame is produced between two source frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMode {
    /// Take the closest source frame.
    Nearest,
    /// Cross-fade the two neighbouring source frames.
    #[default]
    Linear,
    /// Warp along the forward optical flow, then blend.
    Flow,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
