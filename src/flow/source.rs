use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::flow::field::FlowField;
use crate::foundation::core::FrameSize;
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::render::frame::FrameRGBA;

/// Default name of the external program that computes v3d flow fields.
pub const DEFAULT_FLOW_BUILDER: &str = "slowmoFlowBuilder";

/// Two neighbouring source frames whose forward flow is requested.
#[derive(Clone, Copy, Debug)]
pub struct FramePair<'a> {
    /// Index of the left (earlier) source frame.
    pub left_index: u64,
    /// Index of the right (later) source frame.
    pub right_index: u64,
    /// Left frame pixels.
    pub left: &'a FrameRGBA,
    /// Right frame pixels.
    pub right: &'a FrameRGBA,
    /// Size the frames were decoded at.
    pub size: FrameSize,
}

/// Optional capability: a flow source with a smoothness (regularization) parameter.
pub trait TunableLambda {
    /// Current lambda.
    fn lambda(&self) -> f32;
    /// Set lambda; must be finite and non-negative.
    fn set_lambda(&mut self, lambda: f32) -> SlowmoResult<()>;
}

/// Provider of optical flow between source frames, attached at project level.
pub trait FlowSource: Send {
    /// Short variant name for logs.
    fn name(&self) -> &'static str;

    /// Forward flow from `pair.left` to `pair.right`.
    fn forward_flow(&mut self, pair: FramePair<'_>) -> SlowmoResult<FlowField>;

    /// Independent copy handed to a render run.
    fn boxed_clone(&self) -> Box<dyn FlowSource>;

    /// The lambda capability, for variants that have one.
    fn tunable_lambda(&mut self) -> Option<&mut dyn TunableLambda> {
        None
    }
}

/// Variational flow computed by an external builder program, tunable through lambda.
#[derive(Clone, Debug, PartialEq)]
pub struct V3dFlowSource {
    lambda: f32,
    builder: PathBuf,
    cache_dir: PathBuf,
}

impl V3dFlowSource {
    /// Create a source caching its flow fields under `cache_dir`.
    pub fn new(lambda: f32, cache_dir: impl Into<PathBuf>) -> SlowmoResult<Self> {
        validate_lambda(lambda)?;
        Ok(Self {
            lambda,
            builder: PathBuf::from(DEFAULT_FLOW_BUILDER),
            cache_dir: cache_dir.into(),
        })
    }

    /// Use a specific builder executable instead of the one on `PATH`.
    pub fn with_builder(mut self, builder: impl Into<PathBuf>) -> Self {
        self.builder = builder.into();
        self
    }

    /// Builder executable.
    pub fn builder(&self) -> &std::path::Path {
        &self.builder
    }

    /// Cache directory.
    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Cache file for a pair; the lambda is keyed by its exact shortest representation.
    fn flow_path(&self, pair: &FramePair<'_>) -> PathBuf {
        self.cache_dir.join(format!(
            "forward-{:05}-{:05}-{}-l{}.sVflow",
            pair.left_index,
            pair.right_index,
            pair.size.label(),
            self.lambda
        ))
    }

    fn frame_path(&self, index: u64, size: FrameSize) -> PathBuf {
        self.cache_dir
            .join(format!("frame-{index:05}-{}.png", size.label()))
    }

    fn write_frame(&self, index: u64, size: FrameSize, frame: &FrameRGBA) -> SlowmoResult<PathBuf> {
        let path = self.frame_path(index, size);
        if !path.exists() {
            image::save_buffer_with_format(
                &path,
                &frame.data,
                frame.width,
                frame.height,
                image::ColorType::Rgba8,
                image::ImageFormat::Png,
            )
            .with_context(|| format!("write flow input '{}'", path.display()))?;
        }
        Ok(path)
    }
}

impl FlowSource for V3dFlowSource {
    fn name(&self) -> &'static str {
        "v3d"
    }

    #[tracing::instrument(skip(self, pair), fields(left = pair.left_index, right = pair.right_index))]
    fn forward_flow(&mut self, pair: FramePair<'_>) -> SlowmoResult<FlowField> {
        let out = self.flow_path(&pair);
        if out.exists() {
            tracing::trace!(out = %out.display(), "flow cache hit");
            return check_size(FlowField::load(&out)?, &pair);
        }

        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("create flow cache dir '{}'", self.cache_dir.display())
        })?;
        let left = self.write_frame(pair.left_index, pair.size, pair.left)?;
        let right = self.write_frame(pair.right_index, pair.size, pair.right)?;

        tracing::debug!(builder = %self.builder.display(), out = %out.display(), "building flow");
        let output = Command::new(&self.builder)
            .arg(&left)
            .arg(&right)
            .arg(&out)
            .arg(format!("{}", self.lambda))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                SlowmoError::flow(format!(
                    "failed to run flow builder '{}' (is it installed and on PATH?): {e}",
                    self.builder.display()
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SlowmoError::flow(format!(
                "flow builder exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        check_size(FlowField::load(&out)?, &pair)
    }

    fn boxed_clone(&self) -> Box<dyn FlowSource> {
        Box::new(self.clone())
    }

    fn tunable_lambda(&mut self) -> Option<&mut dyn TunableLambda> {
        Some(self)
    }
}

impl TunableLambda for V3dFlowSource {
    fn lambda(&self) -> f32 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f32) -> SlowmoResult<()> {
        validate_lambda(lambda)?;
        self.lambda = lambda;
        Ok(())
    }
}

fn check_size(field: FlowField, pair: &FramePair<'_>) -> SlowmoResult<FlowField> {
    if field.width != pair.left.width || field.height != pair.left.height {
        return Err(SlowmoError::flow(format!(
            "flow field for frames {}-{} is {}x{}, frames are {}x{}",
            pair.left_index,
            pair.right_index,
            field.width,
            field.height,
            pair.left.width,
            pair.left.height
        )));
    }
    Ok(field)
}

fn validate_lambda(lambda: f32) -> SlowmoResult<()> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(SlowmoError::validation(format!(
            "flow lambda must be finite and >= 0 (got {lambda})"
        )));
    }
    Ok(())
}

/// Flow fields computed ahead of time and stored as `sVflow` files.
///
/// Files are named `forward-<left>-<right>.sVflow` (5-digit indices), with a `-small` suffix
/// before the extension for half-size fields.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecomputedFlowSource {
    dir: PathBuf,
}

impl PrecomputedFlowSource {
    /// Read flow fields from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the flow files.
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Path of the forward flow file for a frame pair.
    pub fn flow_path(&self, left: u64, right: u64, size: FrameSize) -> PathBuf {
        let suffix = match size {
            FrameSize::Original => "",
            FrameSize::Small => "-small",
        };
        self.dir
            .join(format!("forward-{left:05}-{right:05}{suffix}.sVflow"))
    }
}

impl FlowSource for PrecomputedFlowSource {
    fn name(&self) -> &'static str {
        "precomputed"
    }

    fn forward_flow(&mut self, pair: FramePair<'_>) -> SlowmoResult<FlowField> {
        let field = FlowField::load(&self.flow_path(pair.left_index, pair.right_index, pair.size))?;
        check_size(field, &pair)
    }

    fn boxed_clone(&self) -> Box<dyn FlowSource> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/flow/source.rs"]
mod tests;
