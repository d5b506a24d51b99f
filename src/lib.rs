//! Slow-motion rendering driven by a time-mapping node graph.
//!
//! A project maps output time to source time through a node graph. The public API is
//! controller-oriented:
//!
//! - Load a project with [`SlowmoRenderer::load`] (or build one and [`SlowmoRenderer::install`] it)
//! - Configure the render task: range, frame rate, interpolation, size, target, flow lambda
//! - [`SlowmoRenderer::start`] the run and poll [`SlowmoRenderer::progress`]
//!
//! Runs execute on a worker thread and report through [`TaskEvent`]s.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod flow;
pub(crate) mod project;
pub(crate) mod render;
pub mod renderer;
pub(crate) mod source;

pub use crate::foundation::core::{Fps, FrameSize, InterpolationMode, TimeRange};
pub use crate::foundation::error::{SlowmoError, SlowmoResult};

pub use crate::flow::field::FlowField;
pub use crate::flow::source::{
    DEFAULT_FLOW_BUILDER, FlowSource, FramePair, PrecomputedFlowSource, TunableLambda,
    V3dFlowSource,
};
pub use crate::project::loader::{
    FlowSourceDef, FrameSourceDef, PROJECT_VERSION, ProjectFile, load_project,
};
pub use crate::project::model::Project;
pub use crate::project::nodes::{Node, NodeList};
pub use crate::render::events::{TaskEvent, TaskObserver, TerminalEvent, TerminalKind};
pub use crate::render::frame::FrameRGBA;
pub use crate::render::images::{FRAME_NUMBER_PLACEHOLDER, ImagesRenderTarget};
pub use crate::render::interpolate;
pub use crate::render::target::{InMemoryTarget, RenderTarget, TargetConfig};
pub use crate::render::task::{RenderInputs, RenderSettings, RenderTask, RunState};
pub use crate::render::video::{VideoRenderTarget, is_ffmpeg_on_path};
pub use crate::renderer::{ProgressSnapshot, SlowmoRenderer};
pub use crate::source::frames::{FrameSource, ImagesFrameSource, SyntheticFrameSource};
