use std::sync::Arc;

use crate::flow::source::FlowSource;
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::project::nodes::NodeList;
use crate::render::task::{RenderInputs, RenderSettings, RenderTask};
use crate::source::frames::FrameSource;

/// A slow-motion project: source footage, the time mapping and at most one render task.
pub struct Project {
    nodes: NodeList,
    frames: Arc<dyn FrameSource>,
    flow_source: Option<Box<dyn FlowSource>>,
    render_settings: RenderSettings,
    render_task: Option<RenderTask>,
}

impl Project {
    /// Create a project without flow source or render task.
    pub fn new(nodes: NodeList, frames: Arc<dyn FrameSource>) -> Self {
        Self {
            nodes,
            frames,
            flow_source: None,
            render_settings: RenderSettings::default(),
            render_task: None,
        }
    }

    /// Attach a flow source.
    pub fn with_flow_source(mut self, flow_source: Box<dyn FlowSource>) -> Self {
        self.flow_source = Some(flow_source);
        self
    }

    /// Set the render preferences new tasks start from.
    pub fn with_render_settings(mut self, settings: RenderSettings) -> Self {
        self.render_settings = settings;
        self
    }

    /// The node graph.
    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    /// Source footage.
    pub fn frames(&self) -> &Arc<dyn FrameSource> {
        &self.frames
    }

    /// Active flow source, if any.
    pub fn flow_source(&self) -> Option<&dyn FlowSource> {
        self.flow_source.as_deref()
    }

    /// Mutable access to the active flow source.
    pub fn flow_source_mut(&mut self) -> Option<&mut (dyn FlowSource + 'static)> {
        self.flow_source.as_deref_mut()
    }

    /// Stored render preferences.
    pub fn render_settings(&self) -> &RenderSettings {
        &self.render_settings
    }

    /// The live render task, if one was installed.
    pub fn render_task(&self) -> Option<&RenderTask> {
        self.render_task.as_ref()
    }

    /// Mutable access to the live render task.
    pub fn render_task_mut(&mut self) -> Option<&mut RenderTask> {
        self.render_task.as_mut()
    }

    /// Install `task`, dropping (and thereby stopping) the previous one.
    pub fn replace_render_task(&mut self, task: RenderTask) {
        if self.render_task.is_some() {
            tracing::debug!("replacing render task");
        }
        self.render_task = Some(task);
    }

    /// Start the render task with this project's footage, node graph and a snapshot of its
    /// flow source.
    pub fn start_rendering(&mut self) -> SlowmoResult<()> {
        let task = self
            .render_task
            .as_mut()
            .ok_or_else(|| SlowmoError::render("project has no render task"))?;
        task.start(RenderInputs {
            nodes: self.nodes.clone(),
            frames: Arc::clone(&self.frames),
            flow: self.flow_source.as_ref().map(|f| f.boxed_clone()),
        })
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("nodes", &self.nodes)
            .field("frames", &self.frames.describe())
            .field("flow_source", &self.flow_source.as_ref().map(|s| s.name()))
            .field("render_settings", &self.render_settings)
            .field("render_task", &self.render_task)
            .finish()
    }
}
