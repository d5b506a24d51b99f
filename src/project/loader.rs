//! JSON project files.
//!
//! ```json
//! {
//!   "version": 2,
//!   "frames": { "kind": "images", "dir": "frames", "fps": 24.0 },
//!   "nodes": [ { "x": 0.0, "y": 0.0 }, { "x": 10.0, "y": 2.5 } ],
//!   "flow_source": { "kind": "v3d", "lambda": 10.0 },
//!   "render": { "fps": 25.0, "interpolation": "flow", "size": "small" }
//! }
//! ```
//!
//! Relative paths are resolved against the directory containing the project file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::flow::source::{FlowSource, PrecomputedFlowSource, V3dFlowSource};
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::project::model::Project;
use crate::project::nodes::{Node, NodeList};
use crate::render::task::RenderSettings;
use crate::source::frames::{FrameSource, ImagesFrameSource, SyntheticFrameSource};

/// Project file format version written by this crate.
pub const PROJECT_VERSION: u32 = 2;

fn current_version() -> u32 {
    PROJECT_VERSION
}

/// Serialized project description.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectFile {
    /// File format version.
    #[serde(default = "current_version")]
    pub version: u32,
    /// Source footage.
    pub frames: FrameSourceDef,
    /// Time mapping nodes (any order).
    pub nodes: Vec<Node>,
    /// Optional optical flow provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_source: Option<FlowSourceDef>,
    /// Render preferences applied to new render tasks.
    #[serde(default)]
    pub render: RenderSettings,
}

/// Serialized frame source.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSourceDef {
    /// Image files in a directory.
    Images {
        /// Directory holding the frames.
        dir: PathBuf,
        /// Source frame rate.
        fps: f64,
    },
    /// Generated test footage.
    Synthetic {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
        /// Number of frames.
        frames: u64,
        /// Source frame rate.
        fps: f64,
    },
}

/// Serialized flow source.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSourceDef {
    /// Flow computed by the external v3d builder.
    V3d {
        /// Smoothness parameter.
        lambda: f32,
        /// Builder executable; defaults to the one on `PATH`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        builder: Option<PathBuf>,
        /// Flow cache directory; defaults to `cache/v3d` next to the project.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_dir: Option<PathBuf>,
    },
    /// Flow fields stored on disk.
    Precomputed {
        /// Directory holding `forward-*.sVflow` files.
        dir: PathBuf,
    },
}

impl ProjectFile {
    /// Parse a project file.
    pub fn from_path(path: impl AsRef<Path>) -> SlowmoResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            SlowmoError::load(format!("open project '{}': {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            SlowmoError::load(format!("parse project '{}': {e}", path.display()))
        })
    }

    /// Write this project file as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> SlowmoResult<()> {
        let path = path.as_ref();
        let f = File::create(path)
            .with_context(|| format!("create project file '{}'", path.display()))?;
        serde_json::to_writer_pretty(f, self)
            .map_err(|e| SlowmoError::serde(format!("write project '{}': {e}", path.display())))
    }

    /// Build the runtime project, resolving relative paths against `base_dir`.
    ///
    /// Returns the project and any non-fatal warnings.
    pub fn into_project(self, base_dir: &Path) -> SlowmoResult<(Project, Vec<String>)> {
        let mut warnings = Vec::new();
        if self.version > PROJECT_VERSION {
            return Err(SlowmoError::load(format!(
                "project file version {} is newer than supported version {PROJECT_VERSION}",
                self.version
            )));
        }
        if self.version < PROJECT_VERSION {
            warnings.push(format!(
                "project file version {} is older than {PROJECT_VERSION}; missing settings use defaults",
                self.version
            ));
        }

        if self.nodes.windows(2).any(|w| w[0].x > w[1].x) {
            warnings.push("nodes were not ordered by output time and have been sorted".to_string());
        }
        let nodes = NodeList::new(self.nodes).map_err(|e| SlowmoError::load(e.to_string()))?;
        if nodes.len() < 2 {
            warnings.push(format!(
                "node graph has {} node(s); the render range is empty",
                nodes.len()
            ));
        }

        let frames: Arc<dyn FrameSource> = match self.frames {
            FrameSourceDef::Images { dir, fps } => {
                Arc::new(ImagesFrameSource::open(resolve(base_dir, dir), fps).map_err(as_load)?)
            }
            FrameSourceDef::Synthetic {
                width,
                height,
                frames,
                fps,
            } => Arc::new(SyntheticFrameSource::new(width, height, frames, fps).map_err(as_load)?),
        };
        if nodes.max_source_time() > frames.duration_secs() {
            warnings.push(format!(
                "node graph reaches source time {:.3} s but the source is only {:.3} s long; \
                 the last frame will be repeated",
                nodes.max_source_time(),
                frames.duration_secs()
            ));
        }

        let flow_source: Option<Box<dyn FlowSource>> = match self.flow_source {
            None => None,
            Some(FlowSourceDef::V3d {
                lambda,
                builder,
                cache_dir,
            }) => {
                let cache_dir = cache_dir
                    .map(|d| resolve(base_dir, d))
                    .unwrap_or_else(|| base_dir.join("cache").join("v3d"));
                let mut src = V3dFlowSource::new(lambda, cache_dir).map_err(as_load)?;
                if let Some(builder) = builder {
                    src = src.with_builder(builder);
                }
                Some(Box::new(src))
            }
            Some(FlowSourceDef::Precomputed { dir }) => {
                Some(Box::new(PrecomputedFlowSource::new(resolve(base_dir, dir))))
            }
        };

        let mut project = Project::new(nodes, frames).with_render_settings(self.render);
        if let Some(flow_source) = flow_source {
            project = project.with_flow_source(flow_source);
        }
        Ok((project, warnings))
    }
}

/// Read a project file and build the project.
///
/// Every failure is reported as [`SlowmoError::Load`]; warnings are returned alongside a
/// successfully loaded project.
#[tracing::instrument]
pub fn load_project(path: &Path) -> SlowmoResult<(Project, Vec<String>)> {
    let file = ProjectFile::from_path(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    file.into_project(base_dir)
}

fn resolve(base_dir: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() { p } else { base_dir.join(p) }
}

fn as_load(e: SlowmoError) -> SlowmoError {
    match e {
        SlowmoError::Load { .. } => e,
        other => SlowmoError::load(other.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/project/loader.rs"]
mod tests;
