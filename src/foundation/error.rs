/// Convenience result type used across the renderer.
pub type SlowmoResult<T> = Result<T, SlowmoError>;

/// Top-level error taxonomy used by renderer APIs.
#[derive(thiserror::Error, Debug)]
pub enum SlowmoError {
    /// Invalid user-provided configuration or project data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The project file could not be read or is structurally invalid.
    #[error("failed to load project: {message}")]
    Load {
        /// Message reported by the project loader.
        message: String,
    },

    /// A configuration call was made before any project was loaded.
    #[error("no project loaded")]
    NoProject,

    /// Rendering was requested while no render target is attached.
    #[error("not ready to render: no render target set")]
    NoTarget,

    /// The render task is running and cannot be reconfigured.
    #[error("render task is running")]
    Busy,

    /// Failure while producing or writing frames.
    #[error("render error: {0}")]
    Render(String),

    /// Failure while building or reading optical flow.
    #[error("flow error: {0}")]
    Flow(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SlowmoError {
    /// Build a [`SlowmoError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SlowmoError::Load`] value.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load {
            message: msg.into(),
        }
    }

    /// Build a [`SlowmoError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`SlowmoError::Flow`] value.
    pub fn flow(msg: impl Into<String>) -> Self {
        Self::Flow(msg.into())
    }

    /// Build a [`SlowmoError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
