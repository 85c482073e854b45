//! Error types for GPU resource management.

use std::io;

use thiserror::Error;

use crate::backend::{GlError, GlResult, ShaderStage};

/// Errors raised while creating, configuring, or using GPU resources.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A shader stage failed to compile. `log` is the driver's info log.
    #[error("{stage} shader compilation failed: {log}")]
    Compile { stage: ShaderStage, log: String },

    /// The program failed to link. `log` is the driver's info log.
    #[error("shader program link failed: {log}")]
    Link { log: String },

    /// The linked program has no active uniform with this name.
    #[error("shader uniform does not exist: {name}")]
    UniformNotFound { name: String },

    /// A native call failed while a pending uniform was applied.
    #[error("error setting uniform `{name}`")]
    Uniform {
        name: String,
        #[source]
        source: GlError,
    },

    /// A resource was used in a state the caller must rule out (released handle,
    /// draw without a program, mismatched vertex streams). Indicates a bug.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Any other native failure.
    #[error("{what}")]
    Gl {
        what: &'static str,
        #[source]
        source: GlError,
    },

    /// The asset source could not provide a file.
    #[error("failed to read asset `{name}`")]
    Asset {
        name: String,
        #[source]
        source: io::Error,
    },

    /// CPU-side data does not fit the resource it was handed to.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl RenderError {
    /// Builds a precondition violation and logs it; these are never silent.
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("{message}");
        Self::Precondition(message)
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Attaches a description to a failed backend call.
pub(crate) trait GlContext<T> {
    fn gl_context(self, what: &'static str) -> Result<T>;
}

impl<T> GlContext<T> for GlResult<T> {
    #[inline]
    fn gl_context(self, what: &'static str) -> Result<T> {
        self.map_err(|source| RenderError::Gl { what, source })
    }
}
