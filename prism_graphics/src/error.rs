//! Error types for the Prism graphics core
//!
//! This module defines the error types used throughout the core,
//! including backend failures, resource lifetime problems, and the
//! precondition violations raised while resolving draw state.

use std::fmt;

/// Result type for Prism operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of binding table an index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Texture (combined image/sampler) bindings
    Texture,
    /// Vertex buffer bindings
    VertexBuffer,
    /// Uniform buffer block bindings
    UniformBuffer,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Texture => write!(f, "texture"),
            BindingKind::VertexBuffer => write!(f, "vertex buffer"),
            BindingKind::UniformBuffer => write!(f, "uniform buffer"),
        }
    }
}

/// Prism errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, pipeline, etc.)
    InvalidResource(String),

    /// Initialization failed (device, allocator, subsystems)
    InitializationFailed(String),

    /// `flush` was called before any pipeline was ever bound
    NoPipelineBound,

    /// A pipeline key does not refer to a live pipeline
    PipelineNotFound,

    /// A binding index is beyond the configured slot capacity
    BindingIndexOutOfRange {
        kind: BindingKind,
        index: u32,
        max: u32,
    },

    /// A vertex attribute reads from a binding with no vertex buffer bound
    MissingVertexBuffer {
        location: u32,
        binding: u32,
    },

    /// An indexed draw was requested with no index buffer bound
    MissingIndexBuffer,

    /// A resource could not be realized on the backend when it was needed
    ResourceNotRealized(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::NoPipelineBound => write!(f, "Flush requested before any pipeline was bound"),
            Error::PipelineNotFound => write!(f, "Pipeline key does not refer to a live pipeline"),
            Error::BindingIndexOutOfRange { kind, index, max } => write!(
                f,
                "Binding index {} out of range for {} bindings (max {})",
                index, kind, max
            ),
            Error::MissingVertexBuffer { location, binding } => write!(
                f,
                "No vertex buffer bound at binding {} (attribute location {})",
                binding, location
            ),
            Error::MissingIndexBuffer => write!(f, "Indexed draw requested with no index buffer bound"),
            Error::ResourceNotRealized(msg) => write!(f, "Resource not realized: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
