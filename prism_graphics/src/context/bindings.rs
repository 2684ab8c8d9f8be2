/// Binding entries accepted by the Context, and what it stores for them

use std::sync::Arc;
use crate::pipeline::IndexFormat;
use crate::resource::{Buffer, Sampler, Texture};

// ===== UPSTREAM BINDINGS =====

/// Texture bound on the texture unit equal to `binding`
#[derive(Clone)]
pub struct TextureBinding {
    pub binding: u32,
    pub texture: Arc<dyn Texture>,
    pub sampler: Option<Arc<dyn Sampler>>,
}

/// Vertex buffer for one vertex binding
///
/// A `None` buffer leaves whatever is already bound untouched.
#[derive(Clone)]
pub struct VertexBufferBinding {
    pub binding: u32,
    pub buffer: Option<Arc<dyn Buffer>>,
    /// Byte offset added to every attribute reading this binding
    pub offset: u64,
}

/// Index buffer for indexed draws
#[derive(Clone)]
pub struct IndexBufferBinding {
    pub buffer: Arc<dyn Buffer>,
    /// Byte offset of the first index
    pub offset: u64,
    pub format: IndexFormat,
}

/// Uniform buffer range
///
/// Used for uniform blocks (by binding index) and for the standalone
/// uniform buffer (binding ignored). A `None` buffer leaves whatever is
/// already bound untouched.
#[derive(Clone)]
pub struct UniformBufferBinding {
    pub binding: u32,
    pub buffer: Option<Arc<dyn Buffer>>,
    pub offset: u64,
    pub size: u64,
}

// ===== STORED BINDINGS =====

/// Vertex buffer currently held in a slot
#[derive(Clone)]
pub struct BoundVertexBuffer {
    pub buffer: Arc<dyn Buffer>,
    pub offset: u64,
}

/// Uniform buffer range currently held in a slot
#[derive(Clone)]
pub struct BoundUniformBuffer {
    pub buffer: Arc<dyn Buffer>,
    pub offset: u64,
    pub size: u64,
}
