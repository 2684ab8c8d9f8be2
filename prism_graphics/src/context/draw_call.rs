/// Draw descriptor passed to `Context::flush`

use std::sync::Arc;
use crate::resource::Buffer;

#[derive(Clone)]
pub enum DrawCall {
    /// Non-indexed draw over `[first_vertex, first_vertex + vertex_count)`
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    /// Indexed draw from the bound index buffer
    DrawIndexed {
        index_count: u32,
    },
    /// Indirect indexed draw (accepted, not issued)
    DrawIndexedIndirect {
        buffer: Arc<dyn Buffer>,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

impl DrawCall {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            DrawCall::Draw { .. } => "Draw",
            DrawCall::DrawIndexed { .. } => "DrawIndexed",
            DrawCall::DrawIndexedIndirect { .. } => "DrawIndexedIndirect",
        }
    }
}
