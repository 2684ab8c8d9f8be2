/// Backend trait - the leaf calls a Context resolves draw state into
///
/// The Context owns the resolution order; a backend only translates each
/// call into its own API (Vulkan command recording, a call trace in tests).
/// Backend-specific enum values never leak past this trait.

use crate::error::Result;
use crate::pipeline::{
    BlendFactor, BlendOp, CullFace, FrontFace, IndexFormat, NativePipeline, PrimitiveTopology,
    VertexFormat, VertexInputRate,
};
use crate::resource::NativeHandle;

/// Toggleable fixed-function capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Blend,
    CullFace,
}

/// Buffer bind point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Vertex data
    Array,
    /// Index data
    ElementArray,
}

pub trait Backend: Send {
    // ===== PIPELINE =====

    /// Bind the pipeline's native fixed-function object
    fn bind_pipeline(&mut self, pipeline: &NativePipeline) -> Result<()>;

    /// Enable or disable a capability
    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()>;

    // ===== BLEND =====

    /// Same factors for color and alpha
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) -> Result<()>;

    /// Separate color and alpha factors
    fn blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> Result<()>;

    /// Same operation for color and alpha
    fn blend_equation(&mut self, op: BlendOp) -> Result<()>;

    /// Separate color and alpha operations
    fn blend_equation_separate(&mut self, color_op: BlendOp, alpha_op: BlendOp) -> Result<()>;

    // ===== RASTER =====

    fn cull_face(&mut self, face: CullFace) -> Result<()>;

    /// Winding order of front-facing triangles
    fn front_face(&mut self, face: FrontFace) -> Result<()>;

    // ===== UNIFORMS =====

    /// Upload `count` float vectors of `components` components each
    fn uniform_float(&mut self, location: u32, components: u32, count: u32, data: &[f32]) -> Result<()>;

    /// Upload `count` integer vectors of `components` components each
    fn uniform_int(&mut self, location: u32, components: u32, count: u32, data: &[i32]) -> Result<()>;

    /// Upload `count` square float matrices of size `dimension`
    fn uniform_matrix(&mut self, location: u32, dimension: u32, count: u32, data: &[f32]) -> Result<()>;

    // ===== TEXTURES =====

    /// Bind a realized texture (and optional sampler) on a texture unit
    fn bind_texture(&mut self, unit: u32, texture: NativeHandle, sampler: Option<NativeHandle>) -> Result<()>;

    // ===== VERTEX INPUT =====

    fn enable_vertex_attribute(&mut self, location: u32) -> Result<()>;

    fn disable_vertex_attribute(&mut self, location: u32) -> Result<()>;

    /// Bind a buffer on a target; subsequent attribute/index calls read it
    fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) -> Result<()>;

    /// Source an attribute from the buffer bound on `BufferTarget::Array`
    ///
    /// `input_rate` selects whether the attribute advances per vertex or
    /// per instance.
    fn vertex_attribute_pointer(
        &mut self,
        location: u32,
        format: VertexFormat,
        stride: u32,
        input_rate: VertexInputRate,
        offset: u64,
    ) -> Result<()>;

    // ===== DRAW =====

    /// Non-indexed draw of `count` vertices starting at `first`
    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) -> Result<()>;

    /// Indexed draw reading `count` indices from the bound element buffer at byte `offset`
    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        format: IndexFormat,
        offset: u64,
    ) -> Result<()>;
}
