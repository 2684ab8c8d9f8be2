/// Fixed-function state carried by a pipeline snapshot

// ===== INPUT ASSEMBLY =====

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit indices (max 65535 vertices)
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

// ===== VERTEX INPUT =====

/// Vertex attribute data format
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_SINT,
    R32G32_SINT,
    R32G32B32A32_SINT,
    R32_UINT,
    R8G8B8A8_UNORM,
    R16G16_SFLOAT,
}

impl VertexFormat {
    /// Number of components read per vertex
    pub fn component_count(&self) -> u32 {
        match self {
            VertexFormat::R32_SFLOAT | VertexFormat::R32_SINT | VertexFormat::R32_UINT => 1,
            VertexFormat::R32G32_SFLOAT | VertexFormat::R32G32_SINT | VertexFormat::R16G16_SFLOAT => 2,
            VertexFormat::R32G32B32_SFLOAT => 3,
            VertexFormat::R32G32B32A32_SFLOAT
            | VertexFormat::R32G32B32A32_SINT
            | VertexFormat::R8G8B8A8_UNORM => 4,
        }
    }

    /// Size in bytes of one attribute value
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::R8G8B8A8_UNORM | VertexFormat::R16G16_SFLOAT => 4,
            _ => self.component_count() * 4,
        }
    }
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    /// Data is per-vertex
    Vertex,
    /// Data is per-instance
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    /// Vertex buffer binding the attribute reads from
    pub binding: u32,
    pub format: VertexFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Layout of one vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexInputState {
    pub buffer_layouts: Vec<VertexBufferLayout>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexInputState {
    /// Layout entry for a binding, if declared
    pub fn buffer_layout(&self, binding: u32) -> Option<&VertexBufferLayout> {
        self.buffer_layouts.iter().find(|layout| layout.binding == binding)
    }
}

// ===== RASTERIZATION =====

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    Front,
    Back,
    FrontAndBack,
}

/// Face selected for culling once culling is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    /// Face to cull, or None when culling is disabled
    pub fn face(&self) -> Option<CullFace> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(CullFace::Front),
            CullMode::Back => Some(CullFace::Back),
            CullMode::FrontAndBack => Some(CullFace::FrontAndBack),
        }
    }
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Rasterization fixed-function state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
        }
    }
}

// ===== COLOR BLEND =====

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Color blending state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBlendState {
    pub blend_enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
}

impl ColorBlendState {
    /// Non-premultiplied alpha blending (src_alpha, 1 - src_alpha)
    pub fn alpha_blending() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: BlendFactor::SrcAlpha,
            dst_color_factor: BlendFactor::OneMinusSrcAlpha,
            color_blend_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::SrcAlpha,
            dst_alpha_factor: BlendFactor::OneMinusSrcAlpha,
            alpha_blend_op: BlendOp::Add,
        }
    }

    /// Color and alpha use the same source and destination factors
    pub fn factors_match(&self) -> bool {
        self.src_color_factor == self.src_alpha_factor
            && self.dst_color_factor == self.dst_alpha_factor
    }

    /// Color and alpha use the same operation
    pub fn ops_match(&self) -> bool {
        self.color_blend_op == self.alpha_blend_op
    }
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
        }
    }
}
