/// Resource formats, usage flags and creation descriptors

use bitflags::bitflags;

/// Image format
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    // Color formats
    R8_UNORM,
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,

    // Depth / stencil formats
    D16_UNORM,
    D32_FLOAT,
    D16_UNORM_S8_UINT,
    D24_UNORM_S8_UINT,
    D32_FLOAT_S8_UINT,
    S8_UINT,
}

/// Every format that is not a color format
pub const DEPTH_STENCIL_FORMATS: [Format; 6] = [
    Format::D32_FLOAT,
    Format::D16_UNORM,
    Format::D32_FLOAT_S8_UINT,
    Format::D24_UNORM_S8_UINT,
    Format::D16_UNORM_S8_UINT,
    Format::S8_UINT,
];

impl Format {
    /// Whether the format belongs to the depth/stencil set
    pub fn is_depth_stencil(&self) -> bool {
        DEPTH_STENCIL_FORMATS.contains(self)
    }

    /// Aspects an image of this format exposes
    pub fn aspect_flags(&self) -> AspectFlags {
        match self {
            Format::D32_FLOAT | Format::D16_UNORM => AspectFlags::DEPTH,
            Format::S8_UINT => AspectFlags::STENCIL,
            Format::D32_FLOAT_S8_UINT
            | Format::D24_UNORM_S8_UINT
            | Format::D16_UNORM_S8_UINT => AspectFlags::DEPTH | AspectFlags::STENCIL,
            _ => AspectFlags::COLOR,
        }
    }

    /// Size in bytes of one texel
    pub fn texel_size(&self) -> u32 {
        match self {
            Format::R8_UNORM | Format::S8_UINT => 1,
            Format::D16_UNORM => 2,
            Format::D16_UNORM_S8_UINT => 3,
            Format::R8G8B8A8_SRGB
            | Format::R8G8B8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::R32_SFLOAT
            | Format::D32_FLOAT
            | Format::D24_UNORM_S8_UINT => 4,
            Format::D32_FLOAT_S8_UINT => 5,
            Format::R16G16B16A16_SFLOAT => 8,
            Format::R32G32B32A32_SFLOAT => 16,
        }
    }
}

bitflags! {
    /// Image aspects (color, depth, stencil)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AspectFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// How an image may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// How a buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

/// Image dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Image1D,
    Image2D,
    Image3D,
}

/// Texel arrangement in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTiling {
    /// Implementation-defined layout (fast sampling)
    Optimal,
    /// Row-major layout (host readable)
    Linear,
}

/// Samples per texel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCount {
    S1,
    S2,
    S4,
    S8,
    S16,
}

impl SampleCount {
    pub fn count(&self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
            SampleCount::S16 => 16,
        }
    }
}

/// Image layout / access state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Image extent in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

// ===== DESCRIPTORS =====

/// Descriptor for creating an image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    pub image_type: ImageType,
    pub format: Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: SampleCount,
    pub tiling: ImageTiling,
    pub usage: ImageUsage,
    /// Layout the image is in right after creation
    pub initial_layout: ResourceLayout,
}

impl ImageDescriptor {
    /// Single-mip, single-layer, single-sample 2D image
    pub fn new_2d(width: u32, height: u32, format: Format, usage: ImageUsage) -> Self {
        Self {
            image_type: ImageType::Image2D,
            format,
            extent: Extent3D { width, height, depth: 1 },
            mip_levels: 1,
            array_layers: 1,
            samples: SampleCount::S1,
            tiling: ImageTiling::Optimal,
            usage,
            initial_layout: ResourceLayout::Undefined,
        }
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
    /// Whether the memory must be mappable from the CPU
    pub host_visible: bool,
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
