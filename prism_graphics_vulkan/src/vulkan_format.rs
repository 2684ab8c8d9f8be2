/// Conversions from prism enums to Vulkan enums
///
/// Pure functions, no device required.

use ash::vk;
use prism_graphics::prism::pipeline::{
    BlendFactor, BlendOp, CullFace, FrontFace, IndexFormat, PrimitiveTopology, VertexFormat,
    VertexInputRate,
};
use prism_graphics::prism::resource::{
    AspectFlags, BufferUsage, Format, ImageTiling, ImageType, ImageUsage, ResourceLayout,
    SampleCount,
};

// ===== IMAGES =====

pub fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::R8_UNORM => vk::Format::R8_UNORM,
        Format::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        Format::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        Format::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        Format::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        Format::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32_SFLOAT => vk::Format::R32_SFLOAT,
        Format::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16_UNORM => vk::Format::D16_UNORM,
        Format::D32_FLOAT => vk::Format::D32_SFLOAT,
        Format::D16_UNORM_S8_UINT => vk::Format::D16_UNORM_S8_UINT,
        Format::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        Format::D32_FLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
        Format::S8_UINT => vk::Format::S8_UINT,
    }
}

pub fn image_type_to_vk(image_type: ImageType) -> vk::ImageType {
    match image_type {
        ImageType::Image1D => vk::ImageType::TYPE_1D,
        ImageType::Image2D => vk::ImageType::TYPE_2D,
        ImageType::Image3D => vk::ImageType::TYPE_3D,
    }
}

/// View type matching an image type and layer count
pub fn view_type_to_vk(image_type: ImageType, array_layers: u32) -> vk::ImageViewType {
    match (image_type, array_layers > 1) {
        (ImageType::Image1D, false) => vk::ImageViewType::TYPE_1D,
        (ImageType::Image1D, true) => vk::ImageViewType::TYPE_1D_ARRAY,
        (ImageType::Image2D, false) => vk::ImageViewType::TYPE_2D,
        (ImageType::Image2D, true) => vk::ImageViewType::TYPE_2D_ARRAY,
        (ImageType::Image3D, _) => vk::ImageViewType::TYPE_3D,
    }
}

pub fn tiling_to_vk(tiling: ImageTiling) -> vk::ImageTiling {
    match tiling {
        ImageTiling::Optimal => vk::ImageTiling::OPTIMAL,
        ImageTiling::Linear => vk::ImageTiling::LINEAR,
    }
}

pub fn sample_count_to_vk(samples: SampleCount) -> vk::SampleCountFlags {
    match samples {
        SampleCount::S1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::S2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::S4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::S8 => vk::SampleCountFlags::TYPE_8,
        SampleCount::S16 => vk::SampleCountFlags::TYPE_16,
    }
}

pub fn layout_to_vk(layout: ResourceLayout) -> vk::ImageLayout {
    match layout {
        ResourceLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ResourceLayout::General => vk::ImageLayout::GENERAL,
        ResourceLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn aspect_to_vk(aspect: AspectFlags) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspect.contains(AspectFlags::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(AspectFlags::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(AspectFlags::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub fn image_usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    for (ours, theirs) in [
        (ImageUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
        (ImageUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (ImageUsage::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ] {
        if usage.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

// ===== BUFFERS =====

pub fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    for (ours, theirs) in [
        (BufferUsage::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsage::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::INDIRECT, vk::BufferUsageFlags::INDIRECT_BUFFER),
    ] {
        if usage.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

pub fn index_format_to_vk(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

// ===== PIPELINE STATE =====

pub fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        VertexFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::R32_SINT => vk::Format::R32_SINT,
        VertexFormat::R32G32_SINT => vk::Format::R32G32_SINT,
        VertexFormat::R32G32B32A32_SINT => vk::Format::R32G32B32A32_SINT,
        VertexFormat::R32_UINT => vk::Format::R32_UINT,
        VertexFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::R16G16_SFLOAT => vk::Format::R16G16_SFLOAT,
    }
}

pub fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub fn cull_face_to_vk(face: CullFace) -> vk::CullModeFlags {
    match face {
        CullFace::Front => vk::CullModeFlags::FRONT,
        CullFace::Back => vk::CullModeFlags::BACK,
        CullFace::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

pub fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
