/// VulkanSampler - VkSampler bound alongside textures
///
/// Samplers come from a small fixed table of presets. Dropping a
/// `VulkanSampler` defers the VkSampler destruction through the discard
/// queue, like every other native object.

use ash::vk;
use prism_graphics::prism::resource::{NativeHandle, Sampler};
use prism_graphics::prism::{DiscardQueue, Result};
use prism_graphics::prism_err;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Sampler presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    LinearRepeat,
    LinearClamp,
    NearestRepeat,
    NearestClamp,
    /// Depth comparison sampler for shadow maps
    Shadow,
    Anisotropic,
}

struct SamplerParams {
    mag: vk::Filter,
    min: vk::Filter,
    mipmap: vk::SamplerMipmapMode,
    address: vk::SamplerAddressMode,
    anisotropy: Option<f32>,
    border: vk::BorderColor,
    compare: bool,
}

fn sampler_params(sampler_type: SamplerType) -> SamplerParams {
    let (mag, min, mipmap, address, anisotropy, border, compare) = match sampler_type {
        SamplerType::LinearRepeat => (
            vk::Filter::LINEAR,
            vk::Filter::LINEAR,
            vk::SamplerMipmapMode::LINEAR,
            vk::SamplerAddressMode::REPEAT,
            None,
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
            false,
        ),
        SamplerType::LinearClamp => (
            vk::Filter::LINEAR,
            vk::Filter::LINEAR,
            vk::SamplerMipmapMode::LINEAR,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            None,
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
            false,
        ),
        SamplerType::NearestRepeat => (
            vk::Filter::NEAREST,
            vk::Filter::NEAREST,
            vk::SamplerMipmapMode::NEAREST,
            vk::SamplerAddressMode::REPEAT,
            None,
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
            false,
        ),
        SamplerType::NearestClamp => (
            vk::Filter::NEAREST,
            vk::Filter::NEAREST,
            vk::SamplerMipmapMode::NEAREST,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            None,
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
            false,
        ),
        SamplerType::Shadow => (
            vk::Filter::LINEAR,
            vk::Filter::LINEAR,
            vk::SamplerMipmapMode::NEAREST,
            vk::SamplerAddressMode::CLAMP_TO_BORDER,
            None,
            vk::BorderColor::FLOAT_OPAQUE_WHITE,
            true,
        ),
        SamplerType::Anisotropic => (
            vk::Filter::LINEAR,
            vk::Filter::LINEAR,
            vk::SamplerMipmapMode::LINEAR,
            vk::SamplerAddressMode::REPEAT,
            Some(16.0),
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
            false,
        ),
    };

    SamplerParams { mag, min, mipmap, address, anisotropy, border, compare }
}

/// Create a raw VkSampler for a preset
///
/// Anisotropy is only requested when the device enabled `samplerAnisotropy`.
pub(crate) fn create_vk_sampler(
    device: &ash::Device,
    sampler_type: SamplerType,
    anisotropy_supported: bool,
) -> Result<vk::Sampler> {
    let params = sampler_params(sampler_type);

    let mut create_info = vk::SamplerCreateInfo::default()
        .mag_filter(params.mag)
        .min_filter(params.min)
        .mipmap_mode(params.mipmap)
        .address_mode_u(params.address)
        .address_mode_v(params.address)
        .address_mode_w(params.address)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(params.border)
        .unnormalized_coordinates(false);

    if params.compare {
        create_info = create_info
            .compare_enable(true)
            .compare_op(vk::CompareOp::LESS_OR_EQUAL);
    } else {
        create_info = create_info
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS);
    }

    match params.anisotropy {
        Some(max_aniso) if anisotropy_supported => {
            create_info = create_info.anisotropy_enable(true).max_anisotropy(max_aniso);
        }
        _ => {
            create_info = create_info.anisotropy_enable(false).max_anisotropy(1.0);
        }
    }

    unsafe {
        device
            .create_sampler(&create_info, None)
            .map_err(|e| prism_err!("prism::vulkan", "Failed to create {:?} sampler: {:?}", sampler_type, e))
    }
}

/// Sampler object handed to a Context texture binding
pub struct VulkanSampler {
    context: Arc<GpuContext>,
    discard_queue: Arc<DiscardQueue>,
    sampler: vk::Sampler,
    sampler_type: SamplerType,
}

impl VulkanSampler {
    pub(crate) fn new(
        context: Arc<GpuContext>,
        discard_queue: Arc<DiscardQueue>,
        sampler_type: SamplerType,
        anisotropy_supported: bool,
    ) -> Result<Self> {
        let sampler = create_vk_sampler(&context.device, sampler_type, anisotropy_supported)?;
        Ok(Self {
            context,
            discard_queue,
            sampler,
            sampler_type,
        })
    }

    pub fn sampler_type(&self) -> SamplerType {
        self.sampler_type
    }

    pub fn vk_sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Sampler for VulkanSampler {
    fn native_handle(&self) -> NativeHandle {
        NativeHandle(vk::Handle::as_raw(self.sampler))
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        let context = self.context.clone();
        let sampler = self.sampler;
        self.discard_queue.enqueue(move || unsafe {
            context.device.destroy_sampler(sampler, None);
        });
    }
}
