/*!
# Prism Graphics - Vulkan Backend

Vulkan implementation of the prism_graphics device layer and backend traits,
built on Ash for the Vulkan bindings and gpu-allocator for memory.

- [`VulkanDevice`](prism::VulkanDevice): headless instance and device, resource
  factory, owner of the discard queue
- [`GpuContext`](prism::GpuContext): the `DeviceLayer` resource handles destroy
  their images and buffers through
- [`VulkanTexture`](prism::VulkanTexture) / [`VulkanBuffer`](prism::VulkanBuffer):
  lazily realized on first draw
- [`VulkanCommandBackend`](prism::VulkanCommandBackend): the `Backend` a
  `Context` records into a command buffer through
- [`reflect_program`](prism::reflect_program): push-constant reflection with spirq

# Example

```no_run
use prism_graphics::prism::Context;
use prism_graphics::prism::context::ContextConfig;
use prism_graphics::prism::discard::SafePoint;
use prism_graphics_vulkan::prism::{VulkanConfig, VulkanDevice};
# fn record(command_buffer: ash::vk::CommandBuffer) -> prism_graphics::prism::Result<()> {
let device = VulkanDevice::new(VulkanConfig::default())?;
let backend = device.command_backend(command_buffer);
let mut context = Context::new(Box::new(backend), ContextConfig::default());
// ... bind_pipeline / bind_* / flush ...
device.drain_discard_queue(SafePoint::FrameBoundary(2));
# Ok(())
# }
```
*/

mod debug;
mod vulkan_format;
mod vulkan_context;
mod vulkan_device;
mod vulkan_sampler;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_program;
mod vulkan_command_backend;

pub mod prism {
    pub use crate::vulkan_device::{DeviceExtensions, VulkanConfig, VulkanDevice};
    pub use crate::vulkan_context::GpuContext;
    pub use crate::vulkan_texture::VulkanTexture;
    pub use crate::vulkan_buffer::VulkanBuffer;
    pub use crate::vulkan_sampler::{SamplerType, VulkanSampler};
    pub use crate::vulkan_command_backend::VulkanCommandBackend;
    pub use crate::vulkan_program::{
        classify, merge_uniforms, reflect_program, reflect_standalone_uniforms, spirv_words,
        ScalarKind,
    };

    /// Enum conversions to Vulkan
    pub mod format {
        pub use crate::vulkan_format::*;
    }

    /// Validation layer routing and statistics
    pub mod debug {
        pub use crate::debug::{
            get_validation_stats, print_validation_stats_report, DebugConfig, DebugSeverity,
            ValidationStats,
        };
    }
}
