/// GpuContext - Shared GPU state for every Vulkan resource
///
/// Contains everything needed to create and destroy native objects:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue and command pool for one-shot upload operations
///
/// `GpuContext` is the Vulkan `DeviceLayer`: resource handles hold an
/// `Arc<GpuContext>` and call back into it, from discard closures, to
/// destroy their image or buffer.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use prism_graphics::prism::resource::{BufferDescriptor, DeviceLayer, ImageDescriptor};
use prism_graphics::prism::{Error, Result};
use prism_graphics::{prism_err, prism_error, prism_warn};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard};

use crate::vulkan_format::{
    buffer_usage_to_vk, format_to_vk, image_type_to_vk, image_usage_to_vk, layout_to_vk,
    sample_count_to_vk, tiling_to_vk,
};

const LOG_SOURCE: &str = "prism::vulkan";

/// Shared GPU context for all Vulkan resources.
///
/// Note: device and instance destruction is handled by `VulkanDevice::drop()`,
/// which also drops the allocator before the device goes away.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue for command submission
    pub graphics_queue: vk::Queue,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// Reusable command pool for one-shot upload operations
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub(crate) upload_command_pool: Mutex<vk::CommandPool>,
}

impl GpuContext {
    pub(crate) fn new(
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
        }
    }

    pub(crate) fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| prism_err!(LOG_SOURCE, "GPU allocator mutex poisoned"))
    }

    /// Allocate memory for `requirements` at `location`
    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.lock_allocator()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|_e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                prism_error!(LOG_SOURCE, "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                Error::OutOfMemory
            })
    }

    fn free(&self, allocation: Allocation) {
        // Don't bail if the lock fails - the native object still has to go
        match self.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    prism_warn!(LOG_SOURCE, "Failed to free GPU allocation: {:?}", e);
                }
            }
            Err(_) => prism_warn!(LOG_SOURCE, "GPU allocator mutex poisoned, allocation leaked"),
        }
    }

    /// Record commands into a one-shot command buffer, submit, and wait
    pub(crate) fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| prism_err!(LOG_SOURCE, "Upload command pool mutex poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to allocate upload command buffer: {:?}", e))?;
            let command_buffer = command_buffers[0];

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            let result = self.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to begin upload command buffer: {:?}", e))
                .and_then(|_| {
                    record(command_buffer);
                    self.device.end_command_buffer(command_buffer)
                        .map_err(|e| prism_err!(LOG_SOURCE, "Failed to end upload command buffer: {:?}", e))
                })
                .and_then(|_| {
                    let submit_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&submit_buffers);
                    self.device.queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
                        .map_err(|e| prism_err!(LOG_SOURCE, "Failed to submit upload commands: {:?}", e))
                })
                .and_then(|_| {
                    self.device.queue_wait_idle(self.graphics_queue)
                        .map_err(|e| prism_err!(LOG_SOURCE, "Failed to wait for upload completion: {:?}", e))
                });

            self.device.free_command_buffers(*pool, &command_buffers);
            result
        }
    }
}

impl DeviceLayer for GpuContext {
    type Image = vk::Image;
    type Buffer = vk::Buffer;
    type Memory = Allocation;

    fn create_image(&self, desc: &ImageDescriptor) -> Result<(vk::Image, Allocation)> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(image_type_to_vk(desc.image_type))
            .format(format_to_vk(desc.format))
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: desc.extent.depth,
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(desc.array_layers.max(1))
            .samples(sample_count_to_vk(desc.samples))
            .tiling(tiling_to_vk(desc.tiling))
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(layout_to_vk(desc.initial_layout));

        unsafe {
            let image = self.device.create_image(&create_info, None)
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to create {}x{} image: {:?}",
                    desc.extent.width, desc.extent.height, e))?;

            let requirements = self.device.get_image_memory_requirements(image);
            let linear = desc.tiling == prism_graphics::prism::resource::ImageTiling::Linear;
            let allocation = match self.allocate("image", requirements, MemoryLocation::GpuOnly, linear) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_image(image, None);
                return Err(prism_err!(LOG_SOURCE, "Failed to bind image memory: {:?}", e));
            }

            Ok((image, allocation))
        }
    }

    fn destroy_image(&self, image: vk::Image, memory: Allocation) {
        self.free(memory);
        unsafe {
            self.device.destroy_image(image, None);
        }
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<(vk::Buffer, Allocation)> {
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let location = if desc.host_visible {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        unsafe {
            let buffer = self.device.create_buffer(&create_info, None)
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = match self.allocate("buffer", requirements, location, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(prism_err!(LOG_SOURCE, "Failed to bind buffer memory: {:?}", e));
            }

            Ok((buffer, allocation))
        }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, memory: Allocation) {
        self.free(memory);
        unsafe {
            self.device.destroy_buffer(buffer, None);
        }
    }
}
