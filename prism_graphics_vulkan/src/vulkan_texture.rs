/// VulkanTexture - lazily realized sampled image
///
/// Holds the image descriptor and optional initial pixels until a draw needs
/// the texture. `initialize_resource` then creates the image, its view, and
/// uploads mip 0. `prepare` makes sure the image is in
/// `SHADER_READ_ONLY_OPTIMAL` before it is sampled.

use ash::vk;
use prism_graphics::prism::resource::{
    BufferDescriptor, BufferResource, BufferUsage, ImageDescriptor, ImageResource, ImageUsage,
    NativeHandle, ResourceLayout, Texture,
};
use prism_graphics::prism::{DiscardQueue, Error, Result};
use prism_graphics::{prism_err, prism_trace};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_to_vk, format_to_vk, layout_to_vk, view_type_to_vk};

const LOG_SOURCE: &str = "prism::vulkan::Texture";

struct TextureState {
    image: Option<ImageResource<GpuContext>>,
    view: vk::ImageView,
    pending_pixels: Option<Vec<u8>>,
}

pub struct VulkanTexture {
    context: Arc<GpuContext>,
    discard_queue: Arc<DiscardQueue>,
    descriptor: ImageDescriptor,
    state: Mutex<TextureState>,
}

/// Bytes of mip 0 across every layer
fn base_level_size(desc: &ImageDescriptor) -> u64 {
    desc.extent.width as u64
        * desc.extent.height as u64
        * desc.extent.depth as u64
        * desc.array_layers.max(1) as u64
        * desc.format.texel_size() as u64
}

/// Access mask and stage a layout is produced or consumed with
fn layout_access(layout: ResourceLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ResourceLayout::Undefined => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        ResourceLayout::TransferDst => (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
        ResourceLayout::TransferSrc => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
        ResourceLayout::ShaderReadOnly => (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER),
        ResourceLayout::ColorAttachment => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ResourceLayout::DepthStencilAttachment => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ResourceLayout::General | ResourceLayout::Present => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

impl VulkanTexture {
    /// Describe a texture; nothing is created on the device yet
    pub(crate) fn new(
        context: Arc<GpuContext>,
        discard_queue: Arc<DiscardQueue>,
        mut descriptor: ImageDescriptor,
        pixels: Option<Vec<u8>>,
    ) -> Result<Self> {
        if let Some(pixels) = &pixels {
            let expected = base_level_size(&descriptor);
            if pixels.len() as u64 != expected {
                return Err(Error::InvalidResource(format!(
                    "Texture data is {} bytes, {}x{} {:?} needs {}",
                    pixels.len(), descriptor.extent.width, descriptor.extent.height,
                    descriptor.format, expected
                )));
            }
            descriptor.usage |= ImageUsage::TRANSFER_DST;
        }

        Ok(Self {
            context,
            discard_queue,
            descriptor,
            state: Mutex::new(TextureState {
                image: None,
                view: vk::ImageView::null(),
                pending_pixels: pixels,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, TextureState>> {
        self.state
            .lock()
            .map_err(|_| prism_err!(LOG_SOURCE, "Texture state mutex poisoned"))
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    /// Current layout, or None while not realized
    pub fn layout(&self) -> Option<ResourceLayout> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.image.as_ref().map(|image| image.layout()))
    }

    fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_to_vk(self.descriptor.format.aspect_flags()),
            base_mip_level: 0,
            level_count: self.descriptor.mip_levels.max(1),
            base_array_layer: 0,
            layer_count: self.descriptor.array_layers.max(1),
        }
    }

    fn barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        from: ResourceLayout,
        to: ResourceLayout,
    ) {
        let (src_access, src_stage) = layout_access(from);
        let (dst_access, dst_stage) = layout_access(to);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(layout_to_vk(from))
            .new_layout(layout_to_vk(to))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(self.subresource_range())
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Copy mip 0 from a staging buffer and leave the image shader-readable
    fn upload(&self, image: &mut ImageResource<GpuContext>, pixels: &[u8]) -> Result<()> {
        let vk_image = image
            .handle()
            .ok_or_else(|| Error::ResourceNotRealized("texture image released".to_string()))?;

        let mut staging = BufferResource::new(
            self.context.clone(),
            self.discard_queue.clone(),
            BufferDescriptor {
                size: pixels.len() as u64,
                usage: BufferUsage::TRANSFER_SRC,
                host_visible: true,
            },
        )?;
        let staging_buffer = staging
            .handle()
            .ok_or_else(|| prism_err!(LOG_SOURCE, "Staging buffer has no handle"))?;
        staging
            .memory_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| prism_err!(LOG_SOURCE, "Staging buffer memory is not mapped"))?[..pixels.len()]
            .copy_from_slice(pixels);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect_to_vk(self.descriptor.format.aspect_flags()),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: self.descriptor.array_layers.max(1),
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: self.descriptor.extent.width,
                height: self.descriptor.extent.height,
                depth: self.descriptor.extent.depth,
            });

        let from = image.layout();
        let result = self.context.submit_one_shot(|command_buffer| {
            self.barrier(command_buffer, vk_image, from, ResourceLayout::TransferDst);
            unsafe {
                self.context.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging_buffer,
                    vk_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            self.barrier(command_buffer, vk_image, ResourceLayout::TransferDst, ResourceLayout::ShaderReadOnly);
        });

        staging.destroy_now();
        result?;
        image.set_layout(ResourceLayout::ShaderReadOnly);
        Ok(())
    }

    fn create_view(&self, image: vk::Image) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type_to_vk(self.descriptor.image_type, self.descriptor.array_layers))
            .format(format_to_vk(self.descriptor.format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(self.subresource_range());

        unsafe {
            self.context.device.create_image_view(&create_info, None)
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to create image view: {:?}", e))
        }
    }
}

impl Texture for VulkanTexture {
    fn native_handle(&self) -> Option<NativeHandle> {
        let state = self.state.lock().ok()?;
        if state.image.is_none() {
            return None;
        }
        Some(NativeHandle(vk::Handle::as_raw(state.view)))
    }

    fn initialize_resource(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.image.is_some() {
            return Ok(());
        }

        let mut image = ImageResource::new(self.context.clone(), self.discard_queue.clone(), self.descriptor.clone())?;
        let vk_image = image
            .handle()
            .ok_or_else(|| prism_err!(LOG_SOURCE, "Created image has no handle"))?;

        if let Some(pixels) = state.pending_pixels.as_deref() {
            self.upload(&mut image, pixels)?;
        }
        let view = self.create_view(vk_image)?;

        prism_trace!(LOG_SOURCE, "Realized {}x{} texture {:?}",
            self.descriptor.extent.width, self.descriptor.extent.height, vk_image);
        state.pending_pixels = None;
        state.view = view;
        state.image = Some(image);
        Ok(())
    }

    fn prepare(&self) -> Result<()> {
        let mut state = self.lock()?;
        let Some(image) = state.image.as_mut() else {
            return Ok(());
        };
        if image.layout() == ResourceLayout::ShaderReadOnly {
            return Ok(());
        }

        let vk_image = image
            .handle()
            .ok_or_else(|| Error::ResourceNotRealized("texture image released".to_string()))?;
        let from = image.layout();
        self.context.submit_one_shot(|command_buffer| {
            self.barrier(command_buffer, vk_image, from, ResourceLayout::ShaderReadOnly);
        })?;
        image.set_layout(ResourceLayout::ShaderReadOnly);
        Ok(())
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        let Ok(state) = self.state.get_mut() else {
            return;
        };

        // View first: the discard queue runs in FIFO order
        if state.view != vk::ImageView::null() {
            let context = self.context.clone();
            let view = state.view;
            self.discard_queue.enqueue(move || unsafe {
                context.device.destroy_image_view(view, None);
            });
            state.view = vk::ImageView::null();
        }
        state.image = None;
    }
}
