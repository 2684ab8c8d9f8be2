/// VulkanBuffer - lazily realized VkBuffer with a host shadow copy
///
/// The VkBuffer is created on first use (`initialize_resource`), which a
/// Context triggers when a draw needs it. Contents live in a host shadow
/// that standalone uniforms are read from, and are pushed to the GPU at
/// realization and on every `write`: host-visible buffers through their
/// mapping, device-local ones through a staging copy.

use ash::vk;
use prism_graphics::prism::resource::{
    Buffer, BufferDescriptor, BufferResource, BufferUsage, NativeHandle,
};
use prism_graphics::prism::{DiscardQueue, Error, Result};
use prism_graphics::{prism_err, prism_trace};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_context::GpuContext;

const LOG_SOURCE: &str = "prism::vulkan::Buffer";

struct BufferState {
    resource: Option<BufferResource<GpuContext>>,
    shadow: Vec<u8>,
}

pub struct VulkanBuffer {
    context: Arc<GpuContext>,
    discard_queue: Arc<DiscardQueue>,
    descriptor: BufferDescriptor,
    state: Mutex<BufferState>,
}

impl VulkanBuffer {
    /// Describe a buffer; nothing is created on the device yet
    ///
    /// `data` is truncated or zero-padded to the descriptor size.
    pub(crate) fn new(
        context: Arc<GpuContext>,
        discard_queue: Arc<DiscardQueue>,
        descriptor: BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Self {
        let mut shadow = vec![0u8; descriptor.size as usize];
        if let Some(data) = data {
            let len = data.len().min(shadow.len());
            shadow[..len].copy_from_slice(&data[..len]);
        }

        Self {
            context,
            discard_queue,
            descriptor,
            state: Mutex::new(BufferState { resource: None, shadow }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BufferState>> {
        self.state
            .lock()
            .map_err(|_| prism_err!(LOG_SOURCE, "Buffer state mutex poisoned"))
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Native VkBuffer, once realized
    pub fn vk_buffer(&self) -> Option<vk::Buffer> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.resource.as_ref().and_then(|resource| resource.handle()))
    }

    /// Overwrite `data.len()` bytes at `offset`
    ///
    /// Updates the shadow and, when realized, the GPU copy.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= self.descriptor.size)
            .ok_or_else(|| Error::InvalidResource(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(), offset, self.descriptor.size
            )))?;

        let mut state = self.lock()?;
        state.shadow[offset as usize..end as usize].copy_from_slice(data);

        let BufferState { resource, shadow } = &mut *state;
        if let Some(resource) = resource.as_mut() {
            self.upload(resource, offset, &shadow[offset as usize..end as usize])?;
        }
        Ok(())
    }

    /// Push `data` into the realized buffer at `offset`
    fn upload(&self, resource: &mut BufferResource<GpuContext>, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        if self.descriptor.host_visible {
            let mapped = resource
                .memory_mut()
                .and_then(|allocation| allocation.mapped_slice_mut())
                .ok_or_else(|| prism_err!(LOG_SOURCE, "Host-visible buffer memory is not mapped"))?;
            mapped[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            return Ok(());
        }

        let dst = resource
            .handle()
            .ok_or_else(|| Error::ResourceNotRealized("buffer released".to_string()))?;

        let mut staging = BufferResource::new(
            self.context.clone(),
            self.discard_queue.clone(),
            BufferDescriptor {
                size: data.len() as u64,
                usage: BufferUsage::TRANSFER_SRC,
                host_visible: true,
            },
        )?;
        let src = staging
            .handle()
            .ok_or_else(|| prism_err!(LOG_SOURCE, "Staging buffer has no handle"))?;
        staging
            .memory_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| prism_err!(LOG_SOURCE, "Staging buffer memory is not mapped"))?[..data.len()]
            .copy_from_slice(data);

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: offset,
            size: data.len() as u64,
        };
        let device = &self.context.device;
        let result = self.context.submit_one_shot(|command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
        });

        // The copy was waited on, no GPU work references the staging buffer
        staging.destroy_now();
        result
    }
}

impl Buffer for VulkanBuffer {
    fn native_handle(&self) -> Option<NativeHandle> {
        self.vk_buffer().map(|buffer| NativeHandle(vk::Handle::as_raw(buffer)))
    }

    fn initialize_resource(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.resource.is_some() {
            return Ok(());
        }

        let mut descriptor = self.descriptor.clone();
        if !descriptor.host_visible {
            descriptor.usage |= BufferUsage::TRANSFER_DST;
        }
        let mut resource = BufferResource::new(self.context.clone(), self.discard_queue.clone(), descriptor)?;
        self.upload(&mut resource, 0, &state.shadow)?;

        prism_trace!(LOG_SOURCE, "Realized {} byte buffer {:?}", self.descriptor.size, resource.handle());
        state.resource = Some(resource);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.descriptor.size
    }

    fn read_host_memory(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let state = self.lock()?;
        let start = offset as usize;
        let src = start
            .checked_add(dst.len())
            .and_then(|end| state.shadow.get(start..end))
            .ok_or_else(|| Error::InvalidResource(format!(
                "Read of {} bytes at offset {} exceeds buffer size {}",
                dst.len(), offset, self.descriptor.size
            )))?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
