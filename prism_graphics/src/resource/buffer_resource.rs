/// Owned native buffer plus its descriptor
///
/// Same lifetime rules as `ImageResource`: created through the device layer
/// or wrapped from outside, destroyed at most once.

use std::sync::Arc;
use crate::error::Result;
use crate::discard::DiscardQueue;
use crate::prism_trace;
use crate::resource::device_layer::{DeviceLayer, DestroyOutcome, NativeObject};
use crate::resource::format::{BufferDescriptor, BufferUsage};

pub struct BufferResource<D: DeviceLayer> {
    device: Arc<D>,
    discard_queue: Arc<DiscardQueue>,
    descriptor: BufferDescriptor,
    native: NativeObject<D::Buffer, D::Memory>,
}

impl<D: DeviceLayer> BufferResource<D> {
    /// Create a new buffer on the device
    pub fn new(
        device: Arc<D>,
        discard_queue: Arc<DiscardQueue>,
        descriptor: BufferDescriptor,
    ) -> Result<Self> {
        let (handle, memory) = device.create_buffer(&descriptor)?;
        Ok(Self {
            device,
            discard_queue,
            descriptor,
            native: NativeObject::Owned { handle, memory },
        })
    }

    /// Wrap a buffer owned by someone else
    pub fn from_external(
        device: Arc<D>,
        discard_queue: Arc<DiscardQueue>,
        buffer: D::Buffer,
        descriptor: BufferDescriptor,
    ) -> Self {
        Self {
            device,
            discard_queue,
            descriptor,
            native: NativeObject::External(buffer),
        }
    }

    pub fn handle(&self) -> Option<D::Buffer> {
        self.native.handle()
    }

    pub fn memory(&self) -> Option<&D::Memory> {
        self.native.memory()
    }

    /// Mutable backing memory, for writing through a host mapping
    pub fn memory_mut(&mut self) -> Option<&mut D::Memory> {
        self.native.memory_mut()
    }

    pub fn is_externally_owned(&self) -> bool {
        self.native.is_external()
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Destroy the buffer immediately (no GPU work may reference it)
    pub fn destroy_now(&mut self) {
        if let Some((buffer, memory)) = self.native.take_owned() {
            prism_trace!("prism::BufferResource", "Destroying buffer {:?} now", buffer);
            self.device.destroy_buffer(buffer, memory);
        }
    }

    /// Hand the buffer to the discard queue
    pub fn on_destroy(&mut self) -> DestroyOutcome {
        if self.native.is_external() {
            return DestroyOutcome::NotOwned;
        }
        match self.native.take_owned() {
            Some((buffer, memory)) => {
                let device = self.device.clone();
                self.discard_queue.enqueue(move || device.destroy_buffer(buffer, memory));
                DestroyOutcome::Deferred
            }
            None => DestroyOutcome::AlreadyReleased,
        }
    }
}

impl<D: DeviceLayer> Drop for BufferResource<D> {
    fn drop(&mut self) {
        self.on_destroy();
    }
}

#[cfg(test)]
#[path = "buffer_resource_tests.rs"]
mod tests;
