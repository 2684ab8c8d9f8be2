/// Device layer - creation and destruction of native GPU objects
///
/// Resource handles call into this trait to create their native object
/// and, later, from inside a discard closure, to destroy it. The Vulkan
/// implementation lives in the plugin crate; tests use a counting mock.

use std::fmt;
use crate::error::Result;
use crate::resource::format::{BufferDescriptor, ImageDescriptor};

pub trait DeviceLayer: Send + Sync + 'static {
    /// Native image handle (e.g. `vk::Image`)
    type Image: Copy + Send + fmt::Debug + 'static;
    /// Native buffer handle (e.g. `vk::Buffer`)
    type Buffer: Copy + Send + fmt::Debug + 'static;
    /// Backing memory returned with every created object
    type Memory: Send + 'static;

    /// Create an image and bind memory to it
    fn create_image(&self, desc: &ImageDescriptor) -> Result<(Self::Image, Self::Memory)>;

    /// Destroy an image and release its memory
    fn destroy_image(&self, image: Self::Image, memory: Self::Memory);

    /// Create a buffer and bind memory to it
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<(Self::Buffer, Self::Memory)>;

    /// Destroy a buffer and release its memory
    fn destroy_buffer(&self, buffer: Self::Buffer, memory: Self::Memory);
}

/// Ownership state of a native object held by a resource handle
pub(crate) enum NativeObject<H, M> {
    /// Created by this handle; destroyed by it exactly once
    Owned { handle: H, memory: M },
    /// Supplied from outside (swapchain image, imported buffer); never destroyed here
    External(H),
    /// Already destroyed or handed to the discard queue
    Released,
}

impl<H: Copy, M> NativeObject<H, M> {
    pub(crate) fn handle(&self) -> Option<H> {
        match self {
            NativeObject::Owned { handle, .. } => Some(*handle),
            NativeObject::External(handle) => Some(*handle),
            NativeObject::Released => None,
        }
    }

    pub(crate) fn memory(&self) -> Option<&M> {
        match self {
            NativeObject::Owned { memory, .. } => Some(memory),
            _ => None,
        }
    }

    pub(crate) fn memory_mut(&mut self) -> Option<&mut M> {
        match self {
            NativeObject::Owned { memory, .. } => Some(memory),
            _ => None,
        }
    }

    pub(crate) fn is_external(&self) -> bool {
        matches!(self, NativeObject::External(_))
    }

    /// Take the owned object out, leaving `Released` (External stays as is)
    pub(crate) fn take_owned(&mut self) -> Option<(H, M)> {
        if !matches!(self, NativeObject::Owned { .. }) {
            return None;
        }
        match std::mem::replace(self, NativeObject::Released) {
            NativeObject::Owned { handle, memory } => Some((handle, memory)),
            _ => None,
        }
    }
}

/// What `on_destroy` did with the native object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// A discard entry was enqueued; destruction happens at the next drain
    Deferred,
    /// Externally owned: nothing to destroy
    NotOwned,
    /// Already destroyed (`destroy_now`) or already deferred
    AlreadyReleased,
}
