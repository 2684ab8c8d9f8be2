/// Owned native image plus its descriptive metadata
///
/// An `ImageResource` either creates its image through the device layer or
/// wraps one supplied from outside. Owned images are destroyed exactly once:
/// synchronously with `destroy_now`, or deferred through the discard queue
/// with `on_destroy` (which `Drop` calls).

use std::sync::Arc;
use crate::error::Result;
use crate::discard::DiscardQueue;
use crate::prism_trace;
use crate::resource::device_layer::{DeviceLayer, DestroyOutcome, NativeObject};
use crate::resource::format::{
    AspectFlags, Format, ImageDescriptor, ImageTiling, ImageType, ImageUsage,
    ResourceLayout, SampleCount,
};

pub struct ImageResource<D: DeviceLayer> {
    device: Arc<D>,
    discard_queue: Arc<DiscardQueue>,
    descriptor: ImageDescriptor,
    native: NativeObject<D::Image, D::Memory>,
    layout: ResourceLayout,
    /// Derived from the format once, at construction
    aspect: AspectFlags,
}

impl<D: DeviceLayer> ImageResource<D> {
    /// Create a new image on the device
    pub fn new(
        device: Arc<D>,
        discard_queue: Arc<DiscardQueue>,
        descriptor: ImageDescriptor,
    ) -> Result<Self> {
        let (handle, memory) = device.create_image(&descriptor)?;
        let aspect = descriptor.format.aspect_flags();
        let layout = descriptor.initial_layout;

        Ok(Self {
            device,
            discard_queue,
            descriptor,
            native: NativeObject::Owned { handle, memory },
            layout,
            aspect,
        })
    }

    /// Wrap an image owned by someone else (e.g. a swapchain image)
    ///
    /// The wrapped image is never destroyed by this handle.
    pub fn from_external(
        device: Arc<D>,
        discard_queue: Arc<DiscardQueue>,
        image: D::Image,
        descriptor: ImageDescriptor,
    ) -> Self {
        let aspect = descriptor.format.aspect_flags();
        let layout = descriptor.initial_layout;

        Self {
            device,
            discard_queue,
            descriptor,
            native: NativeObject::External(image),
            layout,
            aspect,
        }
    }

    // ===== ACCESSORS =====

    /// Native image, or None once released
    pub fn handle(&self) -> Option<D::Image> {
        self.native.handle()
    }

    /// Backing memory (owned images only)
    pub fn memory(&self) -> Option<&D::Memory> {
        self.native.memory()
    }

    pub fn is_externally_owned(&self) -> bool {
        self.native.is_external()
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.extent.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.extent.height
    }

    pub fn depth(&self) -> u32 {
        self.descriptor.extent.depth
    }

    pub fn layer_count(&self) -> u32 {
        self.descriptor.array_layers
    }

    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_levels
    }

    pub fn format(&self) -> Format {
        self.descriptor.format
    }

    pub fn image_type(&self) -> ImageType {
        self.descriptor.image_type
    }

    pub fn tiling(&self) -> ImageTiling {
        self.descriptor.tiling
    }

    pub fn usage(&self) -> ImageUsage {
        self.descriptor.usage
    }

    pub fn sample_count(&self) -> SampleCount {
        self.descriptor.samples
    }

    pub fn aspect_flags(&self) -> AspectFlags {
        self.aspect
    }

    /// Layout the image was last transitioned to
    pub fn layout(&self) -> ResourceLayout {
        self.layout
    }

    /// Record a layout transition (the barrier itself is recorded by the caller)
    pub fn set_layout(&mut self, layout: ResourceLayout) {
        self.layout = layout;
    }

    // ===== DESTRUCTION =====

    /// Destroy the image immediately
    ///
    /// Only valid when no GPU work can still reference it. No-op for
    /// external or already released images.
    pub fn destroy_now(&mut self) {
        if let Some((image, memory)) = self.native.take_owned() {
            prism_trace!("prism::ImageResource", "Destroying image {:?} now", image);
            self.device.destroy_image(image, memory);
        }
    }

    /// Hand the image to the discard queue
    pub fn on_destroy(&mut self) -> DestroyOutcome {
        if self.native.is_external() {
            return DestroyOutcome::NotOwned;
        }
        match self.native.take_owned() {
            Some((image, memory)) => {
                let device = self.device.clone();
                self.discard_queue.enqueue(move || device.destroy_image(image, memory));
                DestroyOutcome::Deferred
            }
            None => DestroyOutcome::AlreadyReleased,
        }
    }
}

impl<D: DeviceLayer> Drop for ImageResource<D> {
    fn drop(&mut self) {
        self.on_destroy();
    }
}

#[cfg(test)]
#[path = "image_resource_tests.rs"]
mod tests;
