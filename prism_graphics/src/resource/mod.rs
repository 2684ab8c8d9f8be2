//! Resource module
//!
//! Bindable GPU object traits, formats and descriptors, and the owned
//! native resource handles with their two-phase destruction.

pub mod gpu_object;
pub mod format;
pub mod device_layer;
pub mod image_resource;
pub mod buffer_resource;

pub use gpu_object::{NativeHandle, Texture, Sampler, Buffer};
pub use format::*;
pub use device_layer::{DeviceLayer, DestroyOutcome};
pub use image_resource::ImageResource;
pub use buffer_resource::BufferResource;
