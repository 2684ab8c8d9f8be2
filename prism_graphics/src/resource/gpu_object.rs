/// Bindable GPU object traits
///
/// These are the objects a Context binds and resolves at flush time.
/// Backends implement them; the Context only ever holds `Arc<dyn ...>`
/// references and never destroys them.

use crate::error::Result;

/// Opaque backend object handle (Vulkan handles are `u64` as raw values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    /// The null handle
    pub const NULL: Self = Self(0);

    /// Whether this is the null handle
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Texture that can be bound on a texture unit
///
/// The backend object may not exist yet: creation is deferred until the
/// texture is first needed by a draw (`initialize_resource`).
pub trait Texture: Send + Sync {
    /// Backend object, or None while the texture is not realized
    fn native_handle(&self) -> Option<NativeHandle>;

    /// Whether the backend object exists
    fn is_realized(&self) -> bool {
        self.native_handle().is_some()
    }

    /// Create the backend object (no-op when already realized)
    fn initialize_resource(&self) -> Result<()>;

    /// Hook run after the texture was bound for a draw
    ///
    /// Used by textures that must finish pending uploads or layout
    /// transitions before sampling.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }
}

/// Sampler paired with a texture binding
pub trait Sampler: Send + Sync {
    fn native_handle(&self) -> NativeHandle;
}

/// Buffer usable as vertex, index or uniform source
pub trait Buffer: Send + Sync {
    /// Backend object, or None while the buffer is not realized
    fn native_handle(&self) -> Option<NativeHandle>;

    /// Whether the backend object exists
    fn is_realized(&self) -> bool {
        self.native_handle().is_some()
    }

    /// Create the backend object (no-op when already realized)
    fn initialize_resource(&self) -> Result<()>;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Copy `dst.len()` bytes of host-visible content starting at `offset`
    ///
    /// Standalone uniforms are read through this at flush time.
    fn read_host_memory(&self, offset: u64, dst: &mut [u8]) -> Result<()>;
}
