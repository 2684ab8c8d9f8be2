/*!
# Prism Graphics

Backend-agnostic draw-state resolution and GPU resource lifetime management.

This crate sits beneath a retained-mode scene renderer. It turns an
API-agnostic description of draw state into calls on a concrete graphics
backend, and tracks native GPU objects whose destruction must wait until the
GPU is done with them. Backend implementations (Vulkan, ...) live in plugin
crates and plug in through two traits.

## Architecture

- **Context**: accumulates bindings and a pending pipeline, resolves them in a
  fixed order on `flush`
- **BindingSlots**: sparse per-kind binding tables
- **Pipeline**: immutable fixed-function snapshot, stored in a keyed arena
- **ImageResource / BufferResource**: owned native objects with immediate or
  deferred destruction
- **DiscardQueue**: FIFO of destruction closures drained at a safe point
- **Backend**: leaf calls a Context resolves into
- **DeviceLayer**: native object creation/destruction used by resource handles
*/

// Internal modules
mod error;
mod graphics;
pub mod log;
pub mod backend;
pub mod pipeline;
pub mod resource;
pub mod discard;
pub mod context;

#[cfg(test)]
pub(crate) mod mock;

// Main prism namespace module
pub mod prism {
    // Error types
    pub use crate::error::{BindingKind, Error, Result};

    // Process-wide façade (logger)
    pub use crate::graphics::Graphics;

    // Core entry points
    pub use crate::context::Context;
    pub use crate::discard::DiscardQueue;
    pub use crate::backend::Backend;
    pub use crate::resource::DeviceLayer;

    // Logging sub-module (types only, macros are exported at crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    pub mod backend {
        pub use crate::backend::*;
    }

    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod discard {
        pub use crate::discard::*;
    }

    pub mod context {
        pub use crate::context::*;
    }
}
