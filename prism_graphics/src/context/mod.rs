/// Context module - draw state accumulation and flush resolution

pub mod binding_slots;
pub mod bindings;
pub mod draw_call;
pub mod config;
pub mod context;

pub use binding_slots::BindingSlots;
pub use bindings::*;
pub use draw_call::DrawCall;
pub use config::{ContextConfig, ContextStats};
pub use context::Context;
