/// Pipeline module - immutable fixed-function snapshots and their arena

pub mod pipeline_state;
pub mod program;
pub mod pipeline;
pub mod pipeline_arena;

pub use pipeline_state::*;
pub use program::*;
pub use pipeline::*;
pub use pipeline_arena::*;
