/// Discard module - deferred GPU object destruction

pub mod discard_queue;

pub use discard_queue::*;
