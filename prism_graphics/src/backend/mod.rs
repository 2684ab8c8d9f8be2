/// Backend module - downstream graphics API interface

pub mod backend;

pub use backend::*;
