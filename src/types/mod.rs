//! Core data model: content blocks, messages, usage, generation options.

pub mod content;
pub mod generation;
pub mod message;
pub mod usage;

pub use content::*;
pub use generation::*;
pub use message::*;
pub use usage::*;
