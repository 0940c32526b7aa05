// ============================================================================
// Storage Module
// Tree abstraction, persisted key layout and record codec
// ============================================================================

pub mod codec;
pub mod keys;
pub mod tree;

pub use tree::{MemTree, Tree};
