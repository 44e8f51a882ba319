//! Storage adapters.
//!
//! Adapters implement [`VfsAdapter`](super::VfsAdapter) for different storage types.

mod archive;
mod memory;
mod system;

pub use memory::MemoryAdapter;
pub use system::SystemAdapter;
