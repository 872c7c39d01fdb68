//! Remote persistence implementations shipped with the crate

mod memory;

pub use memory::MemoryPersistence;
