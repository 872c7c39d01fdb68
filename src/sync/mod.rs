//! Background synchronization with the remote store

mod sync_loop;

pub use sync_loop::{SyncLoop, SyncReport};
