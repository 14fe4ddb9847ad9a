//! Reference provider implementations.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryNetwork, MemoryPeer, MemoryPeerFactory};
pub use sqlite::{SqliteFactory, SqlitePersistence};
