//! Persistence adapters for the chain. Both implement
//! [`proofchain_core::ChainStore`].

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
