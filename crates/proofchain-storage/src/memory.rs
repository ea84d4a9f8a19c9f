use anyhow::Result;
use parking_lot::Mutex;
use proofchain_core::{ChainState, ChainStore};

/// Keeps the last saved state in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<ChainState>>,
    saves: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> u64 {
        *self.saves.lock()
    }
}

impl ChainStore for MemoryStore {
    fn load(&self) -> Result<Option<ChainState>> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &ChainState) -> Result<()> {
        *self.state.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}
