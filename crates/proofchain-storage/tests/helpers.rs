#![allow(dead_code)]

use std::fs;

use proofchain_core::{Chain, LedgerConfig};
use proofchain_storage::SledStore;
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Proof checks off, so blocks can be appended without mining.
pub fn unchecked_config() -> LedgerConfig {
    LedgerConfig {
        require_proof: false,
        ..LedgerConfig::default()
    }
}

pub fn chain_with_blocks(count: usize) -> Chain {
    let mut chain = Chain::new(unchecked_config()).expect("genesis");
    for i in 0..count {
        let node = format!("node-{}", i % 3);
        chain
            .add_block(&format!("{i:x}"), json!({ "n": i }), &node)
            .expect("unchecked block");
    }
    chain
}
