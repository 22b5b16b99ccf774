//! In-memory partition map: a many-readers/single-writer handle on the
//! current [`MetadataFile`], swapped atomically whenever a new transaction is
//! loaded from disk.

use std::sync::{Arc, RwLock};

use crate::errors::{CoreError, Result};
use crate::metadata_file::{MetadataFile, PartitionMapEntry};
use crate::observability::metrics;

/// One entry's placement, annotated with whether it names the local server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementRef {
    pub server_id: String,
    pub placement_id: u64,
    pub is_local: bool,
}

pub struct PartitionMap {
    current: RwLock<Arc<MetadataFile>>,
}

impl PartitionMap {
    pub fn new(file: MetadataFile) -> PartitionMap {
        PartitionMap { current: RwLock::new(Arc::new(file)) }
    }

    /// Snapshot of the metadata file as of this call. Readers never block a
    /// concurrent `swap`, and never observe a torn partition map.
    pub fn load(&self) -> Arc<MetadataFile> {
        self.current.read().unwrap().clone()
    }

    /// Atomically replace the current metadata file, rejecting any file whose
    /// `transaction_seq` does not move strictly forward.
    pub fn swap(&self, file: MetadataFile) -> Result<()> {
        let mut guard = self.current.write().unwrap();
        crate::ensure!(
            file.transaction_seq > guard.transaction_seq,
            CoreError::IllegalState,
            "refusing to load metadata file with transaction_seq {} onto current transaction_seq {}",
            file.transaction_seq,
            guard.transaction_seq
        );
        metrics::METADATA_FILE_TRANSACTION_SEQ.set(file.transaction_seq as f64);
        *guard = Arc::new(file);
        Ok(())
    }

    pub fn lookup(&self, key: &[u8]) -> Option<PartitionMapEntry> {
        self.load().lookup(key).cloned()
    }

    pub fn get_partition_map_at(&self, key: &[u8]) -> Option<PartitionMapEntry> {
        self.load().get_partition_map_at(key).cloned()
    }

    /// Whether `server_id` is a current or joining owner of the entry that
    /// contains `key`.
    pub fn owns_locally(&self, key: &[u8], server_id: &str) -> bool {
        match self.load().lookup(key) {
            Some(entry) => entry
                .servers
                .iter()
                .chain(entry.servers_joining.iter())
                .any(|p| p.server_id == server_id),
            None => false,
        }
    }

    /// Placements for the entry that owns `key`, each annotated with whether
    /// it names `local_server_id`.
    pub fn replicas_for(&self, key: &[u8], local_server_id: &str) -> Option<Vec<PlacementRef>> {
        let snapshot = self.load();
        let entry = snapshot.lookup(key)?;
        Some(
            entry
                .servers
                .iter()
                .map(|p| PlacementRef {
                    server_id: p.server_id.clone(),
                    placement_id: p.placement_id,
                    is_local: p.server_id == local_server_id,
                })
                .collect(),
        )
    }
}
