//! Narrow collaborator interfaces the replication protocol is built against.
//! Production implementations live in the service that embeds this crate —
//! cluster membership, durable replication-state storage and the on-disk
//! LSM table format are all out of scope here.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::Result;
use crate::metadata_file::PartitionId;

/// One replica of a partition, as resolved from cluster configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaRef {
    /// Stable identity for this replica, used as the key into
    /// [`ReplicationState`]. Typically `{server_id}:{placement_id}`.
    pub unique_id: String,
    /// `host:port` to POST replication batches to.
    pub addr: String,
    pub is_local: bool,
}

/// Resolves which replicas a partition's records must be copied to. Backed,
/// in a real deployment, by a cluster configuration directory.
pub trait ReplicationScheme: Send + Sync {
    fn replicas_for(&self, partition_id: &PartitionId) -> Vec<ReplicaRef>;
}

/// Per-replica last-acknowledged LSM sequence number for one partition.
#[derive(Clone, Debug, Default)]
pub struct ReplicationState(HashMap<String, u64>);

impl ReplicationState {
    pub fn ack_for(&self, unique_id: &str) -> u64 {
        self.0.get(unique_id).copied().unwrap_or(0)
    }

    pub fn set_ack(&mut self, unique_id: &str, sequence: u64) {
        self.0.insert(unique_id.to_string(), sequence);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }
}

/// Durable storage for a partition's replication bookkeeping. One writer per
/// partition owns this; replication reads and writes it under its own lock.
pub trait PartitionWriter: Send + Sync {
    fn fetch_replication_state(&self) -> ReplicationState;
    fn commit_replication_state(&self, state: &ReplicationState) -> Result<()>;
}

/// A single record read back out of an LSM table during replication.
pub struct LsmRecord {
    pub record_id: PartitionId,
    pub record_version: u64,
    /// Record re-encoded against the partition's current schema, ready to go
    /// on the wire.
    pub payload: Vec<u8>,
}

/// Random-access view over one LSM table's append-ordered rows. Reading the
/// sequence number is cheap; materializing the full row is not, so callers
/// check the sequence before deciding whether to materialize or skip.
pub trait LsmTableReader: Send {
    fn num_rows(&self) -> usize;
    fn sequence_at(&mut self, row: usize) -> Result<u64>;
    fn read_at(&mut self, row: usize) -> Result<LsmRecord>;
    /// Explicitly mark a row as not needed, for readers that track cursor
    /// state and need every row visited exactly once.
    fn skip_record(&mut self, row: usize);
}

pub trait LsmTableOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LsmTableReader>>;
}
