//! Read-only view of one partition's LSM state, as handed to the replication
//! protocol by the storage layer that owns the partition.

use std::path::PathBuf;

use crate::metadata_file::PartitionId;

/// One on-disk LSM table backing a partition.
#[derive(Clone, Debug)]
pub struct LsmTableRef {
    /// Table file name relative to the snapshot's `base_path`, without the
    /// `.cst` extension.
    pub filename: String,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

#[derive(Clone, Debug)]
pub struct PartitionState {
    /// Sequence number of the most recently committed record; the
    /// replication head.
    pub lsm_sequence: u64,
    pub lsm_tables: Vec<LsmTableRef>,
    pub tsdb_namespace: String,
    pub table_name: String,
}

/// A consistent, point-in-time view of a partition, taken once per
/// replication attempt so that concurrent writers can keep appending without
/// perturbing an in-flight replication pass.
#[derive(Clone)]
pub struct PartitionSnapshot {
    pub partition_id: PartitionId,
    pub base_path: PathBuf,
    pub state: PartitionState,
}
