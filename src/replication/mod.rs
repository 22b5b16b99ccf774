//! LSM partition replication: streams committed records from a partition's
//! local LSM tables to its remote replicas over HTTP.

pub mod interfaces;
pub mod snapshot;
pub mod wire;
pub mod worker;

use crate::errors::{CoreError, Result};
use crate::observability::metrics;

pub use interfaces::{LsmRecord, LsmTableOpener, LsmTableReader, PartitionWriter, ReplicaRef, ReplicationScheme, ReplicationState};
pub use snapshot::{LsmTableRef, PartitionSnapshot, PartitionState};
pub use wire::{RecordEnvelope, RecordEnvelopeList, ReplicationTransport};

/// A batch is flushed once its payload exceeds this many bytes...
pub const MAX_BATCH_SIZE_BYTES: usize = 50 * 1024 * 1024;
/// ...or once it holds more than this many records, whichever comes first.
pub const MAX_BATCH_SIZE_RECORDS: usize = 8192;

pub struct LsmPartitionReplication<S, W, O, T> {
    snap: PartitionSnapshot,
    repl_scheme: S,
    writer: W,
    table_opener: O,
    transport: T,
}

impl<S, W, O, T> LsmPartitionReplication<S, W, O, T>
where
    S: ReplicationScheme,
    W: PartitionWriter,
    O: LsmTableOpener,
    T: ReplicationTransport,
{
    pub fn new(snap: PartitionSnapshot, repl_scheme: S, writer: W, table_opener: O, transport: T) -> Self {
        LsmPartitionReplication { snap, repl_scheme, writer, table_opener, transport }
    }

    fn remote_replicas(&self) -> Vec<ReplicaRef> {
        self.repl_scheme
            .replicas_for(&self.snap.partition_id)
            .into_iter()
            .filter(|r| !r.is_local)
            .collect()
    }

    /// Whether any remote replica has not yet acked up to the current head.
    pub fn needs_replication(&self) -> bool {
        let replicas = self.remote_replicas();
        if replicas.is_empty() {
            return false;
        }
        let state = self.writer.fetch_replication_state();
        let head = self.snap.state.lsm_sequence;
        replicas.iter().any(|r| state.ack_for(&r.unique_id) < head)
    }

    /// Count of remote replicas fully caught up to the current head.
    pub fn num_full_remote_copies(&self) -> usize {
        let replicas = self.remote_replicas();
        let state = self.writer.fetch_replication_state();
        let head = self.snap.state.lsm_sequence;
        replicas.iter().filter(|r| state.ack_for(&r.unique_id) >= head).count()
    }

    /// Replicate to every lagging remote replica. A failure on one replica
    /// does not stop the others; the return value is `false` if any replica
    /// failed, so the caller's scheduler retries on the next tick.
    pub async fn replicate(&self) -> Result<bool> {
        let replicas = self.remote_replicas();
        if replicas.is_empty() {
            return Ok(true);
        }
        let mut state = self.writer.fetch_replication_state();
        let head = self.snap.state.lsm_sequence;
        let mut dirty = false;
        let mut success = true;

        for replica in &replicas {
            let acked = state.ack_for(&replica.unique_id);
            if acked >= head {
                continue;
            }
            log::debug!(
                "replicating {}/{} partition {} to {} ({} records behind)",
                self.snap.state.tsdb_namespace,
                self.snap.state.table_name,
                hex::encode(self.snap.partition_id),
                replica.addr,
                head - acked,
            );
            match self.replicate_to(replica, acked).await {
                Ok(()) => {
                    state.set_ack(&replica.unique_id, head);
                    dirty = true;
                }
                Err(err) => {
                    success = false;
                    metrics::REPLICATION_FAILURES.inc();
                    log::warn!(
                        "replication of {}/{} partition {} to {} failed: {}",
                        self.snap.state.tsdb_namespace,
                        self.snap.state.table_name,
                        hex::encode(self.snap.partition_id),
                        replica.addr,
                        err,
                    );
                }
            }
        }

        if dirty {
            self.writer.commit_replication_state(&state)?;
        }
        metrics::REPLICATION_FULL_COPIES.set(self.num_full_remote_copies() as f64);
        Ok(success)
    }

    async fn replicate_to(&self, replica: &ReplicaRef, start_sequence: u64) -> Result<()> {
        crate::ensure!(
            !replica.is_local,
            CoreError::IllegalState,
            "cannot replicate a partition to the local replica"
        );

        let batches = self.build_batches(start_sequence)?;
        for batch in &batches {
            self.transport.upload(&replica.addr, batch).await?;
            metrics::REPLICATION_BATCHES_SENT.inc();
            metrics::REPLICATION_RECORDS_SENT.inc_by(batch.records.len() as f64);
            metrics::REPLICATION_BYTES_SENT.inc_by(batch.payload_bytes() as f64);
        }
        Ok(())
    }

    /// Read every record at or past `start_sequence` and group it into
    /// upload-sized batches, in append order.
    fn build_batches(&self, start_sequence: u64) -> Result<Vec<RecordEnvelopeList>> {
        let mut batches = Vec::new();
        let mut current = RecordEnvelopeList::default();
        current.sync_commit = true;
        let mut current_bytes = 0usize;

        self.fetch_records(start_sequence, |record: LsmRecord| {
            let size = record.payload.len();
            let would_overflow = !current.records.is_empty()
                && (current_bytes + size > MAX_BATCH_SIZE_BYTES || current.records.len() >= MAX_BATCH_SIZE_RECORDS);
            if would_overflow {
                let mut next = RecordEnvelopeList::default();
                next.sync_commit = true;
                batches.push(std::mem::replace(&mut current, next));
                current_bytes = 0;
            }
            current_bytes += size;
            current.records.push(RecordEnvelope {
                tsdb_namespace: self.snap.state.tsdb_namespace.clone(),
                table_name: self.snap.state.table_name.clone(),
                partition_id: hex::encode(self.snap.partition_id),
                record_id: hex::encode(record.record_id),
                record_version: record.record_version,
                record_data: record.payload,
            });
        })?;
        if !current.records.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }

    /// Stream every record at or past `start_sequence` across all LSM tables
    /// in append order, invoking `emit` for each. Tables whose entire
    /// sequence range is below `start_sequence` are skipped without opening
    /// them.
    fn fetch_records(&self, start_sequence: u64, mut emit: impl FnMut(LsmRecord)) -> Result<()> {
        for table in &self.snap.state.lsm_tables {
            if table.last_sequence < start_sequence {
                continue;
            }
            let path = self.snap.base_path.join(format!("{}.cst", table.filename));
            let mut reader = self.table_opener.open(&path)?;
            for row in 0..reader.num_rows() {
                let sequence = reader.sequence_at(row)?;
                if sequence < start_sequence {
                    reader.skip_record(row);
                    continue;
                }
                emit(reader.read_at(row)?);
            }
        }
        Ok(())
    }
}
