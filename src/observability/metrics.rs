use lazy_static::lazy_static;
use prometheus::{register_counter, register_gauge, Counter, Gauge};

lazy_static! {
    pub static ref REPLICATION_RECORDS_SENT: Counter = register_counter!(
        "replication_records_sent",
        "Number of records shipped to remote replicas"
    )
    .unwrap();
    pub static ref REPLICATION_BYTES_SENT: Counter = register_counter!(
        "replication_bytes_sent",
        "Number of payload bytes shipped to remote replicas"
    )
    .unwrap();
    pub static ref REPLICATION_BATCHES_SENT: Counter = register_counter!(
        "replication_batches_sent",
        "Number of replication batches uploaded"
    )
    .unwrap();
    pub static ref REPLICATION_FAILURES: Counter = register_counter!(
        "replication_failures",
        "Number of per-replica replication attempts that failed"
    )
    .unwrap();
    pub static ref REPLICATION_FULL_COPIES: Gauge = register_gauge!(
        "replication_full_copies",
        "Number of remote replicas caught up to the local head, as of the last replication attempt"
    )
    .unwrap();
    pub static ref METADATA_FILE_TRANSACTION_SEQ: Gauge = register_gauge!(
        "metadata_file_transaction_seq",
        "transaction_seq of the currently loaded metadata file"
    )
    .unwrap();
}
