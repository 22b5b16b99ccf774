//! Wire format and transport for shipping records to a replica.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub tsdb_namespace: String,
    pub table_name: String,
    /// 40-char hex encoding of the partition id.
    pub partition_id: String,
    /// 40-char hex encoding of the record id.
    pub record_id: String,
    pub record_version: u64,
    pub record_data: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordEnvelopeList {
    pub records: Vec<RecordEnvelope>,
    pub sync_commit: bool,
}

impl RecordEnvelopeList {
    pub fn payload_bytes(&self) -> usize {
        self.records.iter().map(|r| r.record_data.len()).sum()
    }
}

/// Ships one batch to one replica. The production implementation is
/// [`HttpReplicationTransport`]; tests substitute an in-memory recorder.
pub trait ReplicationTransport: Send + Sync {
    fn upload(
        &self,
        addr: &str,
        batch: &RecordEnvelopeList,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub struct HttpReplicationTransport {
    client: reqwest::Client,
}

impl HttpReplicationTransport {
    pub fn new(client: reqwest::Client) -> HttpReplicationTransport {
        HttpReplicationTransport { client }
    }
}

impl Default for HttpReplicationTransport {
    fn default() -> HttpReplicationTransport {
        HttpReplicationTransport::new(reqwest::Client::new())
    }
}

impl ReplicationTransport for HttpReplicationTransport {
    async fn upload(&self, addr: &str, batch: &RecordEnvelopeList) -> Result<()> {
        let body = bincode::serialize(batch)
            .map_err(|err| CoreError::RuntimeError(format!("failed to encode replication batch: {err}")))?;
        let url = format!("http://{addr}/tsdb/replicate");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::HOST, addr)
            .header(reqwest::header::CONTENT_TYPE, "application/fnord-msg")
            .body(body)
            .send()
            .await
            .map_err(|err| CoreError::RuntimeError(format!("replication request to {addr} failed: {err}")))?;
        if response.status().as_u16() != 201 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::RuntimeError(format!(
                "replication upload to {addr} got status {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Test doubles for [`ReplicationTransport`]. Not `#[cfg(test)]`: integration
/// tests under `tests/` link against the normal (non-test) build of this
/// crate and would not see items gated that way.
pub mod test_support {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every batch it was asked to upload; `fail_addrs` lets tests
    /// simulate a replica that is unreachable. `uploads` is wrapped in an
    /// `Arc` so a caller can keep a handle to it after moving the transport
    /// into a `LsmPartitionReplication`.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub uploads: Arc<Mutex<Vec<(String, RecordEnvelopeList)>>>,
        pub fail_addrs: Vec<String>,
    }

    impl ReplicationTransport for RecordingTransport {
        async fn upload(&self, addr: &str, batch: &RecordEnvelopeList) -> Result<()> {
            if self.fail_addrs.iter().any(|a| a == addr) {
                return Err(CoreError::RuntimeError(format!("simulated failure for {addr}")));
            }
            self.uploads.lock().unwrap().push((addr.to_string(), batch.clone()));
            Ok(())
        }
    }
}
