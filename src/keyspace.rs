//! Keyspace encodings for partition map keys.
//!
//! A table's keyspace type governs both how a human-facing key is turned into
//! the byte string stored in the metadata file and how two such byte strings
//! compare against each other.

use std::cmp::Ordering;

use crate::errors::{CoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyspaceType {
    /// Keys compare by byte-lexicographic order; encoding is the identity.
    String = 0,
    /// Keys are 8-byte little-endian unsigned integers; compares numerically.
    Uint64 = 1,
}

impl TryFrom<u8> for KeyspaceType {
    type Error = CoreError;

    fn try_from(v: u8) -> Result<KeyspaceType> {
        match v {
            0 => Ok(KeyspaceType::String),
            1 => Ok(KeyspaceType::Uint64),
            other => crate::bail!(CoreError::IoError, "unknown keyspace type tag {}", other),
        }
    }
}

/// Encode a human-facing key (e.g. a decimal string for `Uint64` keyspaces)
/// into the byte string used for storage and comparison. An empty `Uint64`
/// key encodes as zero; a non-empty key that fails to parse is a
/// `RuntimeError`, not a silent zero — the caller is expected to skip that
/// replica/request and retry, per the replication error-handling policy.
pub fn encode_partition_key(keyspace: KeyspaceType, key: &str) -> Result<Vec<u8>> {
    match keyspace {
        KeyspaceType::String => Ok(key.as_bytes().to_vec()),
        KeyspaceType::Uint64 => {
            if key.is_empty() {
                return Ok(0u64.to_le_bytes().to_vec());
            }
            let v: u64 = match key.parse() {
                Ok(v) => v,
                Err(_) => crate::bail!(CoreError::RuntimeError, "invalid partition key: >{}<", key),
            };
            Ok(v.to_le_bytes().to_vec())
        }
    }
}

/// Inverse of [`encode_partition_key`]. Malformed or mis-sized input decodes
/// to the zero value rather than erroring — partition keys are opaque byte
/// strings and a garbled one is not fatal to a lookup.
pub fn decode_partition_key(keyspace: KeyspaceType, bytes: &[u8]) -> String {
    match keyspace {
        KeyspaceType::String => String::from_utf8_lossy(bytes).into_owned(),
        KeyspaceType::Uint64 => decode_uint64_key(bytes).to_string(),
    }
}

fn decode_uint64_key(bytes: &[u8]) -> u64 {
    if bytes.len() != 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Compare two already-encoded partition keys under the given keyspace.
pub fn compare_partition_keys(keyspace: KeyspaceType, a: &[u8], b: &[u8]) -> Ordering {
    match keyspace {
        KeyspaceType::String => a.cmp(b),
        KeyspaceType::Uint64 => decode_uint64_key(a).cmp(&decode_uint64_key(b)),
    }
}
