//! On-disk metadata file: a versioned binary encoding of a table's partition
//! map, plus the binary-search lookups used to route keys to partitions.

use std::cmp::Ordering;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use sha1::{Digest, Sha1};

use crate::errors::{CoreError, Result};
use crate::keyspace::{compare_partition_keys, KeyspaceType};
use crate::varint::{read_lenenc, read_varu, write_lenenc, write_varu};

pub const CURRENT_FORMAT_VERSION: u32 = 3;

/// Set when the partition map is finite, i.e. every entry carries an `end`
/// bound rather than extending to the right edge of the keyspace.
pub const FLAG_FINITE: u64 = 1;

pub type PartitionId = [u8; 20];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlacement {
    pub server_id: String,
    pub placement_id: u64,
}

/// State of an in-progress partition split. Modeled as a field on the parent
/// entry rather than a bare "is splitting" flag plus loose fields, since the
/// two sub-partitions and their server lists only ever make sense together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitState {
    pub split_point: Vec<u8>,
    pub split_partition_id_low: PartitionId,
    pub split_partition_id_high: PartitionId,
    pub split_servers_low: Vec<PartitionPlacement>,
    pub split_servers_high: Vec<PartitionPlacement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionMapEntry {
    pub begin: Vec<u8>,
    /// Present only when the owning file has the `FLAG_FINITE` flag set.
    pub end: Option<Vec<u8>>,
    pub partition_id: PartitionId,
    pub servers: Vec<PartitionPlacement>,
    pub servers_joining: Vec<PartitionPlacement>,
    pub servers_leaving: Vec<PartitionPlacement>,
    pub split: Option<SplitState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataFile {
    pub flags: u64,
    pub transaction_id: PartitionId,
    pub transaction_seq: u64,
    pub keyspace_type: KeyspaceType,
    pub partition_map: Vec<PartitionMapEntry>,
}

impl MetadataFile {
    pub fn new(
        transaction_id: PartitionId,
        transaction_seq: u64,
        keyspace_type: KeyspaceType,
        partition_map: Vec<PartitionMapEntry>,
    ) -> MetadataFile {
        let flags = if partition_map.iter().all(|e| e.end.is_some()) && !partition_map.is_empty() {
            FLAG_FINITE
        } else {
            0
        };
        MetadataFile {
            flags,
            transaction_id,
            transaction_seq,
            keyspace_type,
            partition_map,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.flags & FLAG_FINITE != 0
    }

    pub fn encode<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<BigEndian>(CURRENT_FORMAT_VERSION)?;
        write_varu(out, self.flags)?;
        out.write_all(&self.transaction_id)?;
        out.write_u64::<BigEndian>(self.transaction_seq)?;
        out.write_u8(self.keyspace_type as u8)?;
        write_varu(out, self.partition_map.len() as u64)?;
        let finite = self.is_finite();
        for entry in &self.partition_map {
            write_lenenc(out, &entry.begin)?;
            if finite {
                write_lenenc(out, entry.end.as_deref().unwrap_or(&[]))?;
            }
            out.write_all(&entry.partition_id)?;
            encode_server_list(out, &entry.servers)?;
            encode_server_list(out, &entry.servers_joining)?;
            encode_server_list(out, &entry.servers_leaving)?;
            out.write_u8(entry.split.is_some() as u8)?;
            if let Some(split) = &entry.split {
                write_lenenc(out, &split.split_point)?;
                out.write_all(&split.split_partition_id_low)?;
                out.write_all(&split.split_partition_id_high)?;
                encode_server_list(out, &split.split_servers_low)?;
                encode_server_list(out, &split.split_servers_high)?;
            }
        }
        Ok(())
    }

    pub fn decode<R: Read>(input: &mut R) -> Result<MetadataFile> {
        let version = input.read_u32::<BigEndian>()?;
        crate::ensure!(
            version >= 1 && version <= CURRENT_FORMAT_VERSION,
            CoreError::IoError,
            "unsupported metadata file format version {}",
            version
        );
        let flags = if version >= 3 { read_varu(input)? } else { 0 };
        let mut transaction_id = [0u8; 20];
        input.read_exact(&mut transaction_id)?;
        let transaction_seq = input.read_u64::<BigEndian>()?;
        let keyspace_type = KeyspaceType::try_from(input.read_u8()?)?;
        let finite = flags & FLAG_FINITE != 0;

        let num_entries = read_varu(input)? as usize;
        let mut partition_map = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let begin = read_lenenc(input)?;
            let end = if finite { Some(read_lenenc(input)?) } else { None };
            let mut partition_id = [0u8; 20];
            input.read_exact(&mut partition_id)?;
            let servers = decode_server_list(version, input)?;
            let servers_joining = decode_server_list(version, input)?;
            let servers_leaving = decode_server_list(version, input)?;
            let splitting = input.read_u8()? > 0;
            let split = if !splitting {
                None
            } else if version == 1 {
                // v1 wrote a single split point and two plain server lists with
                // no sub-partition ids; there is no way to recover those here.
                let _legacy_split_point = read_lenenc(input)?;
                decode_server_list(version, input)?;
                decode_server_list(version, input)?;
                None
            } else {
                let split_point = read_lenenc(input)?;
                let mut split_partition_id_low = [0u8; 20];
                input.read_exact(&mut split_partition_id_low)?;
                let mut split_partition_id_high = [0u8; 20];
                input.read_exact(&mut split_partition_id_high)?;
                let split_servers_low = decode_server_list(version, input)?;
                let split_servers_high = decode_server_list(version, input)?;
                Some(SplitState {
                    split_point,
                    split_partition_id_low,
                    split_partition_id_high,
                    split_servers_low,
                    split_servers_high,
                })
            };
            partition_map.push(PartitionMapEntry {
                begin,
                end,
                partition_id,
                servers,
                servers_joining,
                servers_leaving,
                split,
            });
        }

        Ok(MetadataFile {
            flags,
            transaction_id,
            transaction_seq,
            keyspace_type,
            partition_map,
        })
    }

    pub fn compute_checksum(&self) -> Result<PartitionId> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        let digest = hasher.finalize();
        let mut checksum = [0u8; 20];
        checksum.copy_from_slice(digest.as_slice());
        Ok(checksum)
    }

    /// Binary-search for the entry whose `begin` key is the largest one not
    /// greater than `key`. Returns `None` only when the map is empty.
    pub fn lookup_index(&self, key: &[u8]) -> Option<usize> {
        if self.partition_map.is_empty() {
            return None;
        }
        let mut low = 0usize;
        let mut high = self.partition_map.len() - 1;
        while low != high {
            let mid = (low + high + 1) / 2;
            match compare_partition_keys(self.keyspace_type, &self.partition_map[mid].begin, key) {
                Ordering::Less | Ordering::Equal => low = mid,
                Ordering::Greater => high = mid.saturating_sub(1),
            }
        }
        Some(low)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&PartitionMapEntry> {
        self.lookup_index(key).map(|idx| &self.partition_map[idx])
    }

    /// The entry that owns `key`, or `None` if the map is finite and `key`
    /// falls past the last entry's `end` bound (or below the first entry's
    /// `begin`, or the map is empty, or `key` itself is empty).
    pub fn get_partition_map_at(&self, key: &[u8]) -> Option<&PartitionMapEntry> {
        if key.is_empty() {
            return None;
        }
        let idx = self.lookup_index(key)?;
        let entry = &self.partition_map[idx];
        if !self.is_finite() {
            return Some(entry);
        }
        let begin_le_key = compare_partition_keys(self.keyspace_type, &entry.begin, key) != Ordering::Greater;
        let end = entry.end.as_deref().unwrap_or(&[]);
        let key_lt_end = compare_partition_keys(self.keyspace_type, end, key) == Ordering::Greater;
        if begin_le_key && key_lt_end {
            Some(entry)
        } else {
            None
        }
    }

    /// First index whose entry may intersect `[begin, ..)`. An empty `begin`
    /// or an empty map map to the start of the map.
    ///
    /// Non-FINITE entries have no `end` bound and are modeled as extending to
    /// the right edge of the keyspace (`end = +∞`), so the entry found by
    /// `lookup_index` always qualifies. This differs from treating a missing
    /// `end` as the empty string, which would make a non-FINITE lookup always
    /// roll over to the next entry — the `Option<Vec<u8>>` typing here removes
    /// that ambiguity rather than reproducing it.
    pub fn range_begin_index(&self, begin: &[u8]) -> usize {
        if begin.is_empty() || self.partition_map.is_empty() {
            return 0;
        }
        let idx = self.lookup_index(begin).unwrap();
        match &self.partition_map[idx].end {
            Some(end) if compare_partition_keys(self.keyspace_type, end, begin) != Ordering::Greater => idx + 1,
            _ => idx,
        }
    }

    /// First index past the last entry that may intersect `(.., end)`. An
    /// empty `end` or an empty map map to the end of the map.
    pub fn range_end_index(&self, end: &[u8]) -> usize {
        if end.is_empty() || self.partition_map.is_empty() {
            return self.partition_map.len();
        }
        let idx = self.lookup_index(end).unwrap();
        if compare_partition_keys(self.keyspace_type, &self.partition_map[idx].begin, end) != Ordering::Less {
            idx
        } else {
            idx + 1
        }
    }

    /// Entries intersecting the half-open range `[begin, end)`. An empty
    /// `begin`/`end` means "unbounded on that side".
    pub fn range(&self, begin: &[u8], end: &[u8]) -> &[PartitionMapEntry] {
        let len = self.partition_map.len();
        let from = self.range_begin_index(begin).min(len);
        let to = self.range_end_index(end).max(from).min(len);
        &self.partition_map[from..to]
    }
}

fn encode_server_list<W: Write>(out: &mut W, servers: &[PartitionPlacement]) -> Result<()> {
    write_varu(out, servers.len() as u64)?;
    for server in servers {
        write_lenenc(out, server.server_id.as_bytes())?;
        out.write_u64::<BigEndian>(server.placement_id)?;
    }
    Ok(())
}

fn decode_server_list<R: Read>(version: u32, input: &mut R) -> Result<Vec<PartitionPlacement>> {
    let count = read_varu(input)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let server_id = match String::from_utf8(read_lenenc(input)?) {
            Ok(id) => id,
            Err(err) => crate::bail!(CoreError::IoError, "malformed server_id: {}", err),
        };
        let raw_placement_id = input.read_u64::<BigEndian>()?;
        // v1 files wrote the same field but it did not carry a placement id;
        // keep reading it off the wire to stay aligned, just don't trust it.
        let placement_id = if version >= 2 { raw_placement_id } else { 0 };
        out.push(PartitionPlacement { server_id, placement_id });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::encode_partition_key;

    fn placement(id: &str) -> PartitionPlacement {
        PartitionPlacement { server_id: id.to_string(), placement_id: 1 }
    }

    fn entry(begin: &[u8], end: Option<&[u8]>, pid: u8) -> PartitionMapEntry {
        PartitionMapEntry {
            begin: begin.to_vec(),
            end: end.map(|e| e.to_vec()),
            partition_id: [pid; 20],
            servers: vec![placement("s1"), placement("s2")],
            servers_joining: vec![],
            servers_leaving: vec![],
            split: None,
        }
    }

    #[test]
    fn round_trips_finite_string_keyspace() {
        let file = MetadataFile::new(
            [7; 20],
            42,
            KeyspaceType::String,
            vec![
                entry(b"", Some(b"m"), 1),
                entry(b"m", Some(b"z"), 2),
            ],
        );
        assert!(file.is_finite());
        let mut buf = Vec::new();
        file.encode(&mut buf).unwrap();
        let decoded = MetadataFile::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn round_trips_infinite_uint64_keyspace_with_split() {
        let mut e = entry(&encode_partition_key(KeyspaceType::Uint64, "0").unwrap(), None, 3);
        e.split = Some(SplitState {
            split_point: encode_partition_key(KeyspaceType::Uint64, "50").unwrap(),
            split_partition_id_low: [9; 20],
            split_partition_id_high: [10; 20],
            split_servers_low: vec![placement("s1")],
            split_servers_high: vec![placement("s2")],
        });
        let file = MetadataFile::new([1; 20], 1, KeyspaceType::Uint64, vec![e]);
        assert!(!file.is_finite());
        let mut buf = Vec::new();
        file.encode(&mut buf).unwrap();
        let decoded = MetadataFile::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(99).unwrap();
        let err = MetadataFile::decode(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CoreError::IoError(_)));
    }

    #[test]
    fn decodes_version_1_discarding_placement_ids_and_split_detail() {
        // Hand-roll a v1 payload: no flags varint, no per-entry `end`, a
        // splitting entry whose split detail cannot be represented in v3.
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(1).unwrap();
        buf.write_all(&[2; 20]).unwrap();
        buf.write_u64::<BigEndian>(5).unwrap();
        buf.write_u8(KeyspaceType::String as u8).unwrap();
        write_varu(&mut buf, 1).unwrap();
        write_lenenc(&mut buf, b"a").unwrap();
        buf.write_all(&[1; 20]).unwrap();
        // servers (v1: server_id + 8 raw bytes, no real placement id)
        write_varu(&mut buf, 1).unwrap();
        write_lenenc(&mut buf, b"s1").unwrap();
        buf.write_u64::<BigEndian>(0).unwrap();
        // servers_joining / servers_leaving: empty
        write_varu(&mut buf, 0).unwrap();
        write_varu(&mut buf, 0).unwrap();
        // splitting = true, legacy payload
        buf.write_u8(1).unwrap();
        write_lenenc(&mut buf, b"m").unwrap();
        write_varu(&mut buf, 0).unwrap();
        write_varu(&mut buf, 0).unwrap();

        let decoded = MetadataFile::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded.flags, 0);
        assert!(!decoded.is_finite());
        assert_eq!(decoded.partition_map.len(), 1);
        assert_eq!(decoded.partition_map[0].servers[0].placement_id, 0);
        assert!(decoded.partition_map[0].split.is_none());
    }

    #[test]
    fn lookup_binary_search_picks_containing_entry() {
        let file = MetadataFile::new(
            [0; 20],
            1,
            KeyspaceType::String,
            vec![
                entry(b"", Some(b"d"), 1),
                entry(b"d", Some(b"m"), 2),
                entry(b"m", Some(b"z"), 3),
            ],
        );
        assert_eq!(file.lookup(b"a").unwrap().partition_id, [1; 20]);
        assert_eq!(file.lookup(b"d").unwrap().partition_id, [2; 20]);
        assert_eq!(file.lookup(b"x").unwrap().partition_id, [3; 20]);
    }

    #[test]
    fn get_partition_map_at_misses_past_finite_bound() {
        let file = MetadataFile::new(
            [0; 20],
            1,
            KeyspaceType::String,
            vec![entry(b"a", Some(b"m"), 1)],
        );
        assert!(file.get_partition_map_at(b"z").is_none());
        assert!(file.get_partition_map_at(b"").is_none());
        assert!(file.get_partition_map_at(b"a").is_some());
    }

    #[test]
    fn get_partition_map_at_never_misses_when_not_finite() {
        let file = MetadataFile::new(
            [0; 20],
            1,
            KeyspaceType::Uint64,
            vec![entry(&encode_partition_key(KeyspaceType::Uint64, "0").unwrap(), None, 1)],
        );
        let huge = encode_partition_key(KeyspaceType::Uint64, &u64::MAX.to_string()).unwrap();
        assert!(file.get_partition_map_at(&huge).is_some());
    }

    #[test]
    fn range_covers_whole_map_when_unbounded() {
        let file = MetadataFile::new(
            [0; 20],
            1,
            KeyspaceType::String,
            vec![
                entry(b"", Some(b"d"), 1),
                entry(b"d", Some(b"m"), 2),
                entry(b"m", Some(b"z"), 3),
            ],
        );
        assert_eq!(file.range(b"", b"").len(), 3);
        assert_eq!(file.range(b"d", b"m").len(), 1);
        assert_eq!(file.range(b"c", b"n").len(), 3);
    }

    #[test]
    fn round_trips_through_a_file_on_disk() {
        let file = MetadataFile::new(
            [3; 20],
            9,
            KeyspaceType::String,
            vec![entry(b"", Some(b"m"), 1), entry(b"m", Some(b"z"), 2)],
        );
        let checksum = file.compute_checksum().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0000000009.mfile");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            file.encode(&mut f).unwrap();
        }
        let mut f = std::fs::File::open(&path).unwrap();
        let reloaded = MetadataFile::decode(&mut f).unwrap();
        assert_eq!(reloaded, file);
        assert_eq!(reloaded.compute_checksum().unwrap(), checksum);
    }
}
