//! Unsigned base-128 varints and length-prefixed byte strings, as used
//! throughout the metadata file and wire formats.

use std::io::{self, Read, Write};

pub fn write_varu<W: Write>(out: &mut W, mut v: u64) -> io::Result<()> {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.write_all(&[byte])?;
            return Ok(());
        }
        out.write_all(&[byte | 0x80])?;
    }
}

pub fn read_varu<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"));
        }
        let mut byte = [0u8; 1];
        input.read_exact(&mut byte)?;
        result |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Sanity bound on a single length-prefixed field. Every `lenenc` field in the
/// metadata file format (partition keys, server ids, split points) is small;
/// this catches a corrupted or adversarial length prefix before it drives an
/// allocation, rather than letting a multi-exabyte length prefix abort the
/// process.
pub const MAX_LENENC_LEN: u64 = 16 * 1024 * 1024;

pub fn write_lenenc<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_varu(out, bytes.len() as u64)?;
    out.write_all(bytes)
}

pub fn read_lenenc<R: Read>(input: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varu(input)?;
    if len > MAX_LENENC_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length-prefixed field of {len} bytes exceeds sanity bound of {MAX_LENENC_LEN}"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varu_round_trips() {
        for v in [0u64, 1, 127, 128, 300, 16384, u64::MAX] {
            let mut buf = Vec::new();
            write_varu(&mut buf, v).unwrap();
            let mut cursor = &buf[..];
            assert_eq!(read_varu(&mut cursor).unwrap(), v);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn lenenc_round_trips() {
        let mut buf = Vec::new();
        write_lenenc(&mut buf, b"hello world").unwrap();
        let mut cursor = &buf[..];
        assert_eq!(read_lenenc(&mut cursor).unwrap(), b"hello world");
    }

    #[test]
    fn lenenc_empty() {
        let mut buf = Vec::new();
        write_lenenc(&mut buf, b"").unwrap();
        let mut cursor = &buf[..];
        assert_eq!(read_lenenc(&mut cursor).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn lenenc_rejects_length_prefix_over_sanity_bound_without_allocating() {
        let mut buf = Vec::new();
        write_varu(&mut buf, MAX_LENENC_LEN + 1).unwrap();
        let mut cursor = &buf[..];
        let err = read_lenenc(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
