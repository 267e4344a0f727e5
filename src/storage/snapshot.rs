//! Snapshot Codec
//!
//! Serializes the whole table to a single versioned binary file and back.
//! All integer fields are big-endian; doubles are written as the big-endian
//! IEEE-754 bit pattern so snapshots move cleanly between architectures.
//!
//! ## File Layout
//!
//! ```text
//! magic      u32   0x4B56DB02
//! version    u8 u8 u8  (major, minor, patch)
//! count      u32   number of entries
//! entry * count:
//!   key_len  u32
//!   key      key_len bytes
//!   tag      u8
//!   payload  tag-specific:
//!     null    -> nothing
//!     string  -> u32 len + bytes
//!     int64   -> u64 (two's complement)
//!     double  -> u64 (IEEE-754 bits)
//!     bool    -> u8 (0/1)
//!     binary  -> u32 len + bytes
//! ```
//!
//! Loading a path that does not exist is not an error: the destination is
//! left empty so a server can boot before its first SAVE.

use crate::storage::table::{HashTable, StoreError};
use crate::storage::value::{TypeTag, Value, ValueRef, MAX_STRING_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// File magic, written big-endian.
pub const SNAPSHOT_MAGIC: u32 = 0x4B56_DB02;

/// Format version bytes written after the magic. The loader currently reads
/// and ignores them; a major bump will become a rejection.
pub const FORMAT_MAJOR: u8 = 3;
pub const FORMAT_MINOR: u8 = 0;
pub const FORMAT_PATCH: u8 = 0;

/// Writes the full table image to `path`, truncating any existing file.
pub fn save(table: &HashTable, path: &Path) -> Result<(), StoreError> {
    let image = encode(table);
    fs::write(path, &image)?;
    info!(
        path = %path.display(),
        entries = table.len(),
        bytes = image.len(),
        "Snapshot written"
    );
    Ok(())
}

/// Clears `table` and repopulates it from the snapshot at `path`.
///
/// A missing file succeeds with the table left empty. Any decode error is
/// reported after the up-front clear, so a corrupt file never leaves stale
/// entries behind.
pub fn load(table: &mut HashTable, path: &Path) -> Result<(), StoreError> {
    let image = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot file, starting empty");
            table.clear();
            return Ok(());
        }
        Err(e) => return Err(StoreError::Io(e)),
    };

    table.clear();
    decode_into(table, &image)?;
    info!(
        path = %path.display(),
        entries = table.len(),
        "Snapshot loaded"
    );
    Ok(())
}

/// Encodes the table into its file image.
fn encode(table: &HashTable) -> BytesMut {
    let mut buf = BytesMut::with_capacity(16 + table.arena_used());

    buf.put_u32(SNAPSHOT_MAGIC);
    buf.put_u8(FORMAT_MAJOR);
    buf.put_u8(FORMAT_MINOR);
    buf.put_u8(FORMAT_PATCH);
    buf.put_u32(table.len() as u32);

    for (key, value) in table.iter() {
        buf.put_u32(key.len() as u32);
        buf.put_slice(key);
        encode_value(&mut buf, value);
    }
    buf
}

fn encode_value(buf: &mut BytesMut, value: ValueRef<'_>) {
    buf.put_u8(value.tag() as u8);
    match value {
        ValueRef::Null => {}
        ValueRef::String(data) | ValueRef::Binary(data) => {
            buf.put_u32(data.len() as u32);
            buf.put_slice(data);
        }
        ValueRef::Int64(n) => buf.put_u64(n as u64),
        ValueRef::Double(d) => buf.put_u64(d.to_bits()),
        ValueRef::Bool(b) => buf.put_u8(b as u8),
    }
}

fn decode_into(table: &mut HashTable, image: &[u8]) -> Result<(), StoreError> {
    let mut cursor = image;

    let magic = read_u32(&mut cursor)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(StoreError::BadMagic(magic));
    }

    // Version bytes are read and ignored for now.
    let _major = read_u8(&mut cursor)?;
    let _minor = read_u8(&mut cursor)?;
    let _patch = read_u8(&mut cursor)?;

    let count = read_u32(&mut cursor)?;
    for _ in 0..count {
        let key_len = read_u32(&mut cursor)? as usize;
        if key_len == 0 {
            return Err(StoreError::InvalidKey);
        }
        if key_len > MAX_STRING_SIZE {
            return Err(StoreError::TooLarge { len: key_len });
        }
        let key = read_bytes(&mut cursor, key_len)?;
        let value = decode_value(&mut cursor)?;
        table.put(&key, &value)?;
    }
    Ok(())
}

fn decode_value(cursor: &mut &[u8]) -> Result<Value, StoreError> {
    let tag_byte = read_u8(cursor)?;
    let tag = TypeTag::from_u8(tag_byte).ok_or(StoreError::UnknownTag(tag_byte))?;

    Ok(match tag {
        TypeTag::Null => Value::Null,
        TypeTag::String | TypeTag::Binary => {
            let len = read_u32(cursor)? as usize;
            if len > MAX_STRING_SIZE {
                return Err(StoreError::TooLarge { len });
            }
            let data = read_bytes(cursor, len)?;
            if tag == TypeTag::String {
                Value::String(data)
            } else {
                Value::Binary(data)
            }
        }
        TypeTag::Int64 => Value::Int64(read_u64(cursor)? as i64),
        TypeTag::Double => Value::Double(f64::from_bits(read_u64(cursor)?)),
        TypeTag::Bool => Value::Bool(read_u8(cursor)? != 0),
    })
}

fn read_u8(cursor: &mut &[u8]) -> Result<u8, StoreError> {
    if cursor.remaining() < 1 {
        return Err(StoreError::Truncated);
    }
    Ok(cursor.get_u8())
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, StoreError> {
    if cursor.remaining() < 4 {
        return Err(StoreError::Truncated);
    }
    Ok(cursor.get_u32())
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64, StoreError> {
    if cursor.remaining() < 8 {
        return Err(StoreError::Truncated);
    }
    Ok(cursor.get_u64())
}

fn read_bytes(cursor: &mut &[u8], len: usize) -> Result<Bytes, StoreError> {
    if cursor.remaining() < len {
        return Err(StoreError::Truncated);
    }
    let data = Bytes::copy_from_slice(&cursor[..len]);
    cursor.advance(len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn sample_table() -> HashTable {
        let mut table = HashTable::default();
        table.put(b"name", &Value::string("Alice")).unwrap();
        table.put(b"count", &Value::Int64(-42)).unwrap();
        table.put(b"pi", &Value::Double(3.14159)).unwrap();
        table.put(b"flag", &Value::Bool(true)).unwrap();
        table.put(b"nothing", &Value::Null).unwrap();
        table
            .put(b"blob", &Value::binary(Bytes::from_static(&[0, 255, 10, 13])))
            .unwrap();
        table.put(b"empty", &Value::string("")).unwrap();
        table
    }

    fn as_map(table: &HashTable) -> HashMap<Vec<u8>, Value> {
        table
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_owned()))
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.db");

        let source = sample_table();
        save(&source, &path).unwrap();

        let mut restored = HashTable::default();
        load(&mut restored, &path).unwrap();

        assert_eq!(as_map(&source), as_map(&restored));
    }

    #[test]
    fn test_load_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let mut table = sample_table();

        load(&mut table, &dir.path().join("absent.db")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_clears_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.db");

        let mut small = HashTable::default();
        small.put(b"only", &Value::Int64(1)).unwrap();
        save(&small, &path).unwrap();

        let mut table = sample_table();
        load(&mut table, &path).unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.contains_key(b"only"));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.db");
        fs::write(&path, [0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0]).unwrap();

        let mut table = HashTable::default();
        let err = load(&mut table, &path).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic(0xDEADBEEF)));
    }

    #[test]
    fn test_unknown_tag() {
        let mut buf = BytesMut::new();
        buf.put_u32(SNAPSHOT_MAGIC);
        buf.put_u8(FORMAT_MAJOR);
        buf.put_u8(FORMAT_MINOR);
        buf.put_u8(FORMAT_PATCH);
        buf.put_u32(1);
        buf.put_u32(1);
        buf.put_slice(b"k");
        buf.put_u8(9); // not a known tag

        let dir = tempdir().unwrap();
        let path = dir.path().join("tag.db");
        fs::write(&path, &buf).unwrap();

        let mut table = HashTable::default();
        assert!(matches!(
            load(&mut table, &path),
            Err(StoreError::UnknownTag(9))
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.db");

        let source = sample_table();
        save(&source, &path).unwrap();
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 3]).unwrap();

        let mut table = HashTable::default();
        assert!(matches!(
            load(&mut table, &path),
            Err(StoreError::Truncated)
        ));
        // The up-front clear means a corrupt file never leaves stale data.
        assert!(table.len() < source.len());
    }

    #[test]
    fn test_oversize_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(SNAPSHOT_MAGIC);
        buf.put_u8(FORMAT_MAJOR);
        buf.put_u8(FORMAT_MINOR);
        buf.put_u8(FORMAT_PATCH);
        buf.put_u32(1);
        buf.put_u32((MAX_STRING_SIZE + 1) as u32); // key_len over the cap

        let dir = tempdir().unwrap();
        let path = dir.path().join("big.db");
        fs::write(&path, &buf).unwrap();

        let mut table = HashTable::default();
        assert!(matches!(
            load(&mut table, &path),
            Err(StoreError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_double_is_big_endian_bits() {
        let mut table = HashTable::default();
        table.put(b"d", &Value::Double(1.5)).unwrap();

        let image = encode(&table);
        // entry: magic(4) version(3) count(4) key_len(4) key(1) tag(1) payload(8)
        let payload = &image[4 + 3 + 4 + 4 + 1 + 1..];
        assert_eq!(payload, 1.5f64.to_bits().to_be_bytes());
    }

    #[test]
    fn test_special_doubles_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doubles.db");

        let mut table = HashTable::default();
        table.put(b"inf", &Value::Double(f64::INFINITY)).unwrap();
        table.put(b"neg", &Value::Double(-0.0)).unwrap();
        table.put(b"min", &Value::Double(f64::MIN)).unwrap();
        save(&table, &path).unwrap();

        let mut restored = HashTable::default();
        load(&mut restored, &path).unwrap();

        assert_eq!(
            restored.get(b"inf").unwrap().to_owned(),
            Value::Double(f64::INFINITY)
        );
        match restored.get(b"neg").unwrap() {
            ValueRef::Double(d) => assert!(d == 0.0 && d.is_sign_negative()),
            other => panic!("unexpected value {:?}", other),
        }
        assert_eq!(
            restored.get(b"min").unwrap().to_owned(),
            Value::Double(f64::MIN)
        );
    }
}
