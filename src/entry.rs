//! Key-value records and their on-disk encoding.
//!
//! Keys and values are fixed-width integers. A record is 16 bytes on disk:
//! the key followed by the value, both little-endian, packed without padding.
//! Run files and load files are flat sequences of these records, so a file's
//! entry count is derivable from its size alone.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::Result;

pub type Key = i64;
pub type Value = i64;

/// Reserved value marking a logically deleted key. It is written by `del`,
/// carried through compactions, and dropped at the terminal level. User
/// writes must not use it.
pub const TOMBSTONE: Value = Value::MIN;

/// Encoded size of one entry in bytes.
pub const ENTRY_SIZE: usize = 16;

/// A single key-value record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
}

impl Entry {
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }

    /// True if this entry marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }

    /// Appends the encoded record to a writer.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<LittleEndian>(self.key)?;
        writer.write_i64::<LittleEndian>(self.value)?;
        Ok(())
    }

    /// Decodes a record from a buffer. The caller guarantees the buffer holds
    /// at least `ENTRY_SIZE` bytes.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            key: LittleEndian::read_i64(&buf[..8]),
            value: LittleEndian::read_i64(&buf[8..16]),
        }
    }
}

/// Reads the key of the record at `index` in a buffer of packed records.
pub fn key_at(buf: &[u8], index: usize) -> Key {
    LittleEndian::read_i64(&buf[index * ENTRY_SIZE..])
}

/// Reads the full record at `index` in a buffer of packed records.
pub fn entry_at(buf: &[u8], index: usize) -> Entry {
    Entry::decode(&buf[index * ENTRY_SIZE..])
}
