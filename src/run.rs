//! On-disk runs and their mapping lifecycle.
//!
//! A run is an immutable, sorted sequence of fixed-width records backed by a
//! single file. It moves through two mutually exclusive mappings:
//!
//! - **Write mapping**: the run is populated append-only, in strictly
//!   increasing key order, up to its capacity. Closing the write mapping
//!   finalizes the run.
//! - **Read mapping**: the finalized file is memory-mapped and served to
//!   point lookups, bounded range scans, and full scans. Multiple readers may
//!   share the mapping concurrently.
//!
//! Point lookups binary-search the mapped records directly; a min/max key
//! fence kept from the write phase lets callers skip runs whose key range
//! cannot contain the probe. The file is deleted by the owning tree when a
//! compaction retires the run.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::RwLock;

use crate::entry::{entry_at, key_at, Entry, Key, Value};
use crate::errdata;
use crate::error::Result;

pub struct Run {
    capacity: usize,
    size: usize,
    path: PathBuf,
    key_range: Option<(Key, Key)>,
    writer: Option<BufWriter<File>>,
    map: RwLock<Option<Arc<Mmap>>>,
}

impl Run {
    /// Allocates an empty run of the given capacity, backed by
    /// `dir/{id:08}.run`. No file is created until the write mapping opens.
    pub fn create(dir: &Path, id: u64, capacity: usize) -> Self {
        Self {
            capacity,
            size: 0,
            path: dir.join(format!("{id:08}.run")),
            key_range: None,
            writer: None,
            map: RwLock::new(None),
        }
    }

    /// Opens the run for append-only population.
    pub fn map_write(&mut self) -> Result<()> {
        if self.map.read().is_some() {
            return errdata!("run {} is read-mapped", self.path.display());
        }
        if self.writer.is_some() {
            return errdata!("run {} is already write-mapped", self.path.display());
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// Appends the next entry. The caller guarantees keys arrive in strictly
    /// increasing order and that the run is below capacity.
    pub fn append(&mut self, entry: Entry) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return errdata!("run {} is not write-mapped", self.path.display());
        };
        debug_assert!(self.size < self.capacity, "run over capacity");
        debug_assert!(
            self.key_range.is_none_or(|(_, max)| entry.key > max),
            "keys must be appended in strictly increasing order"
        );

        entry.encode(writer)?;
        self.key_range = match self.key_range {
            None => Some((entry.key, entry.key)),
            Some((min, _)) => Some((min, entry.key)),
        };
        self.size += 1;
        Ok(())
    }

    /// Closes the write mapping, finalizing the run.
    pub fn unmap_write(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return errdata!("run {} is not write-mapped", self.path.display());
        };
        writer.flush()?;
        Ok(())
    }

    /// Opens a shared read-only mapping of the finalized file. Idempotent; an
    /// empty run has nothing to map and is served from its size alone.
    pub fn map_read(&self) -> Result<()> {
        if self.writer.is_some() {
            return errdata!("run {} is write-mapped", self.path.display());
        }
        if self.size == 0 {
            return Ok(());
        }
        let mut slot = self.map.write();
        if slot.is_none() {
            let file = File::open(&self.path)?;
            let mmap = unsafe { Mmap::map(&file)? };
            *slot = Some(Arc::new(mmap));
        }
        Ok(())
    }

    /// Drops the read mapping. In-flight scans keep their own handle to the
    /// mapping and finish safely.
    pub fn unmap_read(&self) {
        *self.map.write() = None;
    }

    fn view(&self) -> Result<Arc<Mmap>> {
        match self.map.read().clone() {
            Some(map) => Ok(map),
            None => errdata!("run {} is not read-mapped", self.path.display()),
        }
    }

    /// Looks up a key in the mapped records by binary search.
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        if !self.might_contain(key) {
            return Ok(None);
        }
        let map = self.view()?;

        let mut lo = 0;
        let mut hi = self.size;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match key_at(&map, mid).cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(entry_at(&map, mid).value)),
            }
        }
        Ok(None)
    }

    /// Returns all entries with `lo <= key <= hi` in ascending key order, as
    /// an owned sequence.
    pub fn range(&self, lo: Key, hi: Key) -> Result<Vec<Entry>> {
        if self.size == 0 || self.key_range.is_none_or(|(min, max)| hi < min || lo > max) {
            return Ok(Vec::new());
        }
        let map = self.view()?;

        // First record with key >= lo.
        let mut left = 0;
        let mut right = self.size;
        while left < right {
            let mid = left + (right - left) / 2;
            if key_at(&map, mid) < lo {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        let mut entries = Vec::new();
        for index in left..self.size {
            let entry = entry_at(&map, index);
            if entry.key > hi {
                break;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Streams all entries in key order. The iterator holds its own handle to
    /// the mapping, so it outlives a later `unmap_read`.
    pub fn scan(&self) -> Result<RunIter> {
        if self.size == 0 {
            return Ok(RunIter {
                map: None,
                index: 0,
                size: 0,
            });
        }
        Ok(RunIter {
            map: Some(self.view()?),
            index: 0,
            size: self.size,
        })
    }

    fn might_contain(&self, key: Key) -> bool {
        self.key_range
            .is_some_and(|(min, max)| key >= min && key <= max)
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over a run's entries in ascending key order.
pub struct RunIter {
    map: Option<Arc<Mmap>>,
    index: usize,
    size: usize,
}

impl Iterator for RunIter {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.index >= self.size {
            return None;
        }
        let entry = entry_at(self.map.as_ref()?, self.index);
        self.index += 1;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_run(dir: &TempDir, id: u64, entries: &[(Key, Value)]) -> Run {
        let mut run = Run::create(dir.path(), id, entries.len().max(1));
        run.map_write().expect("map_write failed");
        for &(key, value) in entries {
            run.append(Entry::new(key, value)).expect("append failed");
        }
        run.unmap_write().expect("unmap_write failed");
        run
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().expect("temp dir");
        let run = build_run(&dir, 0, &[(1, 10), (3, 30), (5, 50), (7, 70)]);
        run.map_read().expect("map_read failed");

        assert_eq!(run.len(), 4);
        assert_eq!(run.get(1).unwrap(), Some(10));
        assert_eq!(run.get(7).unwrap(), Some(70));
        assert_eq!(run.get(4).unwrap(), None);
        // Outside the key fence, no search happens.
        assert_eq!(run.get(0).unwrap(), None);
        assert_eq!(run.get(8).unwrap(), None);

        run.unmap_read();
    }

    #[test]
    fn test_range_is_inclusive_and_sorted() {
        let dir = TempDir::new().expect("temp dir");
        let run = build_run(&dir, 0, &[(2, 20), (4, 40), (6, 60), (8, 80)]);
        run.map_read().expect("map_read failed");

        let entries = run.range(3, 6).unwrap();
        assert_eq!(entries, vec![Entry::new(4, 40), Entry::new(6, 60)]);

        let all = run.range(Key::MIN, Key::MAX).unwrap();
        assert_eq!(all.len(), 4);
        assert!(run.range(9, 20).unwrap().is_empty());

        run.unmap_read();
    }

    #[test]
    fn test_scan_survives_unmap() {
        let dir = TempDir::new().expect("temp dir");
        let run = build_run(&dir, 0, &[(1, 10), (2, 20)]);
        run.map_read().expect("map_read failed");

        let mut scan = run.scan().expect("scan failed");
        run.unmap_read();

        assert_eq!(scan.next(), Some(Entry::new(1, 10)));
        assert_eq!(scan.next(), Some(Entry::new(2, 20)));
        assert_eq!(scan.next(), None);
    }

    #[test]
    fn test_mapping_discipline() {
        let dir = TempDir::new().expect("temp dir");
        let mut run = Run::create(dir.path(), 0, 4);

        // Not yet write-mapped.
        assert!(run.append(Entry::new(1, 10)).is_err());
        run.map_write().expect("map_write failed");
        assert!(run.map_write().is_err());
        // Readable only once the write mapping is closed.
        assert!(run.map_read().is_err());
        run.append(Entry::new(1, 10)).expect("append failed");
        run.unmap_write().expect("unmap_write failed");
        assert!(run.unmap_write().is_err());

        run.map_read().expect("map_read failed");
        assert_eq!(run.get(1).unwrap(), Some(10));
    }

    #[test]
    fn test_get_requires_read_mapping() {
        let dir = TempDir::new().expect("temp dir");
        let run = build_run(&dir, 0, &[(1, 10)]);
        assert!(run.get(1).is_err());
    }

    #[test]
    fn test_empty_run() {
        let dir = TempDir::new().expect("temp dir");
        let mut run = Run::create(dir.path(), 0, 4);
        run.map_write().expect("map_write failed");
        run.unmap_write().expect("unmap_write failed");

        run.map_read().expect("map_read failed");
        assert!(run.is_empty());
        assert_eq!(run.get(1).unwrap(), None);
        assert!(run.range(Key::MIN, Key::MAX).unwrap().is_empty());
        assert_eq!(run.scan().unwrap().next(), None);
    }
}
