//! The LSM tree façade.
//!
//! Owns the write buffer, the fixed ladder of on-disk levels, and the worker
//! pool, and orchestrates the data flow between them:
//!
//! ```text
//! put ──► Buffer ──flush──► Level 0 ──merge_down──► Level 1 ──► ... ──► Level D-1
//! ```
//!
//! Writes land in the buffer; when it overflows it is written out as a new
//! run at level 0, and a full level cascades downward through `merge_down`.
//! Newer data always shadows older data: the buffer is newest, then each
//! level's runs from tail to head, level 0 before level 1. Reads walk runs in
//! exactly that order, point lookups and range scans claiming run indices in
//! parallel from the worker pool.
//!
//! The tree assumes a single writer and quiesced readers; it is the caller's
//! job not to interleave operations.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::{Mutex, RwLock};

use crate::buffer::Buffer;
use crate::config::Config;
use crate::errinput;
use crate::entry::{Entry, Key, Value, TOMBSTONE};
use crate::error::{Error, Result};
use crate::level::Level;
use crate::merge::MergeContext;
use crate::pool::WorkerPool;
use crate::run::Run;

pub struct LsmTree {
    config: Config,
    buffer: Buffer,
    levels: Arc<RwLock<Vec<Level>>>,
    pool: WorkerPool,
    next_run_id: AtomicU64,
    runs_dir: PathBuf,
}

impl LsmTree {
    /// Opens a tree with the given configuration, creating its run directory
    /// if needed. Level `i` is sized at `fanout` runs of
    /// `buffer_capacity * fanout^i` entries.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let runs_dir = config.dir.join("runs");
        fs::create_dir_all(&runs_dir)?;

        let mut levels = Vec::with_capacity(config.depth);
        let mut max_run_size = config.buffer_capacity;
        for _ in 0..config.depth {
            levels.push(Level::new(config.fanout, max_run_size));
            max_run_size = max_run_size.saturating_mul(config.fanout);
        }

        let pool = WorkerPool::new(config.threads)?;

        tracing::info!(
            dir = %config.dir.display(),
            buffer_capacity = config.buffer_capacity,
            depth = config.depth,
            fanout = config.fanout,
            threads = config.threads,
            merge_ratio = config.merge_ratio,
            "opened lsm tree"
        );

        Ok(Self {
            buffer: Buffer::new(config.buffer_capacity),
            levels: Arc::new(RwLock::new(levels)),
            pool,
            next_run_id: AtomicU64::new(0),
            runs_dir,
            config,
        })
    }

    /// Inserts or overwrites a key-value pair. The tombstone value is
    /// reserved for deletes and rejected here.
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        if value == TOMBSTONE {
            return errinput!("value {value} is reserved");
        }
        self.write(key, value)
    }

    /// Deletes a key by writing a tombstone. Indistinguishable from a write
    /// until the terminal-level compaction drops it.
    pub fn del(&self, key: Key) -> Result<()> {
        self.write(key, TOMBSTONE)
    }

    fn write(&self, key: Key, value: Value) -> Result<()> {
        if self.buffer.put(key, value) {
            return Ok(());
        }

        // Buffer full and the key absent: flush it to level 0, making room
        // there first if necessary.
        let mut levels = self.levels.write();
        if levels[0].remaining() == 0 {
            self.merge_down(&mut levels, 0)?;
        }
        self.flush(&mut levels)?;

        let inserted = self.buffer.put(key, value);
        debug_assert!(inserted, "insert into freshly flushed buffer failed");
        Ok(())
    }

    /// Writes the buffer out as a new run at the tail of level 0 and empties
    /// it. The buffer iterates in ascending key order, so the run is sorted
    /// by construction.
    fn flush(&self, levels: &mut [Level]) -> Result<()> {
        let mut run = self.new_run(levels[0].max_run_size);
        run.map_write()?;
        for entry in self.buffer.iter() {
            run.append(entry)?;
        }
        run.unmap_write()?;

        tracing::debug!(
            entries = run.len(),
            path = %run.path().display(),
            "flushed buffer to level 0"
        );
        levels[0].runs.push(run);
        self.buffer.clear();
        Ok(())
    }

    /// Merges the oldest runs of `current` into a single new run at the next
    /// level, recursing first if the next level has no free slot. Tombstones
    /// are dropped when the target is the terminal level; consumed runs are
    /// removed from `current` and their files deleted.
    fn merge_down(&self, levels: &mut Vec<Level>, current: usize) -> Result<()> {
        if levels[current].is_empty() {
            return Ok(());
        }
        if current + 1 == levels.len() {
            return Err(Error::TreeFull);
        }
        let next = current + 1;

        if levels[next].remaining() == 0 {
            self.merge_down(levels, next)?;
            debug_assert!(levels[next].remaining() > 0);
        }

        let level = &levels[current];
        let take = ((self.config.merge_ratio * level.max_runs as f64) as usize)
            .max(1)
            .min(level.runs.len());

        let mut merge = MergeContext::new();
        for run in &level.runs[..take] {
            run.map_read()?;
        }
        // The tail of a level is newest, and the merge resolves equal keys
        // toward the earliest-added source, so sources register in reverse.
        for run in level.runs[..take].iter().rev() {
            merge.add(run.scan()?);
        }

        let terminal = next + 1 == levels.len();
        let mut output = self.new_run(levels[next].max_run_size);
        let mut dropped = 0;
        output.map_write()?;
        for entry in merge {
            if terminal && entry.is_tombstone() {
                dropped += 1;
                continue;
            }
            output.append(entry)?;
        }
        output.unmap_write()?;

        let written = output.len();
        levels[next].runs.push(output);

        let retired: Vec<Run> = levels[current].runs.drain(..take).collect();
        for run in retired {
            run.unmap_read();
            if let Err(e) = fs::remove_file(run.path()) {
                tracing::warn!(
                    path = %run.path().display(),
                    error = %e,
                    "failed to delete retired run file"
                );
            }
        }

        tracing::info!(
            source_level = current,
            target_level = next,
            runs_merged = take,
            entries_written = written,
            tombstones_dropped = dropped,
            "merged level down"
        );
        Ok(())
    }

    /// Returns the most recent value written for a key, or `None` if the key
    /// was never written or its latest write was a delete.
    ///
    /// The buffer is probed first; on a miss, worker tasks claim run indices
    /// in recency order from a shared counter and race to find a hit. The
    /// reported value is the one from the smallest index that matched,
    /// regardless of which task finished first.
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        if let Some(value) = self.buffer.get(key) {
            return Ok((value != TOMBSTONE).then_some(value));
        }

        let search = Arc::new(PointSearch {
            cursor: AtomicUsize::new(0),
            found: AtomicBool::new(false),
            best: Mutex::new(None),
        });
        for _ in 0..self.pool.threads() {
            let levels = Arc::clone(&self.levels);
            let search = Arc::clone(&search);
            self.pool.launch(move || search_runs(&levels, &search, key));
        }
        self.pool.wait_all();

        let best = search.best.lock().take();
        Ok(best.map(|(_, value)| value).filter(|&value| value != TOMBSTONE))
    }

    /// Returns all live entries with keys in the half-open interval
    /// `[start, end)`, ascending. Worker tasks claim runs in parallel and
    /// collect per-run subranges; a final merge resolves shadowed writes and
    /// drops tombstones.
    pub fn range(&self, start: Key, end: Key) -> Result<Vec<Entry>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let hi = end - 1;

        let search = Arc::new(RangeSearch {
            cursor: AtomicUsize::new(0),
            results: Mutex::new(BTreeMap::new()),
        });
        // The buffer is the newest source; run indices shift up by one.
        search.results.lock().insert(0, self.buffer.range(start, hi));

        for _ in 0..self.pool.threads() {
            let levels = Arc::clone(&self.levels);
            let search = Arc::clone(&search);
            self.pool
                .launch(move || collect_ranges(&levels, &search, start, hi));
        }
        self.pool.wait_all();

        let sources = std::mem::take(&mut *search.results.lock());
        let mut merge = MergeContext::new();
        for entries in sources.values() {
            merge.add(entries.iter().copied());
        }
        Ok(merge.filter(|entry| !entry.is_tombstone()).collect())
    }

    /// Loads concatenated fixed-width records from a binary file, writing
    /// each in order. A truncated trailing record ends the load; an
    /// unopenable file is an error.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::IO(format!("could not open '{}': {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let mut count = 0u64;
        loop {
            let key = match reader.read_i64::<LittleEndian>() {
                Ok(key) => key,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let value = match reader.read_i64::<LittleEndian>() {
                Ok(value) => value,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            self.put(key, value)?;
            count += 1;
        }

        tracing::info!(path = %path.display(), entries = count, "loaded file");
        Ok(count)
    }

    /// Current occupancy of the buffer and every level.
    pub fn stats(&self) -> Stats {
        let levels = self.levels.read();
        Stats {
            buffer_entries: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            levels: levels
                .iter()
                .map(|level| LevelStats {
                    max_runs: level.max_runs,
                    max_run_size: level.max_run_size,
                    run_entries: level.runs.iter().map(|run| run.len()).collect(),
                })
                .collect(),
        }
    }

    fn new_run(&self, capacity: usize) -> Run {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        Run::create(&self.runs_dir, id, capacity)
    }
}

/// Occupancy snapshot of a tree.
#[derive(Debug)]
pub struct Stats {
    pub buffer_entries: usize,
    pub buffer_capacity: usize,
    pub levels: Vec<LevelStats>,
}

#[derive(Debug)]
pub struct LevelStats {
    pub max_runs: usize,
    pub max_run_size: usize,
    /// Entry count of each run, oldest first.
    pub run_entries: Vec<usize>,
}

impl LevelStats {
    pub fn runs(&self) -> usize {
        self.run_entries.len()
    }

    pub fn entries(&self) -> usize {
        self.run_entries.iter().sum()
    }
}

/// Shared state of a parallel point lookup.
struct PointSearch {
    cursor: AtomicUsize,
    found: AtomicBool,
    best: Mutex<Option<(usize, Value)>>,
}

/// Shared state of a parallel range scan: per-run subranges keyed by run
/// index + 1 (the buffer occupies slot 0).
struct RangeSearch {
    cursor: AtomicUsize,
    results: Mutex<BTreeMap<usize, Vec<Entry>>>,
}

/// Resolves a logical run index in recency order: index 0 is the newest
/// level-0 run, proceeding tail to head within each level and downward
/// through the levels.
fn run_at(levels: &[Level], mut index: usize) -> Option<&Run> {
    for level in levels {
        if index < level.runs.len() {
            return Some(&level.runs[level.runs.len() - index - 1]);
        }
        index -= level.runs.len();
    }
    None
}

/// Point-lookup worker: claims run indices until someone finds a hit or the
/// runs are exhausted. The found flag is only an early-exit hint; the
/// min-index check under the lock is what guarantees the newest value wins.
fn search_runs(levels: &Arc<RwLock<Vec<Level>>>, search: &PointSearch, key: Key) {
    let levels = levels.read();
    loop {
        let index = search.cursor.fetch_add(1, Ordering::SeqCst);
        if search.found.load(Ordering::SeqCst) {
            return;
        }
        let Some(run) = run_at(&levels, index) else {
            return;
        };

        if let Err(e) = run.map_read() {
            tracing::error!(error = %e, "failed to map run for point lookup");
            return;
        }
        let result = run.get(key);
        run.unmap_read();

        match result {
            Ok(None) => continue,
            Ok(Some(value)) => {
                let mut best = search.best.lock();
                if best.is_none_or(|(best_index, _)| index < best_index) {
                    *best = Some((index, value));
                }
                drop(best);
                search.found.store(true, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "point lookup failed");
                return;
            }
        }
    }
}

/// Range worker: claims runs until none remain, collecting each run's
/// subrange into the shared result map.
fn collect_ranges(levels: &Arc<RwLock<Vec<Level>>>, search: &RangeSearch, lo: Key, hi: Key) {
    let levels = levels.read();
    loop {
        let index = search.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(run) = run_at(&levels, index) else {
            return;
        };

        if let Err(e) = run.map_read() {
            tracing::error!(error = %e, "failed to map run for range scan");
            return;
        }
        let result = run.range(lo, hi);
        run.unmap_read();

        match result {
            Ok(entries) => {
                search.results.lock().insert(index + 1, entries);
            }
            Err(e) => {
                tracing::error!(error = %e, "range scan failed");
                return;
            }
        }
    }
}
