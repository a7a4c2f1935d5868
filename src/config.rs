use std::path::PathBuf;

use crate::errinput;
use crate::error::Result;

/// Configuration for an LSM tree.
///
/// Level `i` holds at most `fanout` runs of at most
/// `buffer_capacity * fanout^i` entries each; level `depth - 1` is the
/// terminal level, where tombstones are garbage-collected.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the tree's run files.
    pub dir: PathBuf,

    /// Maximum number of entries in the write buffer (default: 1024).
    pub buffer_capacity: usize,

    /// Number of on-disk levels (default: 5).
    pub depth: usize,

    /// Per-level run count bound and size growth factor (default: 10).
    pub fanout: usize,

    /// Worker threads servicing point and range reads (default: 4).
    pub threads: usize,

    /// Fraction of a level's run slots consumed per compaction, in (0, 1]
    /// (default: 0.5).
    pub merge_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./siltdb"),
            buffer_capacity: 1024,
            depth: 5,
            fanout: 10,
            threads: 4,
            merge_ratio: 0.5,
        }
    }
}

impl Config {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the write buffer capacity in entries
    pub fn buffer_capacity(mut self, entries: usize) -> Self {
        self.buffer_capacity = entries;
        self
    }

    /// Set the number of on-disk levels
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Set the level fanout
    pub fn fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    /// Set the read worker thread count
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the merge ratio
    pub fn merge_ratio(mut self, ratio: f64) -> Self {
        self.merge_ratio = ratio;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return errinput!("buffer capacity must be at least 1");
        }
        if self.depth == 0 {
            return errinput!("depth must be at least 1");
        }
        if self.fanout < 2 {
            return errinput!("fanout must be at least 2");
        }
        if self.threads == 0 {
            return errinput!("thread count must be at least 1");
        }
        if !(self.merge_ratio > 0.0 && self.merge_ratio <= 1.0) {
            return errinput!("merge ratio {} is not in (0, 1]", self.merge_ratio);
        }
        Ok(())
    }
}
