//! SiltDB: a leveled LSM-tree key-value store for fixed-width integer keys
//! and values.
//!
//! # Architecture
//!
//! Data flows from an in-memory write buffer down through a ladder of on-disk
//! levels, each holding sorted, immutable runs:
//!
//! ```text
//! ┌──────────────┐
//! │ Write Buffer │  newest
//! └──────┬───────┘
//!        │ flush on overflow
//!        ▼
//! ┌──────────────┐
//! │   Level 0    │  fanout runs of B entries
//! └──────┬───────┘
//!        │ merge_down when full
//!        ▼
//! ┌──────────────┐
//! │   Level 1    │  fanout runs of B·F entries
//! └──────┬───────┘
//!        ▼
//!       ...        tombstones dropped at the terminal level
//! ```
//!
//! Newer data always shadows older data: the buffer first, then each level's
//! runs from tail to head, level 0 before deeper levels. Compaction merges
//! the oldest runs of a full level into one run at the next level, cascading
//! recursively when the next level is itself full. Deletes write a tombstone
//! that shadows older values until the terminal-level compaction
//! garbage-collects it.
//!
//! # Read parallelism
//!
//! Point and range reads fan out over a fixed worker pool. Workers claim run
//! indices in recency order from an atomic counter; a point lookup reports
//! the hit from the smallest index regardless of completion order, and a
//! range scan merges per-run subranges in recency order. Writes are
//! serialized by the caller and never interleave with reads.

pub mod buffer;
pub mod config;
pub mod entry;
pub mod error;
pub mod level;
pub mod merge;
pub mod pool;
pub mod repl;
pub mod run;
pub mod tree;

pub use config::Config;
pub use entry::{Entry, Key, Value, TOMBSTONE};
pub use error::{Error, Result};
pub use tree::{LsmTree, Stats};
