//! Level bookkeeping.
//!
//! A level is an ordered collection of runs sharing a capacity bound: at most
//! `max_runs` runs of at most `max_run_size` entries each. Runs are ordered
//! oldest at the head, newest at the tail; flushes and compactions append at
//! the tail and retire from the head. The tree enforces the bounds; the level
//! only accounts for them.

use crate::run::Run;

pub struct Level {
    pub max_runs: usize,
    pub max_run_size: usize,
    pub runs: Vec<Run>,
}

impl Level {
    pub fn new(max_runs: usize, max_run_size: usize) -> Self {
        Self {
            max_runs,
            max_run_size,
            runs: Vec::new(),
        }
    }

    /// Number of run slots still free at this level.
    pub fn remaining(&self) -> usize {
        self.max_runs - self.runs.len()
    }

    /// Total entries across all runs in the level.
    pub fn entry_count(&self) -> usize {
        self.runs.iter().map(|run| run.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
