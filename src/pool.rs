//! Fixed-size worker pool for parallel reads.
//!
//! A set of named threads receives boxed closures over an unbounded channel.
//! `launch` dispatches a task; `wait_all` blocks the caller until no task is
//! queued or running. Tasks that need to process multiple work units loop
//! internally, claiming units from a shared atomic counter, rather than
//! re-enqueueing themselves.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::Result;

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    inflight: Arc<Inflight>,
    threads: usize,
}

/// Count of launched-but-unfinished tasks, with a condvar signalled when it
/// drains to zero.
struct Inflight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Inflight {
    fn start(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the inflight count when dropped, so a panicking task cannot
/// leave `wait_all` hanging.
struct FinishGuard(Arc<Inflight>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let inflight = Arc::new(Inflight {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            let receiver = receiver.clone();
            let inflight = Arc::clone(&inflight);
            let handle = thread::Builder::new()
                .name(format!("silt-worker-{worker_id}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        let _guard = FinishGuard(Arc::clone(&inflight));
                        task();
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            inflight,
            threads,
        })
    }

    /// Dispatches a task to the pool.
    pub fn launch(&self, task: impl FnOnce() + Send + 'static) {
        self.inflight.start();
        let sender = self.sender.as_ref().expect("pool is shut down");
        if sender.send(Box::new(task)).is_err() {
            self.inflight.finish();
        }
    }

    /// Blocks until every launched task has finished.
    pub fn wait_all(&self) {
        let mut count = self.inflight.count.lock();
        while *count > 0 {
            self.inflight.idle.wait(&mut count);
        }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's receive loop.
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
