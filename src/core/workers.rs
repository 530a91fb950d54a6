//! Decode worker: one background thread with a serialized FIFO queue.
//!
//! Shared by every playback engine in the process, so at most one frame
//! decode runs at a time system-wide. Decodes are short relative to frame
//! delays, and a single thread bounds CPU contention with the UI.
//!
//! The shared instance is created lazily on first use and lives for the
//! process lifetime. Private workers (`DecodeWorker::new`) shut down when
//! dropped: closing the channel ends the thread's receive loop.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};
use std::thread;

use crate::entities::traits::{Job, TaskQueue};

/// Process-wide decode worker
static SHARED_WORKER: LazyLock<Arc<DecodeWorker>> =
    LazyLock::new(|| Arc::new(DecodeWorker::new("animseq-decoder")));

/// Single-threaded serialized task queue.
///
/// # Example
/// ```ignore
/// let worker = DecodeWorker::shared();
/// worker.post(Box::new(move || {
///     // runs on the decode thread, after every previously posted job
/// }));
/// ```
pub struct DecodeWorker {
    sender: Sender<Job>,
    name: String,
}

impl DecodeWorker {
    /// Spawn a worker thread named `name`.
    ///
    /// Panics if the OS refuses to spawn a thread.
    pub fn new(name: &str) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                trace!("{} started", thread_name);
                // Ends when every sender is dropped
                for job in receiver {
                    // A panicking decoder must not take down decoding for every engine
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("{}: task panicked, continuing", thread_name);
                    }
                }
                trace!("{} stopped", thread_name);
            })
            .expect("Failed to spawn decode worker thread");

        Self {
            sender,
            name: name.to_string(),
        }
    }

    /// The process-wide worker, created on first call
    pub fn shared() -> Arc<DecodeWorker> {
        Arc::clone(&SHARED_WORKER)
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of queued (not yet started) jobs
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Enqueue closure behind all previously posted jobs
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(Box::new(f));
    }
}

impl TaskQueue for DecodeWorker {
    fn post(&self, job: Job) {
        // Receiver lives as long as the thread, which outlives every sender
        if self.sender.send(job).is_err() {
            error!("{}: queue closed, task dropped", self.name);
        }
    }
}
