//! Background thread pool for frame/mask fetches and config lookups.
//!
//! Uses work-stealing deques:
//! - External jobs land in a global injector
//! - Each worker drains its own deque first, then the injector, then steals
//!
//! Workers never touch widget state. A job fetches, decodes and posts a
//! message back to the UI thread; staleness is decided there, so the pool
//! needs no cancellation mechanism of its own.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::services::{Executor, Job};

/// Work-stealing fetch pool.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// let tx = tx.clone();
/// workers.execute(Box::new(move || {
///     let result = source.fetch(&url);
///     let _ = tx.send(Message::Fetched(Completion { request, result }));
/// }));
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();

        let handles = locals
            .into_iter()
            .enumerate()
            .map(|(worker_id, local)| {
                let injector = Arc::clone(&injector);
                let shutdown = Arc::clone(&shutdown);
                let stealers = stealers.clone();
                thread::Builder::new()
                    .name(format!("spinframe-fetch-{}", worker_id))
                    .spawn(move || run_worker(worker_id, local, &injector, &stealers, &shutdown))
                    .expect("Failed to spawn fetch worker thread")
            })
            .collect();

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);

        Self {
            injector,
            handles,
            shutdown,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

impl Default for Workers {
    /// Three quarters of the cores, leaving room for the UI thread
    fn default() -> Self {
        Self::new(num_cpus::get() * 3 / 4)
    }
}

fn run_worker(
    worker_id: usize,
    local: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Fetch worker {} started", worker_id);
    loop {
        if let Some(job) = local.pop() {
            job();
            continue;
        }
        if let Some(job) = injector.steal_batch_and_pop(&local).success() {
            job();
            continue;
        }
        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            job();
            continue;
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        // Idle: 1ms nap instead of spinning
        thread::sleep(Duration::from_millis(1));
    }
    trace!("Fetch worker {} stopped", worker_id);
}

impl Executor for Workers {
    fn execute(&self, job: Job) {
        self.injector.push(job);
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        use std::time::Instant;

        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // In-flight fetches may block on the network; don't wait forever
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_jobs_run_on_pool() {
        let workers = Workers::new(2);
        assert_eq!(workers.num_threads(), 2);
        let (tx, rx) = unbounded();
        for i in 0..16 {
            let tx = tx.clone();
            workers.execute(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                let _ = tx.send((i, name));
            }));
        }
        let mut seen: Vec<usize> = (0..16)
            .map(|_| {
                let (i, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
                assert!(name.unwrap().starts_with("spinframe-fetch-"));
                i
            })
            .collect();
        seen.sort();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_threads_clamped() {
        let workers = Workers::new(0);
        assert_eq!(workers.num_threads(), 1);
    }
}
