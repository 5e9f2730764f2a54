//! Generation-tagged preload scheduler.
//!
//! After a signature change (or on a cold cache) every frame except the one
//! on screen is loaded in the background:
//! 1. `begin()` bumps the generation and builds the work list
//! 2. After the configured delay `tick()` hands out the first loads
//! 3. Each completion is reported through `mark()` with the generation it
//!    was issued under; marks from older generations are no-ops
//!
//! The generation counter is the only cancellation mechanism. In-flight
//! fetches of an abandoned batch still land in the cache, they just no
//! longer advance anything here.

use log::{debug, trace};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::entities::{FrameAddress, FrameTable};

/// How a batch issues its loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainMode {
    /// One load at a time, next one issued on completion
    Chained,
    /// Everything at once
    #[default]
    Parallel,
}

/// Outcome of [`PreloadScheduler::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// Batch waits for its delay, poll `tick()`
    Scheduled(u64),
    /// Nothing to load; the batch is already settled
    Empty(u64),
}

/// First loads of a batch whose delay elapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadStart {
    pub generation: u64,
    pub issue: Vec<FrameAddress>,
}

/// Outcome of [`PreloadScheduler::mark`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Stale generation or unknown address
    Ignored,
    /// Chained mode: load this one next
    Next(FrameAddress),
    /// Other loads of the batch are still out
    Waiting,
    /// Work and pending both empty; emit `loaded` (once per generation)
    Finished,
}

#[derive(Debug)]
struct Batch {
    generation: u64,
    /// Stack: last element is drained first
    work: Vec<FrameAddress>,
    pending: HashSet<FrameAddress>,
    start_at: Option<Instant>,
    finished: bool,
}

impl Batch {
    fn pop(&mut self) -> Option<FrameAddress> {
        let next = self.work.pop()?;
        self.pending.insert(next.clone());
        Some(next)
    }
}

#[derive(Debug)]
pub struct PreloadScheduler {
    mode: DrainMode,
    delay: Duration,
    generation: u64,
    batch: Option<Batch>,
}

impl Default for PreloadScheduler {
    fn default() -> Self {
        Self::new(DrainMode::default(), 250)
    }
}

impl PreloadScheduler {
    pub fn new(mode: DrainMode, delay_ms: u64) -> Self {
        Self {
            mode,
            delay: Duration::from_millis(delay_ms),
            generation: 0,
            batch: None,
        }
    }

    pub fn mode(&self) -> DrainMode {
        self.mode
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }

    /// Live generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new generation over every address of `table` except `current`.
    ///
    /// Any batch of an older generation is abandoned.
    pub fn begin(&mut self, table: &FrameTable, current: Option<&FrameAddress>, now: Instant) -> Begin {
        self.generation += 1;
        let generation = self.generation;

        let mut work: Vec<FrameAddress> = table.addresses().filter(|a| Some(a) != current).collect();
        // Reversed so that popping drains in enumeration order
        work.reverse();

        if work.is_empty() {
            debug!("Preload gen {}: nothing to load", generation);
            self.batch = Some(Batch {
                generation,
                work,
                pending: HashSet::new(),
                start_at: None,
                finished: true,
            });
            return Begin::Empty(generation);
        }

        debug!(
            "Preload gen {}: {} frames ({:?}) in {}ms",
            generation,
            work.len(),
            self.mode,
            self.delay.as_millis()
        );
        self.batch = Some(Batch {
            generation,
            work,
            pending: HashSet::new(),
            start_at: Some(now + self.delay),
            finished: false,
        });
        Begin::Scheduled(generation)
    }

    /// Hand out the first loads once the batch delay has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<PreloadStart> {
        let mode = self.mode;
        let batch = self.batch.as_mut()?;
        let start_at = batch.start_at?;
        if now < start_at {
            return None;
        }
        batch.start_at = None;

        let mut issue = Vec::new();
        match mode {
            DrainMode::Chained => issue.extend(batch.pop()),
            DrainMode::Parallel => {
                while let Some(next) = batch.pop() {
                    issue.push(next);
                }
            }
        }
        trace!("Preload gen {}: issuing {} loads", batch.generation, issue.len());
        Some(PreloadStart {
            generation: batch.generation,
            issue,
        })
    }

    /// Earliest instant `tick()` has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.batch.as_ref().and_then(|b| b.start_at)
    }

    /// Report that the load of `address` issued under `generation` settled
    /// (success or failure alike).
    pub fn mark(&mut self, generation: u64, address: &FrameAddress) -> Progress {
        let mode = self.mode;
        let Some(batch) = self.batch.as_mut().filter(|b| b.generation == generation) else {
            trace!("Preload mark for {} ignored (gen {} is not live)", address, generation);
            return Progress::Ignored;
        };
        if !batch.pending.remove(address) {
            return Progress::Ignored;
        }

        if mode == DrainMode::Chained {
            if let Some(next) = batch.pop() {
                return Progress::Next(next);
            }
        }

        if batch.pending.is_empty() && batch.work.is_empty() && !batch.finished {
            batch.finished = true;
            debug!("Preload gen {}: finished", generation);
            return Progress::Finished;
        }
        Progress::Waiting
    }

    /// True while the live batch has work queued, loads pending or its delay
    /// running. Drag input is suppressed meanwhile.
    pub fn is_suppressing(&self) -> bool {
        self.batch.as_ref().is_some_and(|b| !b.finished)
    }

    /// Live generation has run to completion at least once
    pub fn has_preloaded(&self) -> bool {
        self.batch.as_ref().is_some_and(|b| b.finished)
    }

    pub fn pending_len(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.pending.len())
    }

    pub fn remaining(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.work.len())
    }
}
