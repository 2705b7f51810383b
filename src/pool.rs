//! Bounded worker pool.
//!
//! Jobs run on a dedicated rayon thread pool. Admission is gated by a slot
//! counter owned by the pool: [`WorkerPool::submit`] blocks the caller while
//! every slot is taken and resumes as soon as any one job finishes, in
//! whatever order jobs complete. [`WorkerPool::drain`] blocks until no job is
//! outstanding.
//!
//! A job holds its slot for its whole lifetime and releases it
//! unconditionally, including when it panics.

use crate::error::{Error, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Default)]
struct SlotState {
    in_flight: usize,
    peak: usize,
}

#[derive(Debug)]
struct Slots {
    capacity: usize,
    state: Mutex<SlotState>,
    freed: Condvar,
}

impl Slots {
    fn acquire(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.in_flight >= self.capacity {
            state = self.freed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight = state.in_flight.saturating_sub(1);
        self.freed.notify_all();
    }

    fn wait_idle(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.in_flight > 0 {
            state = self.freed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Releases a slot when dropped, so unwinding jobs give their slot back too.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Callback invoked with the panic message of a job that panicked.
pub type PanicHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Pool of at most `capacity` concurrently running jobs.
pub struct WorkerPool {
    threads: rayon::ThreadPool,
    slots: Arc<Slots>,
    on_panic: Option<PanicHandler>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.slots.capacity)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Create a pool with `capacity` slots (clamped to at least 1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the worker threads cannot be started.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("parmig-worker-{i}"))
            .build()
            .map_err(|e| Error::Spawn(e.to_string()))?;

        Ok(Self {
            threads,
            slots: Arc::new(Slots {
                capacity,
                state: Mutex::new(SlotState::default()),
                freed: Condvar::new(),
            }),
            on_panic: None,
        })
    }

    /// Report panicking jobs through `handler` instead of dropping them silently.
    #[must_use]
    pub fn with_panic_handler(mut self, handler: PanicHandler) -> Self {
        self.on_panic = Some(handler);
        self
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    /// Number of jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.slots
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
    }

    /// Highest number of simultaneously held slots observed so far.
    pub fn peak(&self) -> usize {
        self.slots
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peak
    }

    /// Run `job` on the pool, blocking until a slot is free.
    ///
    /// Returns as soon as the job has been admitted; completion is observed
    /// through whatever the job itself reports.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.slots.acquire();
        let guard = SlotGuard(Arc::clone(&self.slots));
        let on_panic = self.on_panic.clone();

        self.threads.spawn(move || {
            let _guard = guard;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                if let Some(handler) = on_panic {
                    handler(message);
                }
            }
        });
    }

    /// Block until every submitted job has finished.
    pub fn drain(&self) {
        self.slots.wait_idle();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.drain();
    }
}
