//! Worker Pool

use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::thread::JoinHandle;

/// A task executed many times by the pool, parameterized by a single index
/// (e.g. the light whose photons are being emitted, or the column containing
/// a pixel). Implementations are shared between workers, so any per-call
/// state must use interior mutability; a task that can fail must record its
/// failure internally for the controller to inspect after `run()` returns.
pub trait IndexedTask: Send + Sync {
    /// Execute the task for the specified index.
    fn execute(&self, index: usize);

    /// Called exactly once per worker when the pool is finished, giving the
    /// task a chance to release per-worker resources.
    fn cleanup(&self) {}
}

/// Coordinates a fixed set of worker threads for multi-threaded operations.
///
/// The pool repeatedly executes an [`IndexedTask`] with the index running
/// over `[0, count)`. `run()` may be invoked any number of times (e.g. once
/// per row of an image); the worker threads are created on the first call
/// and reused until `finish()` disposes of them. With a single hardware
/// thread the pool executes the task inline on the calling thread and never
/// spawns workers.
pub struct WorkerPool {
    range: Arc<WorkRange>,
    num_indices: usize,
    finished: bool,
    backend: Backend,
}

/// Execution strategy selected at construction time.
enum Backend {
    /// One hardware thread: run the task synchronously in the caller.
    Inline { task: Option<Arc<dyn IndexedTask>> },

    /// Worker threads draining a shared cursor, rendezvousing with the
    /// controller through a countdown barrier.
    Threaded {
        size: usize,
        shared: Arc<PoolShared>,
        workers: Vec<JoinHandle<()>>,
    },
}

/// The index cursor shared by every worker. `next` only moves forward while
/// a run is in progress and never passes `total`; cancelling a run stores
/// `total` so no further index can be claimed.
#[derive(Default)]
struct WorkRange {
    next: AtomicUsize,
    total: AtomicUsize,
}

impl WorkRange {
    /// Make the range idle: nothing claimable until the next `begin`.
    fn reset(&self, count: usize) {
        self.total.store(count, Ordering::Release);
        self.next.store(count, Ordering::Release);
    }

    /// Open the range `[0, count)` for claiming.
    fn begin(&self, count: usize) {
        self.total.store(count, Ordering::Release);
        self.next.store(0, Ordering::Release);
    }

    /// Atomically claim the next unclaimed index, if any.
    fn claim(&self) -> Option<usize> {
        let total = self.total.load(Ordering::Acquire);
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                if next < total {
                    Some(next + 1)
                } else {
                    None
                }
            })
            .ok()
    }

    /// Exhaust the range so no further index is dispatched. Indices already
    /// claimed run to completion.
    fn exhaust(&self) {
        let total = self.total.load(Ordering::Acquire);
        self.next.store(total, Ordering::Release);
    }
}

/// State shared between the controller and the worker threads.
struct PoolShared {
    range: Arc<WorkRange>,
    state: Mutex<PoolState>,
    /// Workers park here between runs; signalled when a run begins or the
    /// pool shuts down.
    work_ready: Condvar,
    /// The controller parks here during a run; signalled by the last worker
    /// to finish.
    all_parked: Condvar,
}

struct PoolState {
    task: Option<Arc<dyn IndexedTask>>,
    /// Bumped once per run; workers use it to tell a fresh run from a
    /// spurious wakeup.
    epoch: u64,
    /// Number of workers parked for the current epoch. The controller
    /// returns from `run()` once this reaches `live`.
    waiting: usize,
    /// Workers still healthy. A worker whose task panics is permanently
    /// removed.
    live: usize,
    shutdown: bool,
}

/// Cloneable handle for cancelling the pool's current run from inside a task
/// or from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    range: Arc<WorkRange>,
}

impl CancelHandle {
    /// Stop dispatching further indices. In-flight executions complete.
    pub fn cancel(&self) {
        self.range.exhaust();
    }
}

impl WorkerPool {
    /// Create a pool sized to the machine's available hardware parallelism.
    pub fn new() -> Self {
        Self::with_threads(num_cpus::get())
    }

    /// Create a pool with an explicit thread count. A count of one selects
    /// the inline strategy: no worker threads, no synchronization overhead.
    ///
    /// * `threads` - Number of worker threads.
    pub fn with_threads(threads: usize) -> Self {
        let range = Arc::new(WorkRange::default());
        let backend = if threads <= 1 {
            Backend::Inline { task: None }
        } else {
            Backend::Threaded {
                size: threads,
                shared: Arc::new(PoolShared {
                    range: Arc::clone(&range),
                    state: Mutex::new(PoolState {
                        task: None,
                        epoch: 0,
                        waiting: 0,
                        live: threads,
                        shutdown: false,
                    }),
                    work_ready: Condvar::new(),
                    all_parked: Condvar::new(),
                }),
                workers: Vec::new(),
            }
        };
        Self {
            range,
            num_indices: 0,
            finished: false,
            backend,
        }
    }

    /// Set the number of values the index should take on for the next run.
    /// Must be invoked from the thread that drives the pool, never while a
    /// run is in progress.
    ///
    /// * `count` - The index range is `[0, count)`.
    pub fn configure(&mut self, count: usize) {
        self.num_indices = count;
        self.range.reset(count);
    }

    /// Install the task to execute. A previously installed task is discarded
    /// immediately and `cleanup()` is never invoked on it.
    ///
    /// * `task` - The task to perform.
    pub fn set_task(&mut self, task: Arc<dyn IndexedTask>) {
        match &mut self.backend {
            Backend::Inline { task: slot } => *slot = Some(task),
            Backend::Threaded { shared, .. } => {
                shared.state.lock().unwrap().task = Some(task);
            }
        }
    }

    /// Execute the task over the configured range, blocking until every index
    /// has been executed and all workers are idle again. Worker threads are
    /// created on the first call and reused afterwards.
    pub fn run(&mut self) {
        assert!(!self.finished, "run() called after finish()");
        match &mut self.backend {
            Backend::Inline { task } => {
                let Some(task) = task else {
                    panic!("run() called before set_task()");
                };
                self.range.begin(self.num_indices);
                while let Some(index) = self.range.claim() {
                    task.execute(index);
                }
            }
            Backend::Threaded {
                size,
                shared,
                workers,
            } => {
                let task_installed = { shared.state.lock().unwrap().task.is_some() };
                if !task_installed {
                    panic!("run() called before set_task()");
                }
                if workers.is_empty() {
                    *workers = spawn_workers(shared, *size);
                }

                let mut state = shared.state.lock().unwrap();
                if state.live == 0 {
                    error!("no live workers remain in the pool; run() is a no-op");
                    return;
                }
                shared.range.begin(self.num_indices);
                state.waiting = 0;
                state.epoch += 1;
                shared.work_ready.notify_all();

                // Countdown barrier: wait for every live worker to drain the
                // range and park again before returning to the caller.
                while state.waiting < state.live {
                    state = shared.all_parked.wait(state).unwrap();
                }
            }
        }
    }

    /// Cancel a run which is in progress. Tasks currently executing are not
    /// interrupted, but no more indices are dispatched until the next run.
    pub fn cancel(&self) {
        self.range.exhaust();
    }

    /// Returns a handle with which a task, or another thread, can cancel the
    /// current run.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            range: Arc::clone(&self.range),
        }
    }

    /// Dispose of the worker threads, invoking the installed task's
    /// `cleanup()` exactly once per worker (once, synchronously, for the
    /// inline strategy). After this, `run()` must not be called again.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match &mut self.backend {
            Backend::Inline { task } => {
                if let Some(task) = task.take() {
                    task.cleanup();
                }
            }
            Backend::Threaded {
                shared, workers, ..
            } => {
                {
                    let mut state = shared.state.lock().unwrap();
                    state.shutdown = true;
                    shared.work_ready.notify_all();
                }
                for handle in workers.drain(..) {
                    if handle.join().is_err() {
                        error!("pool worker terminated abnormally during finish()");
                    }
                }
                shared.state.lock().unwrap().task = None;
            }
        }
    }

    /// Number of worker threads currently spawned. Zero for the inline
    /// strategy, and until the first `run()` for the threaded one.
    pub fn thread_count(&self) -> usize {
        match &self.backend {
            Backend::Inline { .. } => 0,
            Backend::Threaded { workers, .. } => workers.len(),
        }
    }

    /// Number of healthy workers. A worker whose task panicked no longer
    /// counts; the inline strategy has none.
    pub fn live_workers(&self) -> usize {
        match &self.backend {
            Backend::Inline { .. } => 0,
            Backend::Threaded { shared, .. } => shared.state.lock().unwrap().live,
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    /// Joining the workers on drop keeps a forgotten `finish()` from leaking
    /// parked threads.
    fn drop(&mut self) {
        self.finish();
    }
}

/// Spawn the pool's worker threads.
fn spawn_workers(shared: &Arc<PoolShared>, size: usize) -> Vec<JoinHandle<()>> {
    (0..size)
        .map(|i| {
            let shared = Arc::clone(shared);
            thread::Builder::new()
                .name(format!("worker-{}", i + 1))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn pool worker thread")
        })
        .collect()
}

/// Body of one worker thread: wait for a run, drain the cursor, rendezvous,
/// repeat. On shutdown the current task's `cleanup()` runs once before the
/// thread exits.
fn worker_loop(shared: &PoolShared) {
    let mut epoch = 0u64;
    loop {
        // Wait for the next run, or clean up and exit on shutdown.
        let task = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.shutdown {
                    let task = state.task.clone();
                    drop(state);
                    if let Some(task) = task {
                        task.cleanup();
                    }
                    return;
                }
                if state.epoch != epoch {
                    epoch = state.epoch;
                    break state.task.clone();
                }
                state = shared.work_ready.wait(state).unwrap();
            }
        };

        if let Some(task) = task {
            let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                while let Some(index) = shared.range.claim() {
                    task.execute(index);
                }
            }));
            if result.is_err() {
                // The worker is permanently lost. Report it and take this
                // worker out of the barrier so the controller still returns.
                let current = thread::current();
                error!(
                    "pool worker '{}' panicked and is lost; parallelism is reduced",
                    current.name().unwrap_or("?")
                );
                let mut state = shared.state.lock().unwrap();
                state.live -= 1;
                if state.waiting == state.live {
                    shared.all_parked.notify_one();
                }
                return;
            }
        }

        // Rendezvous: the last worker to park releases the controller.
        let mut state = shared.state.lock().unwrap();
        state.waiting += 1;
        if state.waiting == state.live {
            shared.all_parked.notify_one();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
