use std::{
    fmt::Debug,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use futures_channel::oneshot;
use parking_lot::{Condvar, Mutex};

use crate::{
    errors::{Cancelled, InstantiationError},
    types::DynError,
};

/// Cooperative cancellation handed to a lazily run producer
///
/// Threads can not be interrupted, so a producer which outlived its deadline
/// is only asked to stop. Whatever it still returns is dropped.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);
impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Errors once cancelled - use with `?` between expensive steps
    pub fn check(&self) -> Result<(), Cancelled> {
        match self.is_cancelled() {
            true => Err(Cancelled),
            false => Ok(()),
        }
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

type Producer<T> = Box<dyn FnOnce(&Cancellation) -> Result<T, DynError> + Send>;

/// At most once, lazily computed value
///
/// The producer runs on first demand only. Concurrent callers wait for the single
/// in-flight computation, and every caller observes the same outcome - the value or
/// the cached error. A cell never retries.
pub struct LazyCell<T>(Arc<LazyInner<T>>);
impl<T> Clone for LazyCell<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
impl<T> Debug for LazyCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.0.state.lock() {
            CellState::Pending(_) => "pending",
            CellState::Running { .. } => "running",
            CellState::Done => "done",
        };
        f.debug_struct("LazyCell")
            .field("worker", &self.0.worker_name)
            .field("state", &state)
            .finish()
    }
}

struct LazyInner<T> {
    once: OnceLock<Result<T, InstantiationError>>,
    state: Mutex<CellState<T>>,
    worker_name: String,
}

enum CellState<T> {
    Pending(Producer<T>),
    /// Waiters are informed once the result is set
    Running {
        waiters: Vec<oneshot::Sender<()>>,
    },
    Done,
}

/// What a caller has to do after inspecting the cell
enum Role<T> {
    Leader(Producer<T>),
    Waiter(oneshot::Receiver<()>),
    Ready,
}

/// Outcome of [LazyCell::get_with]
pub struct Forced<T> {
    pub result: Result<T, InstantiationError>,
    /// This call ran the producer
    pub computed: bool,
}

impl<T: Clone + Send + 'static> LazyCell<T> {
    pub fn new(
        producer: impl FnOnce(&Cancellation) -> Result<T, DynError> + Send + 'static,
    ) -> Self {
        Self::named("lazy-cell", producer)
    }

    /// Names the worker thread used for bounded computations
    pub fn named(
        worker_name: impl Into<String>,
        producer: impl FnOnce(&Cancellation) -> Result<T, DynError> + Send + 'static,
    ) -> Self {
        Self(Arc::new(LazyInner {
            once: OnceLock::new(),
            state: Mutex::new(CellState::Pending(Box::new(producer))),
            worker_name: worker_name.into(),
        }))
    }

    /// Gets the value, computing it on first demand
    ///
    /// With a timeout the producer runs on a worker thread and is abandoned once the
    /// timeout elapses. Without one it runs on the calling thread.
    pub fn get(&self, timeout: Option<Duration>) -> Result<T, InstantiationError> {
        self.get_with(timeout, || {}, |_| {}).result
    }

    /// Like [LazyCell::get], with hooks around the computation
    ///
    /// Both hooks only run for the call that computes. `on_complete` sees the outcome
    /// before any waiting caller is released. A panicking hook still completes the cell,
    /// with the computed outcome or [InstantiationError::Aborted] if the producer never ran.
    pub fn get_with(
        &self,
        timeout: Option<Duration>,
        on_start: impl FnOnce(),
        on_complete: impl FnOnce(&Result<T, InstantiationError>),
    ) -> Forced<T> {
        let role = {
            let mut state = self.0.state.lock();
            match std::mem::replace(&mut *state, CellState::Done) {
                CellState::Done => Role::Ready,
                CellState::Running { mut waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    *state = CellState::Running { waiters };
                    Role::Waiter(rx)
                }
                CellState::Pending(producer) => {
                    *state = CellState::Running {
                        waiters: Vec::new(),
                    };
                    Role::Leader(producer)
                }
            }
        };

        match role {
            Role::Ready => Forced {
                result: self.cached(),
                computed: false,
            },
            Role::Waiter(rx) => {
                // Canceled only if the leader vanished without a result
                let _ = futures::executor::block_on(rx);
                Forced {
                    result: self.cached(),
                    computed: false,
                }
            }
            Role::Leader(producer) => {
                // Completes the cell even if a hook unwinds
                let mut completion = Completion {
                    cell: self,
                    result: None,
                };
                on_start();
                let result = self.compute(producer, timeout);
                completion.result = Some(result.clone());
                on_complete(&result);
                drop(completion);
                Forced {
                    result,
                    computed: true,
                }
            }
        }
    }

    /// Result of a completed computation, without triggering it
    pub fn peek(&self) -> Option<Result<T, InstantiationError>> {
        self.0.once.get().cloned()
    }

    pub fn is_done(&self) -> bool {
        self.0.once.get().is_some()
    }

    fn cached(&self) -> Result<T, InstantiationError> {
        self.peek().unwrap_or(Err(InstantiationError::Aborted))
    }

    fn complete(&self, result: Result<T, InstantiationError>) {
        // Only the leader sets the result - it can't be set twice
        let _ = self.0.once.set(result);

        let waiters = match std::mem::replace(&mut *self.0.state.lock(), CellState::Done) {
            CellState::Running { waiters } => waiters,
            _ => Vec::new(),
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    fn compute(
        &self,
        producer: Producer<T>,
        timeout: Option<Duration>,
    ) -> Result<T, InstantiationError> {
        let cancellation = Cancellation::new();
        match timeout {
            None => run_guarded(producer, &cancellation),
            Some(timeout) => self.compute_bounded(producer, cancellation, timeout),
        }
    }

    fn compute_bounded(
        &self,
        producer: Producer<T>,
        cancellation: Cancellation,
        timeout: Duration,
    ) -> Result<T, InstantiationError> {
        let handoff = Arc::new(Handoff::default());
        let worker_handoff = handoff.clone();
        let worker_cancellation = cancellation.clone();
        let worker_name = self.0.worker_name.clone();

        let spawned = thread::Builder::new()
            .name(self.0.worker_name.clone())
            .spawn(move || {
                let result = run_guarded(producer, &worker_cancellation);
                let mut slot = worker_handoff.result.lock();
                if worker_cancellation.is_cancelled() {
                    if result.is_ok() {
                        tracing::warn!(
                            "{worker_name} finished after its deadline, discarding the late instance"
                        );
                    }
                    return;
                }
                *slot = Some(result);
                worker_handoff.ready.notify_one();
            });
        if let Err(error) = spawned {
            return Err(InstantiationError::Failed(Arc::new(DynError::from(error))));
        }

        let deadline = Instant::now() + timeout;
        let mut slot = handoff.result.lock();
        while slot.is_none() {
            if handoff.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        match slot.take() {
            Some(result) => result,
            None => {
                // Cancelled under the lock, the worker can't hand over anymore
                cancellation.cancel();
                tracing::error!(
                    "{} did not finish within {:?}, cancelling it",
                    self.0.worker_name,
                    timeout
                );
                Err(InstantiationError::Timeout { after: timeout })
            }
        }
    }
}

/// Result slot shared between a leader and its bounded worker
struct Handoff<T> {
    result: Mutex<Option<Result<T, InstantiationError>>>,
    ready: Condvar,
}
impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

/// Sets the leader's result when dropped
struct Completion<'a, T: Clone + Send + 'static> {
    cell: &'a LazyCell<T>,
    result: Option<Result<T, InstantiationError>>,
}
impl<T: Clone + Send + 'static> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or_else(|| {
            tracing::error!("{} was abandoned before computing", self.cell.0.worker_name);
            Err(InstantiationError::Aborted)
        });
        self.cell.complete(result);
    }
}

fn run_guarded<T>(
    producer: Producer<T>,
    cancellation: &Cancellation,
) -> Result<T, InstantiationError> {
    match panic::catch_unwind(AssertUnwindSafe(|| producer(cancellation))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(InstantiationError::Failed(Arc::new(error))),
        Err(_) => {
            tracing::error!("Producer panicked, the cell is completed as aborted");
            Err(InstantiationError::Aborted)
        }
    }
}
