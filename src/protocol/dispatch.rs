//! # Invocation Dispatcher
//!
//! Moves received-packet and connection-event callbacks off the network and
//! crypto threads onto a dedicated execution context. One capability set
//! (`assign`, `start`, `invoke`, `invoke_async`, `queue_work_item`) backed
//! by interchangeable strategies selected at construction:
//!
//! - **pooled-timer**: a worker thread drains a concurrent queue each tick,
//!   running callbacks serially, then sleeps an idle delay (default 10 ms)
//!   when the queue was empty or continues immediately when work remains;
//! - **externally-driven**: `start()` is a no-op and every submission is
//!   marshaled onto a caller-supplied Tokio runtime, drained serially by a
//!   single pump task.
//!
//! Callbacks receive the owner's cancellation token and must exit promptly
//! once teardown begins. The worker checks the token before each tick and
//! permanently stops once it is set; work items still queued at that point
//! are discarded and their completions fail. `invoke` from inside a callback
//! on the same dispatcher would deadlock, since the calling thread would
//! wait on a queue only it can drain; it is rejected with an invalid-operation
//! error instead.
//!
//! Panics escaping a callback are policy-gated: either caught and reported
//! to the configured handler (the connection closes gracefully), or allowed
//! to propagate as a fatal, process-visible panic. Never both, never
//! silently swallowed.

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{constants, Result, TransportError};

/// Default idle-sleep delay for the pooled-timer strategy.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(10);

/// A unit of deferred work. Destroyed once executed (and its completion
/// signaled) or discarded on shutdown before execution.
pub type Callback = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// Receives the description of a caught callback panic.
pub type PanicHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Dispatcher tuning knobs.
#[derive(Clone)]
pub struct DispatchOptions {
    /// Sleep between pooled-timer ticks when the queue was empty.
    pub idle_delay: Duration,
    /// Catch panics escaping callbacks and report them, instead of letting
    /// them take the worker (and the process's view of it) down.
    pub catch_callback_panics: bool,
    /// Invoked with a panic description when `catch_callback_panics` is set.
    pub panic_handler: Option<PanicHandler>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            idle_delay: DEFAULT_IDLE_DELAY,
            catch_callback_panics: true,
            panic_handler: None,
        }
    }
}

impl From<&crate::config::DispatchConfig> for DispatchOptions {
    fn from(config: &crate::config::DispatchConfig) -> Self {
        Self {
            idle_delay: config.idle_delay,
            catch_callback_panics: config.catch_application_exceptions,
            panic_handler: None,
        }
    }
}

struct WorkItem {
    callback: Callback,
    completion: Option<mpsc::Sender<()>>,
}

/// Handle resolving once the submitted callback has finished executing.
pub struct Completion {
    rx: mpsc::Receiver<()>,
}

impl Completion {
    /// Block until the callback ran.
    ///
    /// # Errors
    /// `TransportError::Cancelled` if the work item was discarded before
    /// execution (dispatcher shutdown).
    pub fn wait(&self) -> Result<()> {
        self.rx.recv().map_err(|_| TransportError::Cancelled)
    }

    /// Non-blocking poll; true once the callback ran.
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

enum Strategy {
    PooledTimer {
        queue: Mutex<VecDeque<WorkItem>>,
        started: AtomicBool,
    },
    External {
        tx: UnboundedSender<WorkItem>,
    },
}

struct DispatcherCore {
    strategy: Strategy,
    token: Mutex<CancellationToken>,
    options: DispatchOptions,
}

thread_local! {
    /// Core pointer of the dispatcher currently running a callback on this
    /// thread; used to reject re-entrant `invoke`.
    static ACTIVE_DISPATCH: Cell<usize> = const { Cell::new(0) };
}

impl DispatcherCore {
    fn current_token(&self) -> CancellationToken {
        self.token.lock().expect("dispatcher token lock").clone()
    }

    fn discard_queued(&self) {
        if let Strategy::PooledTimer { queue, .. } = &self.strategy {
            let dropped = {
                let mut queue = queue.lock().expect("dispatcher queue lock");
                let dropped = queue.len();
                queue.clear();
                dropped
            };
            if dropped > 0 {
                debug!(dropped, "discarded queued work items on shutdown");
            }
        }
    }
}

fn run_item(core: &Arc<DispatcherCore>, item: WorkItem, token: &CancellationToken) {
    let marker = Arc::as_ptr(core) as usize;
    ACTIVE_DISPATCH.with(|active| active.set(marker));

    if core.options.catch_callback_panics {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (item.callback)(token)));
        if let Err(payload) = outcome {
            let message = panic_message(&payload);
            error!(message = %message, "callback panicked; reporting per policy");
            if let Some(handler) = &core.options.panic_handler {
                handler(&message);
            }
        }
    } else {
        // A panic here unwinds through the worker: fatal and process-visible.
        (item.callback)(token);
    }

    ACTIVE_DISPATCH.with(|active| active.set(0));
    if let Some(completion) = item.completion {
        let _ = completion.send(());
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop(core: Arc<DispatcherCore>) {
    let Strategy::PooledTimer { queue, .. } = &core.strategy else {
        unreachable!("worker loop only runs for the pooled-timer strategy")
    };
    loop {
        let token = core.current_token();
        if token.is_cancelled() {
            core.discard_queued();
            debug!("dispatcher worker stopped");
            return;
        }

        let batch: Vec<WorkItem> = {
            let mut queue = queue.lock().expect("dispatcher queue lock");
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            thread::sleep(core.options.idle_delay);
            continue;
        }
        for item in batch {
            if token.is_cancelled() {
                // Remaining items of the batch are dropped with the Vec.
                break;
            }
            run_item(&core, item, &token);
        }
    }
}

async fn pump_loop(core: Arc<DispatcherCore>, mut rx: UnboundedReceiver<WorkItem>) {
    while let Some(item) = rx.recv().await {
        let token = core.current_token();
        if token.is_cancelled() {
            drop(item);
            continue;
        }
        run_item(&core, item, &token);
    }
}

/// Cross-thread callback scheduler. Cheap to clone; clones share the same
/// queue and context.
#[derive(Clone)]
pub struct Dispatcher {
    core: Arc<DispatcherCore>,
}

impl Dispatcher {
    /// Pooled-timer strategy: a dedicated worker thread started by
    /// [`start`](Self::start).
    pub fn pooled_timer(options: DispatchOptions) -> Self {
        Self {
            core: Arc::new(DispatcherCore {
                strategy: Strategy::PooledTimer {
                    queue: Mutex::new(VecDeque::new()),
                    started: AtomicBool::new(false),
                },
                token: Mutex::new(CancellationToken::new()),
                options,
            }),
        }
    }

    /// Externally-driven strategy: submissions are marshaled onto `handle`'s
    /// runtime and drained serially by a pump task spawned here.
    pub fn externally_driven(handle: &tokio::runtime::Handle, options: DispatchOptions) -> Self {
        let (tx, rx) = unbounded_channel();
        let dispatcher = Self {
            core: Arc::new(DispatcherCore {
                strategy: Strategy::External { tx },
                token: Mutex::new(CancellationToken::new()),
                options,
            }),
        };
        handle.spawn(pump_loop(dispatcher.core.clone(), rx));
        dispatcher
    }

    /// Bind the dispatcher to its owner's teardown signal. Callbacks receive
    /// this token; once it is cancelled no further callback executes.
    pub fn assign(&self, owner: CancellationToken) {
        *self.core.token.lock().expect("dispatcher token lock") = owner;
    }

    /// Start the pooled-timer worker. Idempotent; a no-op for the
    /// externally-driven strategy. Submissions made before `start` are
    /// drained in submission order on the first tick.
    pub fn start(&self) {
        if let Strategy::PooledTimer { started, .. } = &self.core.strategy {
            if !started.swap(true, Ordering::SeqCst) {
                let core = self.core.clone();
                thread::Builder::new()
                    .name("transport-dispatch".into())
                    .spawn(move || worker_loop(core))
                    .expect("failed to spawn dispatcher worker");
            }
        }
    }

    /// Run `callback` on the dispatcher context and block until it finished.
    ///
    /// # Errors
    /// - `TransportError::InvalidOperation` when called from a callback
    ///   already running on this dispatcher (would deadlock).
    /// - `TransportError::Cancelled` when the dispatcher shut down before
    ///   the callback could run.
    pub fn invoke(&self, callback: Callback) -> Result<()> {
        let marker = Arc::as_ptr(&self.core) as usize;
        if ACTIVE_DISPATCH.with(|active| active.get()) == marker {
            return Err(TransportError::InvalidOperation(
                constants::ERR_REENTRANT_INVOKE,
            ));
        }
        let completion = self.submit(callback, true)?;
        completion.expect("blocking submission carries a completion").wait()
    }

    /// Run `callback` on the dispatcher context without blocking; the
    /// returned completion resolves once it finished.
    pub fn invoke_async(&self, callback: Callback) -> Result<Completion> {
        let completion = self.submit(callback, true)?;
        Ok(completion.expect("async submission carries a completion"))
    }

    /// Fire-and-forget submission with no completion signal.
    pub fn queue_work_item(&self, callback: Callback) {
        // Shutdown races drop the item, which is the documented outcome.
        let _ = self.submit(callback, false);
    }

    /// Cancel the bound token: the worker stops permanently and queued,
    /// unexecuted items are discarded.
    pub fn shutdown(&self) {
        self.core.current_token().cancel();
        self.core.discard_queued();
    }

    fn submit(&self, callback: Callback, with_completion: bool) -> Result<Option<Completion>> {
        let token = self.core.current_token();
        if token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let (completion_tx, completion) = if with_completion {
            let (tx, rx) = mpsc::channel();
            (Some(tx), Some(Completion { rx }))
        } else {
            (None, None)
        };
        let item = WorkItem {
            callback,
            completion: completion_tx,
        };

        match &self.core.strategy {
            Strategy::PooledTimer { queue, .. } => {
                queue.lock().expect("dispatcher queue lock").push_back(item);
                // Re-check: a shutdown between the gate above and the push
                // would leave the item stranded in a queue nobody drains.
                if token.is_cancelled() {
                    self.core.discard_queued();
                    return Err(TransportError::Cancelled);
                }
            }
            Strategy::External { tx } => {
                if tx.send(item).is_err() {
                    warn!("dispatcher pump is gone; dropping work item");
                    return Err(TransportError::InvalidOperation(
                        constants::ERR_DISPATCHER_STOPPED,
                    ));
                }
            }
        }
        Ok(completion)
    }
}
