//! Blocking request engine over a single async transport
//!
//! Any number of caller threads issue blocking [`SyncNetworkEngine::execute`]
//! calls; the actual HTTP exchange runs on one dedicated worker thread that
//! owns the transport object. Callers reach the worker only through a
//! message-passing channel, so the transport's thread affinity never leaks
//! out of this module.
//!
//! Caller-side protocol, per request:
//! 1. increment the pending count under the engine mutex
//! 2. hand the job to the worker and block on the `completed` condition until
//!    the exchange finishes, a cancel is requested, or (HEAD only) the
//!    response headers have arrived
//! 3. on cancel, abort the in-flight work on the worker
//! 4. decrement the pending count; at zero, clear the cancel flag and wake
//!    `wait_for_all` waiters

pub mod transport;

pub use transport::{HttpsTransport, Transport, TransportError, WireRequest, WireResponse};

use bytes::Bytes;
use hyper::Method;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use transport::ResponseHead;

#[derive(Debug, Default)]
struct EngineState {
    pending: usize,
    cancel_requested: bool,
}

#[derive(Debug, Default)]
struct EngineShared {
    state: Mutex<EngineState>,
    completed: Condvar,
    all_idle: Condvar,
}

impl EngineShared {
    fn cancel_requested(&self) -> bool {
        self.state.lock().expect("engine lock poisoned").cancel_requested
    }

    /// Wakes every blocked caller. Taking the lock first pairs the wake with
    /// the flag stores so no caller can sleep through it.
    fn wake_completed(&self) {
        let _state = self.state.lock().expect("engine lock poisoned");
        self.completed.notify_all();
    }
}

/// Per-request result slot shared between the caller and the worker.
#[derive(Default)]
struct RequestSlot {
    headers_arrived: AtomicBool,
    finished: AtomicBool,
    outcome: Mutex<Option<Result<WireResponse, TransportError>>>,
}

struct Job {
    request: WireRequest,
    slot: Arc<RequestSlot>,
}

/// Bridges blocking callers to the async transport.
pub struct SyncNetworkEngine {
    shared: Arc<EngineShared>,
    cancel: Arc<Notify>,
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SyncNetworkEngine {
    /// Starts the worker thread and hands it ownership of the transport.
    pub fn new(transport: Box<dyn Transport + Send>) -> Self {
        let shared = Arc::new(EngineShared::default());
        let cancel = Arc::new(Notify::new());
        let (jobs, rx) = mpsc::unbounded_channel();

        let worker = spawn_worker(transport, rx, shared.clone(), cancel.clone());

        Self {
            shared,
            cancel,
            jobs: Some(jobs),
            worker: Some(worker),
        }
    }

    /// Executes a request, blocking the calling thread until the exchange
    /// completes, `cancel_all` fires, or (HEAD) response headers arrive.
    pub fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let is_head = request.method == Method::HEAD;

        {
            let mut state = self.shared.state.lock().expect("engine lock poisoned");
            state.pending += 1;
        }

        let slot = Arc::new(RequestSlot::default());
        let sent = self
            .jobs
            .as_ref()
            .expect("engine sender live until drop")
            .send(Job {
                request,
                slot: slot.clone(),
            })
            .is_ok();

        let result = if !sent {
            Err(TransportError::WorkerStopped)
        } else {
            let cancel_requested = {
                let mut state = self.shared.state.lock().expect("engine lock poisoned");
                while !(slot.finished.load(Ordering::Acquire)
                    || state.cancel_requested
                    || (is_head && slot.headers_arrived.load(Ordering::Acquire)))
                {
                    state = self
                        .shared
                        .completed
                        .wait(state)
                        .expect("engine lock poisoned");
                }
                state.cancel_requested
            };

            if cancel_requested {
                // Abort whatever is still in flight on the worker.
                self.cancel.notify_waiters();
            }

            let outcome = slot.outcome.lock().expect("request slot lock poisoned").take();
            match outcome {
                Some(result) => result,
                None if cancel_requested => Err(TransportError::Canceled),
                None => Err(TransportError::WorkerStopped),
            }
        };

        {
            let mut state = self.shared.state.lock().expect("engine lock poisoned");
            state.pending -= 1;
            if state.pending == 0 {
                state.cancel_requested = false;
                self.shared.all_idle.notify_all();
            }
        }

        result
    }

    /// Cancels every in-flight request. The cancel state stays in effect until
    /// the engine drains to zero pending requests; new requests may still be
    /// submitted. No-op when nothing is pending.
    pub fn cancel_all(&self) {
        {
            let mut state = self.shared.state.lock().expect("engine lock poisoned");
            if state.pending == 0 {
                return;
            }
            state.cancel_requested = true;
            self.shared.completed.notify_all();
        }
        self.cancel.notify_waiters();
    }

    /// Blocks until no requests are pending. Returns immediately when idle.
    pub fn wait_for_all(&self) {
        let mut state = self.shared.state.lock().expect("engine lock poisoned");
        while state.pending > 0 {
            state = self
                .shared
                .all_idle
                .wait(state)
                .expect("engine lock poisoned");
        }
    }

    /// Snapshot of the number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().expect("engine lock poisoned").pending
    }
}

impl Drop for SyncNetworkEngine {
    fn drop(&mut self) {
        let pending = self.pending_count();
        if pending > 0 {
            tracing::warn!(pending, "network engine dropped with requests in flight");
        }
        // Closing the channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn spawn_worker(
    transport: Box<dyn Transport + Send>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    shared: Arc<EngineShared>,
    cancel: Arc<Notify>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("s3bridge-net".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "failed to start network worker runtime");
                    fail_all(rx, &shared);
                    return;
                }
            };

            let local = tokio::task::LocalSet::new();
            local.block_on(&runtime, async move {
                let transport: Rc<dyn Transport + Send> = Rc::from(transport);
                while let Some(job) = rx.recv().await {
                    tokio::task::spawn_local(run_job(
                        transport.clone(),
                        job,
                        shared.clone(),
                        cancel.clone(),
                    ));
                }
            });
        })
        .expect("failed to spawn network worker thread")
}

/// Fallback when the worker runtime cannot start: fail each submitted job so
/// callers unblock with an error instead of hanging.
fn fail_all(mut rx: mpsc::UnboundedReceiver<Job>, shared: &EngineShared) {
    while let Some(job) = rx.blocking_recv() {
        *job.slot.outcome.lock().expect("request slot lock poisoned") =
            Some(Err(TransportError::WorkerStopped));
        job.slot.finished.store(true, Ordering::Release);
        shared.wake_completed();
    }
}

async fn run_job(
    transport: Rc<dyn Transport + Send>,
    job: Job,
    shared: Arc<EngineShared>,
    cancel: Arc<Notify>,
) {
    let Job { request, slot } = job;
    let is_head = request.method == Method::HEAD;

    let mut guard = CompletionGuard {
        slot,
        shared,
        is_head,
        done: false,
    };
    let result = drive(
        transport.as_ref(),
        request,
        is_head,
        guard.slot.as_ref(),
        guard.shared.as_ref(),
        cancel.as_ref(),
    )
    .await;
    guard.record(result);
}

async fn drive(
    transport: &dyn Transport,
    request: WireRequest,
    is_head: bool,
    slot: &RequestSlot,
    shared: &EngineShared,
    cancel: &Notify,
) -> Result<WireResponse, TransportError> {
    if shared.cancel_requested() {
        return Err(TransportError::Canceled);
    }

    let head = tokio::select! {
        _ = cancel.notified() => return Err(TransportError::Canceled),
        head = transport.begin(request) => head?,
    };
    let ResponseHead {
        status,
        headers,
        body,
    } = head;

    if is_head {
        // Header arrival is completion for HEAD; the body is never read
        // because S3 may hold the connection open until its own timeout.
        return Ok(WireResponse {
            status,
            headers,
            body: Bytes::new(),
        });
    }

    slot.headers_arrived.store(true, Ordering::Release);
    shared.wake_completed();

    if shared.cancel_requested() {
        return Err(TransportError::Canceled);
    }
    let body = tokio::select! {
        _ = cancel.notified() => return Err(TransportError::Canceled),
        body = body => body?,
    };

    Ok(WireResponse {
        status,
        headers,
        body,
    })
}

/// Writes the job outcome exactly once, including when the worker is torn
/// down mid-request and the future is dropped.
struct CompletionGuard {
    slot: Arc<RequestSlot>,
    shared: Arc<EngineShared>,
    is_head: bool,
    done: bool,
}

impl CompletionGuard {
    fn record(&mut self, result: Result<WireResponse, TransportError>) {
        if self.done {
            return;
        }
        self.done = true;
        *self
            .slot
            .outcome
            .lock()
            .expect("request slot lock poisoned") = Some(result);
        self.slot.finished.store(true, Ordering::Release);
        if self.is_head {
            // The outcome is recorded before the header flag so a HEAD caller
            // woken by the flag always finds it.
            self.slot.headers_arrived.store(true, Ordering::Release);
        }
        self.shared.wake_completed();
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.done {
            self.record(Err(TransportError::WorkerStopped));
        }
    }
}
