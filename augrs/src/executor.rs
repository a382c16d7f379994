//! Single-writer execution of tree operations.
//!
//! Every [`Handle`] to a tree feeds one FIFO queue drained by a dedicated
//! worker thread that owns the [`Augeas`] engine outright.  Operations run
//! one at a time in submission order; completions are delivered after the
//! operation has been applied.
//!
//! ```text
//!   Handle ─┐   (seq assigned under the queue lock)
//!   Handle ─┼──► mpsc::UnboundedSender<Task> ──► worker thread
//!   Handle ─┘                                    • owns Augeas
//!                                                • runs Task::job
//!                                                • job signals oneshot / callback
//! ```
//!
//! `close()` is itself queued.  When the worker reaches it the engine is
//! dropped and the channel closed; tasks already queued behind it, and any
//! submitted later, complete with [`Error::Closed`].  A task that panics
//! closes the tree the same way.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

use crate::config::TreeOptions;
use crate::engine::Augeas;
use crate::error::{Error, Result};
use crate::script::ScriptOutcome;

/// Name given to worker threads.
const WORKER_NAME: &str = "augrs-worker";

type Job = Box<dyn FnOnce(Option<&mut Augeas>) + Send>;

struct Task {
    seq: u64,
    close: bool,
    job: Job,
}

struct Queue {
    next_seq: u64,
    tx: mpsc::UnboundedSender<Task>,
}

struct Shared {
    queue: Mutex<Queue>,
    closed: Arc<AtomicBool>,
}

/// Cloneable, thread-safe handle to one tree.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("closed", &self.is_closed()).finish()
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

impl Handle {
    /// Build a tree on a new worker thread.
    pub async fn create(options: TreeOptions) -> Result<Handle> {
        let (tx, rx) = oneshot::channel();
        let handle = Self::spawn(move || Augeas::open(options), move |r| {
            let _ = tx.send(r);
        })?;
        rx.await.map_err(|_| Error::Closed)??;
        Ok(handle)
    }

    /// Blocking form of [`Handle::create`].  Must not be called from inside
    /// an async runtime.
    pub fn create_blocking(options: TreeOptions) -> Result<Handle> {
        let (tx, rx) = oneshot::channel();
        let handle = Self::spawn(move || Augeas::open(options), move |r| {
            let _ = tx.send(r);
        })?;
        rx.blocking_recv().map_err(|_| Error::Closed)??;
        Ok(handle)
    }

    /// Move an already constructed engine onto a worker thread.
    pub fn from_engine(aug: Augeas) -> Result<Handle> {
        Self::spawn(move || Ok(aug), |_| {})
    }

    fn spawn<B, R>(build: B, ready: R) -> Result<Handle>
    where
        B: FnOnce() -> Result<Augeas> + Send + 'static,
        R: FnOnce(Result<()>) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);
        std::thread::Builder::new().name(WORKER_NAME.to_owned()).spawn(move || {
            match build() {
                Ok(aug) => {
                    ready(Ok(()));
                    run_worker(aug, rx, worker_closed);
                }
                Err(e) => {
                    worker_closed.store(true, Ordering::SeqCst);
                    ready(Err(e));
                }
            }
        })?;
        let shared = Shared { queue: Mutex::new(Queue { next_seq: 0, tx }), closed };
        Ok(Handle { shared: Arc::new(shared) })
    }

    /// `true` once `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

fn run_worker(aug: Augeas, mut rx: mpsc::UnboundedReceiver<Task>, closed: Arc<AtomicBool>) {
    info!("worker started");
    let mut engine = Some(aug);
    let mut last_seq = None;
    while let Some(Task { seq, close, job }) = rx.blocking_recv() {
        debug_assert!(last_seq.map_or(true, |s| seq > s), "queue order violated");
        last_seq = Some(seq);
        trace!(seq, "running task");
        if close && engine.is_some() {
            // no new sends from here on; queued tasks still drain below
            closed.store(true, Ordering::SeqCst);
            rx.close();
            let _ = panic::catch_unwind(AssertUnwindSafe(|| job(engine.as_mut())));
            engine = None;
            info!(seq, "tree closed");
            continue;
        }
        if panic::catch_unwind(AssertUnwindSafe(|| job(engine.as_mut()))).is_err() && engine.is_some() {
            error!(seq, "task panicked, closing tree");
            closed.store(true, Ordering::SeqCst);
            rx.close();
            engine = None;
        }
    }
    debug!("worker stopped");
}

// ── Submission ────────────────────────────────────────────────────────────────

impl Handle {
    fn enqueue(&self, close: bool, job: Job) {
        let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = queue.next_seq;
        queue.next_seq += 1;
        match queue.tx.send(Task { seq, close, job }) {
            Ok(()) => trace!(seq, "submitted"),
            Err(mpsc::error::SendError(task)) => {
                drop(queue);
                debug!(seq, "submitted after close");
                (task.job)(None);
            }
        }
    }

    /// Queue `op` and invoke `callback` with its result.
    ///
    /// The callback runs exactly once on the worker thread after `op` has
    /// been applied.  If the tree is already closed it runs immediately on
    /// the calling thread with [`Error::Closed`].
    pub fn submit<T, F, C>(&self, op: F, callback: C)
    where
        T: Send + 'static,
        F: FnOnce(&mut Augeas) -> Result<T> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        self.enqueue(
            false,
            Box::new(move |aug| {
                let result = match aug {
                    Some(aug) => match panic::catch_unwind(AssertUnwindSafe(|| op(aug))) {
                        Ok(r) => r,
                        Err(payload) => {
                            callback(Err(Error::Closed));
                            panic::resume_unwind(payload);
                        }
                    },
                    None => Err(Error::Closed),
                };
                callback(result);
            }),
        );
    }

    /// Queue `op` now and return a future for its result.
    ///
    /// The operation is enqueued before this returns, so the order of calls
    /// is the order of application even if the futures are polled out of
    /// order.
    pub fn exec<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&mut Augeas) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(op, move |r| {
            let _ = tx.send(r);
        });
        async move { rx.await.map_err(|_| Error::Closed)? }
    }

    /// Queue `op` and block the calling thread until it completes.  Must not
    /// be called from inside an async runtime.
    pub fn exec_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Augeas) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(op, move |r| {
            let _ = tx.send(r);
        });
        rx.blocking_recv().map_err(|_| Error::Closed)?
    }

    fn close_job(tx: oneshot::Sender<Result<()>>) -> Job {
        Box::new(move |aug| {
            let _ = tx.send(if aug.is_some() { Ok(()) } else { Err(Error::Closed) });
        })
    }

    /// Release the tree.  Everything queued after this fails with
    /// [`Error::Closed`].
    pub fn close(&self) -> Pending<()> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(true, Self::close_job(tx));
        Box::pin(async move { rx.await.map_err(|_| Error::Closed)? })
    }

    pub fn close_blocking(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(true, Self::close_job(tx));
        rx.blocking_recv().map_err(|_| Error::Closed)?
    }
}

// ── Tree operations ───────────────────────────────────────────────────────────

/// Future returned by the queued operations.  The operation is already
/// enqueued when it is created.
pub type Pending<T> = std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

impl Handle {
    pub fn get(&self, path: &str) -> Pending<Option<String>> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.get(&path)))
    }

    pub fn get_blocking(&self, path: &str) -> Result<Option<String>> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.get(&path))
    }

    pub fn set(&self, path: &str, value: &str) -> Pending<()> {
        let (path, value) = (path.to_owned(), value.to_owned());
        Box::pin(self.exec(move |a| a.set(&path, &value)))
    }

    pub fn set_blocking(&self, path: &str, value: &str) -> Result<()> {
        let (path, value) = (path.to_owned(), value.to_owned());
        self.exec_blocking(move |a| a.set(&path, &value))
    }

    pub fn setm(&self, base: &str, sub: Option<&str>, value: Option<&str>) -> Pending<usize> {
        let (base, sub, value) = (base.to_owned(), sub.map(str::to_owned), value.map(str::to_owned));
        Box::pin(self.exec(move |a| a.setm(&base, sub.as_deref(), value.as_deref())))
    }

    pub fn setm_blocking(&self, base: &str, sub: Option<&str>, value: Option<&str>) -> Result<usize> {
        let (base, sub, value) = (base.to_owned(), sub.map(str::to_owned), value.map(str::to_owned));
        self.exec_blocking(move |a| a.setm(&base, sub.as_deref(), value.as_deref()))
    }

    pub fn matches(&self, path: &str) -> Pending<Vec<String>> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.matches(&path)))
    }

    pub fn matches_blocking(&self, path: &str) -> Result<Vec<String>> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.matches(&path))
    }

    pub fn nmatch(&self, path: &str) -> Pending<usize> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.nmatch(&path)))
    }

    pub fn nmatch_blocking(&self, path: &str) -> Result<usize> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.nmatch(&path))
    }

    pub fn rm(&self, path: &str) -> Pending<usize> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.rm(&path)))
    }

    pub fn rm_blocking(&self, path: &str) -> Result<usize> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.rm(&path))
    }

    pub fn mv(&self, src: &str, dst: &str) -> Pending<()> {
        let (src, dst) = (src.to_owned(), dst.to_owned());
        Box::pin(self.exec(move |a| a.mv(&src, &dst)))
    }

    pub fn mv_blocking(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (src.to_owned(), dst.to_owned());
        self.exec_blocking(move |a| a.mv(&src, &dst))
    }

    pub fn insert(&self, path: &str, label: &str, before: bool) -> Pending<()> {
        let (path, label) = (path.to_owned(), label.to_owned());
        Box::pin(self.exec(move |a| a.insert(&path, &label, before)))
    }

    pub fn insert_blocking(&self, path: &str, label: &str, before: bool) -> Result<()> {
        let (path, label) = (path.to_owned(), label.to_owned());
        self.exec_blocking(move |a| a.insert(&path, &label, before))
    }

    pub fn defvar(&self, name: &str, path: Option<&str>) -> Pending<()> {
        let (name, path) = (name.to_owned(), path.map(str::to_owned));
        Box::pin(self.exec(move |a| a.defvar(&name, path.as_deref())))
    }

    pub fn defvar_blocking(&self, name: &str, path: Option<&str>) -> Result<()> {
        let (name, path) = (name.to_owned(), path.map(str::to_owned));
        self.exec_blocking(move |a| a.defvar(&name, path.as_deref()))
    }

    pub fn defnode(&self, name: &str, path: &str, value: Option<&str>) -> Pending<bool> {
        let (name, path, value) = (name.to_owned(), path.to_owned(), value.map(str::to_owned));
        Box::pin(self.exec(move |a| a.defnode(&name, &path, value.as_deref())))
    }

    pub fn defnode_blocking(&self, name: &str, path: &str, value: Option<&str>) -> Result<bool> {
        let (name, path, value) = (name.to_owned(), path.to_owned(), value.map(str::to_owned));
        self.exec_blocking(move |a| a.defnode(&name, &path, value.as_deref()))
    }

    /// Run a script as one queued unit.  A failing command is reported in
    /// the outcome, not as an `Err`.
    pub fn srun(&self, commands: Vec<String>) -> Pending<ScriptOutcome> {
        Box::pin(self.exec(move |a| Ok(a.srun(&commands))))
    }

    pub fn srun_blocking(&self, commands: Vec<String>) -> Result<ScriptOutcome> {
        self.exec_blocking(move |a| Ok(a.srun(&commands)))
    }

    pub fn load(&self) -> Pending<()> {
        Box::pin(self.exec(Augeas::load))
    }

    pub fn load_blocking(&self) -> Result<()> {
        self.exec_blocking(Augeas::load)
    }

    /// See [`Augeas::save`]; per-file failures are in the error subtree.
    pub fn save(&self) -> Pending<bool> {
        Box::pin(self.exec(Augeas::save))
    }

    pub fn save_blocking(&self) -> Result<bool> {
        self.exec_blocking(Augeas::save)
    }

    pub fn print(&self, path: &str) -> Pending<Vec<(String, Option<String>)>> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.print(&path)))
    }

    pub fn print_blocking(&self, path: &str) -> Result<Vec<(String, Option<String>)>> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.print(&path))
    }

    pub fn clear(&self, path: &str) -> Pending<()> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.clear(&path)))
    }

    pub fn clear_blocking(&self, path: &str) -> Result<()> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.clear(&path))
    }

    pub fn touch(&self, path: &str) -> Pending<()> {
        let path = path.to_owned();
        Box::pin(self.exec(move |a| a.touch(&path)))
    }

    pub fn touch_blocking(&self, path: &str) -> Result<()> {
        let path = path.to_owned();
        self.exec_blocking(move |a| a.touch(&path))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
