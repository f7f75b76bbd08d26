//! Futures backed by a dedicated OS thread, started at construction.
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::Level;

use crate::attrs::Attributes;
use crate::cell::{ResultCell, panic_message};
use crate::error::{Failure, ForceError};
use crate::invocation::Invocation;
use crate::surface::{Promise, Surface};

const DEFAULT_THREAD_NAME: &str = "deferral-worker";

type Worker<T> = io::Result<JoinHandle<Result<T, ForceError>>>;

struct Inner<T> {
    worker: Mutex<Option<Worker<T>>>,
    cell: ResultCell<T>,
    attrs: Attributes,
}

/// A value being computed on a background thread.
///
/// The thread starts as soon as the future is built; construction never
/// waits for it. The first force joins the thread and caches its outcome,
/// concurrent forcers wait for that join. A panic on the worker thread is
/// reported as [`Failure::Panic`], and failing to spawn the thread at all as
/// [`Failure::Io`] on the first force.
///
/// Dropping every clone without forcing detaches the thread.
pub struct ThreadFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> ThreadFuture<T> {
    pub fn spawn<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::from_invocation(Invocation::new(f, ()))
    }

    pub fn from_invocation(invocation: Invocation<T>) -> Self {
        Self::with_name(DEFAULT_THREAD_NAME, invocation)
    }

    /// Starts `invocation` on a thread called `name`.
    pub fn with_name(name: impl Into<String>, invocation: Invocation<T>) -> Self {
        let callable = invocation.callable();

        let worker = thread::Builder::new().name(name.into()).spawn(move || {
            let span = tracing::span!(Level::DEBUG, "thread_future", callable);
            let _enter = span.enter();
            invocation.run()
        });

        if let Err(err) = &worker {
            tracing::warn!("couldn't spawn worker thread for {callable}: {err}");
        }

        Self {
            inner: Arc::new(Inner {
                worker: Mutex::new(Some(worker)),
                cell: ResultCell::new(),
                attrs: Attributes::new(),
            }),
        }
    }
}

impl<T> ThreadFuture<T> {
    /// A future that already failed with `err`, without spawning anything.
    pub(crate) fn failed(err: ForceError) -> Self {
        Self {
            inner: Arc::new(Inner {
                worker: Mutex::new(None),
                cell: ResultCell::failed(err),
                attrs: Attributes::new(),
            }),
        }
    }

    /// Whether the worker is done. Never blocks.
    pub fn is_finished(&self) -> bool {
        if self.inner.cell.is_resolved() {
            return true;
        }

        match &*self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(Ok(handle)) => handle.is_finished(),
            Some(Err(_)) => true,
            // Another thread is joining right now.
            None => false,
        }
    }

    pub fn attrs(&self) -> &Attributes {
        &self.inner.attrs
    }

    pub fn peek(&self) -> Option<Result<&T, ForceError>> {
        self.inner.cell.get()
    }

    pub fn into_value(self) -> Result<T, ForceError>
    where
        T: Clone,
    {
        self.force().cloned()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for ThreadFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Promise for ThreadFuture<T> {
    type Value = T;

    fn force(&self) -> Result<&T, ForceError> {
        self.inner.cell.resolve_with(|| {
            let worker = self
                .inner
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            match worker {
                Some(Ok(handle)) => {
                    tracing::trace!("joining {:?}", handle.thread().name());
                    match handle.join() {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(Failure::Panic(panic_message(&*payload)).into()),
                    }
                }
                Some(Err(err)) => Err(Failure::Io(err).into()),
                None => Err(Failure::Panic("worker was already joined".into()).into()),
            }
        })
    }

    fn is_resolved(&self) -> bool {
        self.inner.cell.is_resolved()
    }
}

impl<T> Surface for ThreadFuture<T> {}

crate::delegate!(ThreadFuture);
