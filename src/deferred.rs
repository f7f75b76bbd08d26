//! Pure deferred handles: nothing runs until the first force, which runs the
//! invocation on the forcing thread.
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;

use crate::attrs::Attributes;
use crate::cell::ResultCell;
use crate::error::{Failure, ForceError};
use crate::invocation::Invocation;
use crate::surface::{Promise, Surface};

struct Inner<T> {
    invocation: Mutex<Option<Invocation<T>>>,
    cell: ResultCell<T>,
    attrs: Attributes,
}

/// A lazily computed value.
///
/// Cloning is cheap and clones share everything: the pending invocation, the
/// cached outcome and the attributes. Forcing any clone resolves all of them.
///
/// Forcing a handle from inside its own invocation deadlocks.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Deferred<T> {
    /// Defers `f`. The closure owns whatever it captured from this point on.
    pub fn new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self::from_invocation(Invocation::new(f, ()))
    }

    pub fn from_invocation(invocation: Invocation<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                invocation: Mutex::new(Some(invocation)),
                cell: ResultCell::new(),
                attrs: Attributes::new(),
            }),
        }
    }

    /// A handle that is already resolved to `value`.
    pub fn ready(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                invocation: Mutex::new(None),
                cell: ResultCell::resolved(value),
                attrs: Attributes::new(),
            }),
        }
    }

    /// Storage belonging to the handle, not to the value. Never forces.
    pub fn attrs(&self) -> &Attributes {
        &self.inner.attrs
    }

    /// The cached outcome, if there is one. Never forces.
    pub fn peek(&self) -> Option<Result<&T, ForceError>> {
        self.inner.cell.get()
    }

    /// Forces the handle and clones the value out.
    pub fn into_value(self) -> Result<T, ForceError>
    where
        T: Clone,
    {
        self.force().cloned()
    }

    /// Returns `true` if both handles are clones of one another.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Promise for Deferred<T> {
    type Value = T;

    fn force(&self) -> Result<&T, ForceError> {
        self.inner.cell.resolve_with(|| {
            let invocation = self
                .inner
                .invocation
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            let Some(invocation) = invocation else {
                return Err(Failure::Panic("invocation was already consumed".into()).into());
            };

            let span = tracing::span!(Level::DEBUG, "deferred", callable = invocation.callable());
            let _enter = span.enter();

            let outcome = invocation.run();
            if let Err(err) = &outcome {
                tracing::debug!("invocation failed: {err}");
            }
            outcome
        })
    }

    fn is_resolved(&self) -> bool {
        self.inner.cell.is_resolved()
    }
}

impl<T> Surface for Deferred<T> {}

crate::delegate!(Deferred);
