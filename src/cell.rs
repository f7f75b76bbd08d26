//! The once-resolved cache behind every handle.
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::error::{Failure, ForceError};

/// Holds the outcome of a target invocation: unresolved, a value, or an error.
///
/// Resolution happens at most once and is never undone. Concurrent callers of
/// [`ResultCell::resolve_with`] are serialized: the first one runs the
/// resolver, the others block until it is done and then observe its outcome.
pub struct ResultCell<T> {
    slot: OnceLock<Result<T, ForceError>>,
}

impl<T> ResultCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// A cell that already holds `value`.
    pub fn resolved(value: T) -> Self {
        Self {
            slot: OnceLock::from(Ok(value)),
        }
    }

    /// A cell that already holds `err`.
    pub fn failed(err: ForceError) -> Self {
        Self {
            slot: OnceLock::from(Err(err)),
        }
    }

    /// Returns the outcome, running `resolver` first if the cell is still
    /// unresolved. A panic inside `resolver` is captured as
    /// [`Failure::Panic`] and becomes the cell's permanent outcome.
    ///
    /// Calling this from within `resolver` on the same cell deadlocks.
    pub fn resolve_with<F>(&self, resolver: F) -> Result<&T, ForceError>
    where
        F: FnOnce() -> Result<T, ForceError>,
    {
        let outcome = self.slot.get_or_init(|| {
            panic::catch_unwind(AssertUnwindSafe(resolver))
                .unwrap_or_else(|payload| Err(Failure::Panic(panic_message(&*payload)).into()))
        });

        outcome.as_ref().map_err(Clone::clone)
    }

    /// Peeks at the outcome without blocking or resolving.
    pub fn get(&self) -> Option<Result<&T, ForceError>> {
        self.slot
            .get()
            .map(|outcome| outcome.as_ref().map_err(Clone::clone))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            None => f.write_str("Unresolved"),
            Some(Ok(value)) => f.debug_tuple("ResolvedValue").field(value).finish(),
            Some(Err(err)) => f.debug_tuple("ResolvedError").field(err).finish(),
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_resolves_once() {
        let cell = ResultCell::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cell.resolve_with(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            });
            assert_eq!(value.unwrap(), &42);
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_is_replayed() {
        let cell: ResultCell<i32> = ResultCell::new();

        let first = cell
            .resolve_with(|| Err(ForceError::invocation(anyhow::anyhow!("nope"))))
            .unwrap_err();
        let second = cell.resolve_with(|| Ok(1)).unwrap_err();

        assert!(first.ptr_eq(&second));
        assert_eq!(second.to_string(), "nope");
    }

    #[test]
    fn test_get_does_not_resolve() {
        let cell: ResultCell<i32> = ResultCell::new();
        assert!(cell.get().is_none());
        assert!(!cell.is_resolved());

        let _ = cell.resolve_with(|| Ok(5));
        assert_eq!(cell.get().unwrap().unwrap(), &5);
        assert!(cell.is_resolved());
    }

    #[test]
    fn test_panic_is_captured() {
        let cell: ResultCell<i32> = ResultCell::new();

        let err = cell.resolve_with(|| panic!("kaboom")).unwrap_err();
        assert!(matches!(err.failure(), Failure::Panic(msg) if msg == "kaboom"));

        // The cell stays resolved to the panic.
        assert!(cell.resolve_with(|| Ok(1)).is_err());
    }

    #[test]
    fn test_concurrent_readers_wait_for_first() {
        let cell = Arc::new(ResultCell::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let runs = runs.clone();
                thread::spawn(move || {
                    *cell
                        .resolve_with(|| {
                            runs.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(String::from("done"))
                        })
                        .unwrap()
                        == "done"
                })
            })
            .collect();

        for reader in readers {
            assert!(reader.join().unwrap());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_shows_state() {
        let cell = ResultCell::resolved(3);
        assert_eq!(format!("{cell:?}"), "ResolvedValue(3)");

        let cell: ResultCell<i32> = ResultCell::new();
        assert_eq!(format!("{cell:?}"), "Unresolved");
    }
}
