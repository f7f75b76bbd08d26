#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod attrs;
mod batch;
mod cell;
mod deferred;
mod error;
mod invocation;
#[cfg(feature = "logging")]
pub mod logging;
mod process;
mod surface;
mod thread;

pub use crate::attrs::Attributes;
pub use crate::batch::force_all;
pub use crate::cell::ResultCell;
pub use crate::deferred::Deferred;
pub use crate::error::{Failure, ForceError, Stage};
pub use crate::invocation::{Callable, Invocation};
pub use crate::process::{JOB_ENV, Job, ProcessFuture, Registry, WorkerCommand};
pub use crate::surface::{Contains, Len, Operand, Promise, Surface, Truthy};
pub use crate::thread::ThreadFuture;

#[doc(hidden)]
pub mod __private {
    pub use crate::surface::expect_forced;
}

/// Defers `callable(args...)` until the handle is first used.
///
/// `args` is a tuple and is moved into the handle, so it can't change before
/// the call. Values behind shared interior mutability (`Arc<Mutex<_>>`) are
/// read whenever the call actually happens.
///
/// ```
/// let total = deferral::create_deferred(|a: i32, b: i32| anyhow::Ok(a + b), (2, 3));
/// assert_eq!(&total * 2, 10);
/// ```
pub fn create_deferred<T, F, Args, E>(callable: F, args: Args) -> Deferred<T>
where
    F: Callable<Args, Output = Result<T, E>> + Send + 'static,
    Args: Send + 'static,
    E: Into<anyhow::Error>,
{
    Deferred::from_invocation(Invocation::new(callable, args))
}

/// Starts `callable(args...)` on a background thread right away.
pub fn create_thread_future<T, F, Args, E>(callable: F, args: Args) -> ThreadFuture<T>
where
    T: Send + 'static,
    F: Callable<Args, Output = Result<T, E>> + Send + 'static,
    Args: Send + 'static,
    E: Into<anyhow::Error>,
{
    ThreadFuture::from_invocation(Invocation::new(callable, args))
}

/// Starts job `J` in a worker process right away, re-running the current
/// executable. The executable must serve `J` through
/// [`Registry::serve_if_worker`]; use [`WorkerCommand`] to run something else.
pub fn create_process_future<J: Job>(args: J::Args) -> ProcessFuture<J::Output> {
    WorkerCommand::new().spawn::<J>(args)
}

/// Forces `x` if it is a handle and returns the value, or returns a plain
/// value as it is. Applying it to its own result changes nothing.
///
/// ```
/// use deferral::{Deferred, force_value};
///
/// let h = Deferred::new(|| anyhow::Ok(String::from("ready")));
/// assert_eq!(force_value(&h).unwrap(), "ready");
/// assert_eq!(force_value(7).unwrap(), 7);
/// ```
pub fn force_value<X: Operand>(x: X) -> Result<X::Value, ForceError> {
    x.resolve()
}
