//! Target invocations: a callable bundled with the arguments it will be called
//! with.
use std::fmt::Debug;

use crate::error::ForceError;

/// Something that can be called with an argument tuple.
///
/// This is implemented for every `FnOnce` taking up to eight arguments, with
/// the arguments supplied as a tuple: `f.invoke((a, b))` calls `f(a, b)`.
/// Rust has no keyword arguments; named parameters are passed as a struct in
/// one of the positional slots.
pub trait Callable<Args> {
    type Output;

    fn invoke(self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($A:ident),*) => {
        #[allow(non_snake_case)]
        impl<Func, Ret, $($A),*> Callable<($($A,)*)> for Func
        where
            Func: FnOnce($($A),*) -> Ret,
        {
            type Output = Ret;

            #[inline]
            fn invoke(self, args: ($($A,)*)) -> Ret {
                let ($($A,)*) = args;
                self($($A),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A);
impl_callable!(A, B);
impl_callable!(A, B, C);
impl_callable!(A, B, C, D);
impl_callable!(A, B, C, D, E);
impl_callable!(A, B, C, D, E, F);
impl_callable!(A, B, C, D, E, F, G);
impl_callable!(A, B, C, D, E, F, G, H);

type Thunk<T> = Box<dyn FnOnce() -> Result<T, ForceError> + Send>;

/// A callable and its arguments, captured once and consumed by a single run.
///
/// Arguments are moved in at construction, so nothing outside can mutate them
/// before the run. Values with shared interior mutability (`Arc<Mutex<_>>`,
/// atomics) are the exception: the invocation sees whatever they hold when it
/// actually runs, which for a [`Deferred`](crate::Deferred) may be much later
/// than construction.
pub struct Invocation<T> {
    callable: &'static str,
    thunk: Thunk<T>,
}

impl<T> Invocation<T> {
    /// Captures `callable` and `args`. The callable returns a `Result` whose
    /// error is anything convertible into [`anyhow::Error`].
    pub fn new<F, Args, E>(callable: F, args: Args) -> Self
    where
        F: Callable<Args, Output = Result<T, E>> + Send + 'static,
        Args: Send + 'static,
        E: Into<anyhow::Error>,
    {
        Self {
            callable: std::any::type_name::<F>(),
            thunk: Box::new(move || callable.invoke(args).map_err(ForceError::invocation)),
        }
    }

    /// An invocation whose errors are already [`ForceError`]s, e.g. because
    /// they come from forcing another handle.
    pub(crate) fn from_outcome<F>(outcome: F) -> Self
    where
        F: FnOnce() -> Result<T, ForceError> + Send + 'static,
    {
        Self {
            callable: std::any::type_name::<F>(),
            thunk: Box::new(outcome),
        }
    }

    /// Type name of the wrapped callable, used in log spans.
    pub fn callable(&self) -> &'static str {
        self.callable
    }

    pub fn run(self) -> Result<T, ForceError> {
        (self.thunk)()
    }
}

impl<T> Debug for Invocation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("callable", &self.callable)
            .finish_non_exhaustive()
    }
}
