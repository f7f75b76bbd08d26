use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The point at which a value failed to cross the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Encoding the job arguments in the parent, or decoding them in the worker.
    Arguments,
    /// Encoding the job result in the worker.
    Result,
    /// Encoding the job error in the worker.
    Error,
    /// Decoding the reply frame in the parent.
    Reply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Arguments => "arguments",
            Stage::Result => "result",
            Stage::Error => "error",
            Stage::Reply => "reply",
        };

        f.write_str(name)
    }
}

/// Everything that can go wrong while resolving a handle.
#[derive(Debug, Error)]
pub enum Failure {
    /// The target invocation itself returned an error.
    #[error(transparent)]
    Invocation(anyhow::Error),

    #[error("Invocation panicked: {0}")]
    Panic(String),

    #[error("Couldn't transfer the {stage} across the process boundary.\n{message}")]
    Transfer { stage: Stage, message: String },

    #[error("Worker process died ({status}) before sending a reply.\n{stderr}")]
    WorkerDied { status: String, stderr: String },

    #[error("I/O error while starting or talking to a worker.\n{0}")]
    Io(#[from] std::io::Error),
}

/// A captured failure, shared by every read of a resolved handle.
///
/// Cloning is cheap; all clones point at the same [`Failure`], so replaying a
/// cached error hands out the very error produced by the first resolution.
#[derive(Debug, Error, Clone)]
#[error(transparent)]
pub struct ForceError(Arc<Failure>);

impl ForceError {
    /// Wraps an error returned by a target invocation.
    pub fn invocation(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(Failure::Invocation(err.into())))
    }

    pub fn failure(&self) -> &Failure {
        &self.0
    }

    pub fn is_invocation(&self) -> bool {
        matches!(*self.0, Failure::Invocation(_))
    }

    /// Recovers the typed error returned by the target invocation, if this is
    /// an invocation error of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match &*self.0 {
            Failure::Invocation(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns `true` when both errors come from the same resolution.
    pub fn ptr_eq(&self, other: &ForceError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Failure> for ForceError {
    fn from(failure: Failure) -> Self {
        ForceError(Arc::new(failure))
    }
}

impl From<anyhow::Error> for ForceError {
    fn from(err: anyhow::Error) -> Self {
        ForceError(Arc::new(Failure::Invocation(err)))
    }
}
