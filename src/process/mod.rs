//! Futures computed in a separate worker process.
//!
//! The parent re-executes a worker binary (by default its own executable)
//! with [`JOB_ENV`] naming the job, writes the encoded arguments to the
//! child's stdin and hands the child to a monitor thread. The monitor drains
//! stdout and stderr, waits for the exit and decodes the reply frame. The
//! result is a [`ThreadFuture`] around that monitor, so forcing behaves the
//! same as for any other thread future.
mod wire;
mod worker;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::attrs::Attributes;
use crate::error::{Failure, ForceError, Stage};
use crate::invocation::Invocation;
use crate::surface::{Promise, Surface};
use crate::thread::ThreadFuture;

use self::wire::Reply;
pub use self::worker::{JOB_ENV, Job, Registry};

/// How to start a worker process.
///
/// The default re-runs the current executable with no extra arguments, which
/// suits binaries that call [`Registry::serve_if_worker`] at the top of
/// `main`.
#[derive(Debug, Clone, Default)]
pub struct WorkerCommand {
    program: Option<PathBuf>,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    thread_name: Option<String>,
}

impl WorkerCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `program` instead of the current executable.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Name of the monitor thread, `deferral-<job>` by default.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Starts job `J` with `args` in a fresh worker process.
    ///
    /// The arguments are encoded right away. If that fails, no process is
    /// started and the future is already failed with a transfer error.
    pub fn spawn<J: Job>(&self, args: J::Args) -> ProcessFuture<J::Output> {
        let payload = match wire::encode(&args) {
            Ok(payload) => payload,
            Err(message) => {
                tracing::warn!("couldn't encode arguments for job {}: {message}", J::NAME);
                let failure = Failure::Transfer {
                    stage: Stage::Arguments,
                    message,
                };
                return ProcessFuture {
                    inner: ThreadFuture::failed(failure.into()),
                };
            }
        };

        let child = self.command(J::NAME).and_then(|mut command| command.spawn());

        match &child {
            Ok(child) => tracing::debug!(pid = child.id(), job = J::NAME, "worker started"),
            Err(err) => tracing::warn!("couldn't start worker for job {}: {err}", J::NAME),
        }

        let invocation = Invocation::from_outcome(move || {
            let child = child.map_err(Failure::Io)?;
            monitor::<J>(child, payload)
        });

        let name = self
            .thread_name
            .clone()
            .unwrap_or_else(|| format!("deferral-{}", J::NAME));

        ProcessFuture {
            inner: ThreadFuture::with_name(name, invocation),
        }
    }

    fn command(&self, job: &str) -> io::Result<Command> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        let mut command = Command::new(program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .env(JOB_ENV, job)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        Ok(command)
    }
}

fn monitor<J: Job>(mut child: Child, payload: Vec<u8>) -> Result<J::Output, ForceError> {
    let pid = child.id();

    if let Some(mut stdin) = child.stdin.take() {
        // A worker that died early closed the pipe, its exit status says why.
        if let Err(err) = stdin.write_all(&payload) {
            tracing::debug!(pid, "couldn't write arguments: {err}");
        }
    }

    let output = child.wait_with_output().map_err(Failure::Io)?;
    tracing::debug!(pid, status = %output.status, "worker exited");

    let Some((stray, frame)) = wire::split_frame(&output.stdout) else {
        tracing::warn!(pid, status = %output.status, "worker exited without a reply");
        return Err(Failure::WorkerDied {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    };

    if !stray.is_empty() {
        tracing::debug!(pid, "ignoring {} bytes printed before the reply", stray.len());
    }

    let reply: Reply<J::Output, J::Error> =
        wire::decode(frame).map_err(|message| Failure::Transfer {
            stage: Stage::Reply,
            message,
        })?;

    match reply {
        Reply::Ok(output) => Ok(output),
        Reply::Err(err) => Err(ForceError::invocation(err)),
        Reply::Panic(message) => Err(Failure::Panic(message).into()),
        Reply::Transfer { stage, message } => Err(Failure::Transfer { stage, message }.into()),
    }
}

/// A value being computed by a job in a worker process.
///
/// The process starts at construction. Forcing blocks until it exits and
/// its reply has been decoded. A worker that exits without replying (crash,
/// signal, unknown job) resolves to [`Failure::WorkerDied`] instead of
/// hanging.
pub struct ProcessFuture<T> {
    inner: ThreadFuture<T>,
}

impl<T: Send + 'static> ProcessFuture<T> {
    /// Starts job `J` using the default [`WorkerCommand`].
    pub fn spawn<J: Job<Output = T>>(args: J::Args) -> Self {
        WorkerCommand::new().spawn::<J>(args)
    }
}

impl<T> ProcessFuture<T> {
    /// Whether the worker has exited and its reply was read. Never blocks.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn attrs(&self) -> &Attributes {
        self.inner.attrs()
    }

    pub fn peek(&self) -> Option<Result<&T, ForceError>> {
        self.inner.peek()
    }

    pub fn into_value(self) -> Result<T, ForceError>
    where
        T: Clone,
    {
        self.inner.into_value()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T> Clone for ProcessFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Promise for ProcessFuture<T> {
    type Value = T;

    fn force(&self) -> Result<&T, ForceError> {
        self.inner.force()
    }

    fn is_resolved(&self) -> bool {
        self.inner.is_resolved()
    }
}

impl<T> Surface for ProcessFuture<T> {}

crate::delegate!(ProcessFuture);

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize, Serializer};

    /// Refuses to be encoded.
    #[derive(Debug, Deserialize)]
    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque values stay in this process"))
        }
    }

    #[derive(Debug, Serialize, Deserialize, thiserror::Error)]
    #[error("never")]
    struct Never;

    struct Echo;

    impl Job for Echo {
        const NAME: &'static str = "echo";

        type Args = Opaque;
        type Output = ();
        type Error = Never;

        fn run(_: Opaque) -> Result<(), Never> {
            Ok(())
        }
    }

    #[test]
    fn test_unencodable_arguments_fail_without_spawning() {
        // Pointing at a program that doesn't exist proves nothing is started.
        let h = WorkerCommand::new()
            .program("/nonexistent/deferral-worker")
            .spawn::<Echo>(Opaque);

        assert!(h.is_finished());

        let err = h.force().unwrap_err();
        match err.failure() {
            Failure::Transfer { stage, message } => {
                assert_eq!(*stage, Stage::Arguments);
                assert!(message.contains("opaque values stay in this process"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    struct Noop;

    impl Job for Noop {
        const NAME: &'static str = "noop";

        type Args = ();
        type Output = ();
        type Error = Never;

        fn run(_: ()) -> Result<(), Never> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_program_is_io_failure() {
        let h = WorkerCommand::new()
            .program("/nonexistent/deferral-worker")
            .spawn::<Noop>(());

        assert!(matches!(h.force().unwrap_err().failure(), Failure::Io(_)));
    }
}
