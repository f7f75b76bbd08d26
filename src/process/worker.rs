//! The worker side: named jobs and the entry point that serves them.
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::process;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::Level;

use super::wire::{self, Reply};
use crate::cell::panic_message;
use crate::error::Stage;

/// Environment variable naming the job a worker process should run.
///
/// A running job still sees it, and so does any process the job starts
/// itself, since it can't be removed without `unsafe`. A program started
/// from a job that calls [`Registry::serve_if_worker`] would serve that job
/// instead of running normally; clear the variable on such commands
/// (`Command::env_remove`). Workers started through
/// [`WorkerCommand`](crate::WorkerCommand) always get it set afresh.
pub const JOB_ENV: &str = "DEFERRAL_JOB";

/// A unit of work that can run in a worker process.
///
/// Jobs are addressed by [`Job::NAME`]. Arguments travel to the worker and
/// the result or error travels back, all encoded as CBOR, so every associated
/// type has to survive a serde round trip. A domain error crosses as its
/// serialized form and is rebuilt as `Self::Error` on the other side.
pub trait Job: 'static {
    const NAME: &'static str;

    type Args: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;
    type Error: Serialize + DeserializeOwned + std::error::Error + Send + Sync + 'static;

    fn run(args: Self::Args) -> Result<Self::Output, Self::Error>;
}

type Runner = fn(&[u8]) -> Vec<u8>;

/// The jobs a worker binary is able to run.
///
/// ```no_run
/// # use deferral::Registry;
/// fn main() {
///     Registry::new()
///         // .register::<MyJob>()
///         .serve_if_worker();
///
///     // regular program
/// }
/// ```
#[derive(Default)]
pub struct Registry {
    jobs: HashMap<&'static str, Runner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J: Job>(mut self) -> Self {
        self.jobs.insert(J::NAME, run_job::<J>);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Runs job `name` on CBOR-encoded `input` in this process and returns
    /// the encoded reply, or `None` for an unknown job.
    pub fn dispatch(&self, name: &str, input: &[u8]) -> Option<Vec<u8>> {
        self.jobs.get(name).map(|runner| runner(input))
    }

    /// Serves a single job and exits if this process was started as a
    /// worker (i.e. [`JOB_ENV`] is set). Returns normally otherwise.
    ///
    /// Call this early in `main`, before anything else writes to stdout.
    /// The variable stays set while the job runs, see [`JOB_ENV`].
    pub fn serve_if_worker(&self) {
        let Some(name) = std::env::var_os(JOB_ENV) else {
            return;
        };

        #[cfg(feature = "logging")]
        crate::logging::init();

        let name = name.to_string_lossy();
        process::exit(self.serve(&name))
    }

    fn serve(&self, name: &str) -> i32 {
        let mut input = Vec::new();
        if let Err(err) = io::stdin().lock().read_to_end(&mut input) {
            eprintln!("deferral worker: couldn't read arguments for {name:?}: {err}");
            return 1;
        }

        let Some(payload) = self.dispatch(name, &input) else {
            eprintln!("deferral worker: no job named {name:?} is registered");
            return 2;
        };

        if let Err(err) = wire::write_frame(io::stdout().lock(), &payload) {
            eprintln!("deferral worker: couldn't write the reply for {name:?}: {err}");
            return 1;
        }

        0
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.jobs.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

fn run_job<J: Job>(input: &[u8]) -> Vec<u8> {
    let span = tracing::span!(Level::DEBUG, "job", name = J::NAME);
    let _enter = span.enter();

    let args: J::Args = match wire::decode(input) {
        Ok(args) => args,
        Err(message) => return transfer(Stage::Arguments, message),
    };

    let reply = match panic::catch_unwind(AssertUnwindSafe(|| J::run(args))) {
        Ok(Ok(output)) => Reply::Ok(output),
        Ok(Err(err)) => {
            tracing::debug!("job failed: {err}");
            Reply::Err(err)
        }
        Err(payload) => Reply::Panic(panic_message(&*payload)),
    };

    wire::encode(&reply).unwrap_or_else(|message| transfer(reply.stage(), message))
}

fn transfer(stage: Stage, message: String) -> Vec<u8> {
    tracing::warn!("couldn't transfer the {stage}: {message}");

    // An empty payload still makes a frame; the parent reports it as a torn
    // reply.
    wire::encode(&Reply::<(), ()>::Transfer { stage, message }).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, thiserror::Error, PartialEq)]
    #[error("empty word")]
    struct EmptyWord;

    struct Shout;

    impl Job for Shout {
        const NAME: &'static str = "shout";

        type Args = String;
        type Output = String;
        type Error = EmptyWord;

        fn run(word: String) -> Result<String, EmptyWord> {
            if word.is_empty() {
                return Err(EmptyWord);
            }
            if word == "?" {
                panic!("lost for words");
            }

            Ok(word.to_uppercase() + "!")
        }
    }

    fn registry() -> Registry {
        Registry::new().register::<Shout>()
    }

    #[test]
    fn test_dispatch_ok() {
        let input = wire::encode(&"hey".to_string()).unwrap();
        let reply = registry().dispatch("shout", &input).unwrap();

        let reply: Reply<String, EmptyWord> = wire::decode(&reply).unwrap();
        assert!(matches!(reply, Reply::Ok(s) if s == "HEY!"));
    }

    #[test]
    fn test_dispatch_domain_error() {
        let input = wire::encode(&String::new()).unwrap();
        let reply = registry().dispatch("shout", &input).unwrap();

        let reply: Reply<String, EmptyWord> = wire::decode(&reply).unwrap();
        assert!(matches!(reply, Reply::Err(EmptyWord)));
    }

    #[test]
    fn test_dispatch_panic() {
        let input = wire::encode(&"?".to_string()).unwrap();
        let reply = registry().dispatch("shout", &input).unwrap();

        let reply: Reply<String, EmptyWord> = wire::decode(&reply).unwrap();
        assert_eq!(reply.stage(), Stage::Error);
        assert!(matches!(reply, Reply::Panic(msg) if msg == "lost for words"));
    }

    #[test]
    fn test_dispatch_bad_arguments() {
        let input = wire::encode(&42u32).unwrap();
        let reply = registry().dispatch("shout", &input).unwrap();

        let reply: Reply<String, EmptyWord> = wire::decode(&reply).unwrap();
        assert!(matches!(reply, Reply::Transfer { stage: Stage::Arguments, .. }));
    }

    #[test]
    fn test_unknown_job() {
        let registry = registry();

        assert!(registry.contains("shout"));
        assert!(registry.dispatch("whisper", &[]).is_none());
        assert_eq!(format!("{registry:?}"), r#"{"shout"}"#);
    }
}
