//! Running filesystem operations through an elevation shell.
//!
//! Every mutation or content access is a single external process. There is
//! no persistent privileged session; the [`CommandExecutor`] trait is the seam
//! where a different backend can be plugged in without touching the node or
//! view logic.

mod shell;
mod stream;

use std::io::Read;

use thiserror::Error;

pub use shell::ElevatedShell;
pub use stream::ChildStream;

/// Errors that can occur while launching or talking to a child process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// No operation argv was supplied.
    #[error("empty command")]
    EmptyCommand,

    /// The process could not be started (binary missing, elevation denied).
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child was started without the pipe we asked for.
    #[error("{program} was started without a stdout pipe")]
    MissingPipe { program: String },

    /// Reading the child's output failed.
    #[error("failed to read output of {program}: {source}")]
    Read {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Executes operation argv vectors with elevated privilege.
///
/// Implementations must be safe to call from several sessions at once; each
/// call is independent.
pub trait CommandExecutor: Send + Sync {
    /// Run `argv` and wait for it to exit.
    ///
    /// Returns true iff the exit status is zero. Launch failures are logged
    /// and reported as `false`.
    fn run_to_completion(&self, argv: &[&str]) -> bool;

    /// Launch `argv` and hand back its standard output.
    ///
    /// The caller owns the stream; dropping it terminates and reaps the
    /// child process.
    fn open_stream(&self, argv: &[&str]) -> Result<Box<dyn Read + Send>, ExecError>;
}
