//! Byte stream tied to the lifetime of a child process.

use std::io::{self, Read};
use std::process::{Child, ChildStdout};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, trace, warn};

use super::ExecError;

/// Standard output of a child process.
///
/// Dropping the stream closes the pipe, sends SIGTERM if the child is still
/// running, tries a non-blocking reap and falls back to a blocking one.
pub struct ChildStream {
    child: Child,
    stdout: Option<ChildStdout>,
    program: String,
}

impl ChildStream {
    /// Wrap a child that was spawned with a piped stdout.
    pub fn new(mut child: Child, program: impl Into<String>) -> Result<Self, ExecError> {
        let program = program.into();
        match child.stdout.take() {
            Some(stdout) => Ok(Self {
                child,
                stdout: Some(stdout),
                program,
            }),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ExecError::MissingPipe { program })
            }
        }
    }

    /// Process ID of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn terminate(&mut self) {
        let pid = self.child.id();

        match self.child.try_wait() {
            Ok(Some(status)) => {
                trace!(program = %self.program, pid, %status, "Child already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(program = %self.program, pid, error = %e, "Failed to poll child"),
        }

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(program = %self.program, pid, error = %e, "Failed to signal child");
        }

        match self.child.try_wait() {
            Ok(Some(status)) => trace!(program = %self.program, pid, %status, "Child reaped"),
            _ => match self.child.wait() {
                Ok(status) => trace!(program = %self.program, pid, %status, "Child reaped after wait"),
                Err(e) => warn!(program = %self.program, pid, error = %e, "Failed to reap child"),
            },
        }
    }
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        // Close the pipe before signalling the child.
        drop(self.stdout.take());
        self.terminate();
    }
}

impl std::fmt::Debug for ChildStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildStream")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .finish()
    }
}
