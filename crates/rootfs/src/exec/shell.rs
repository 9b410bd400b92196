//! Executor that prefixes every operation with an elevation command.

use std::io::Read;
use std::process::{Command, Output, Stdio};

use tracing::{error, trace, warn};

use super::{ChildStream, CommandExecutor, ExecError};
use crate::config::ElevationConfig;

/// Locale forced on every operation so `ls` prints English month names.
const LOCALE_VAR: &str = "LC_ALL";
const LOCALE: &str = "C";

/// Runs operations through an elevation program.
///
/// When the configured args end in `-c` the program is treated as a shell
/// wrapper (`su -c`): the operation argv is shell-quoted and passed as one
/// command string, e.g. `su -c "LC_ALL=C ls -lA '/data/with space'"`.
/// Otherwise the argv words follow the args unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedShell {
    program: String,
    args: Vec<String>,
}

impl ElevatedShell {
    /// Create an executor for the given elevation program and leading args.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The stock `su -c` invocation.
    pub fn su() -> Self {
        Self::new("su", vec!["-c".to_string()])
    }

    pub fn from_config(config: &ElevationConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True if the operation is handed over as a single shell command string.
    pub fn takes_command_string(&self) -> bool {
        self.args.last().is_some_and(|arg| arg == "-c")
    }

    /// Full argv that would be executed for an operation.
    pub fn invocation(&self, argv: &[&str]) -> Vec<String> {
        let mut words = Vec::with_capacity(1 + self.args.len() + argv.len());
        words.push(self.program.clone());
        words.extend(self.args.iter().cloned());
        if self.takes_command_string() {
            // Wrappers that reset the environment still see the locale.
            words.push(format!(
                "{LOCALE_VAR}={LOCALE} {}",
                shell_words::join(argv.iter().copied())
            ));
        } else {
            words.extend(argv.iter().map(|s| s.to_string()));
        }
        words
    }

    fn command(&self, argv: &[&str]) -> Result<Command, ExecError> {
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let invocation = self.invocation(argv);
        trace!(command = ?invocation, "Running elevated command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&invocation[1..])
            .env(LOCALE_VAR, LOCALE)
            .stdin(Stdio::null());
        Ok(cmd)
    }

    /// Run `argv` and collect its exit status and output.
    pub fn run(&self, argv: &[&str]) -> Result<Output, ExecError> {
        self.command(argv)?
            .output()
            .map_err(|source| ExecError::Launch {
                program: self.program.clone(),
                source,
            })
    }
}

impl Default for ElevatedShell {
    fn default() -> Self {
        Self::su()
    }
}

impl CommandExecutor for ElevatedShell {
    fn run_to_completion(&self, argv: &[&str]) -> bool {
        match self.run(argv) {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    command = ?argv,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Elevated command failed"
                );
                false
            }
            Err(e) => {
                error!(command = ?argv, error = %e, "Could not run elevated command");
                false
            }
        }
    }

    fn open_stream(&self, argv: &[&str]) -> Result<Box<dyn Read + Send>, ExecError> {
        let child = self
            .command(argv)?
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecError::Launch {
                program: self.program.clone(),
                source,
            })?;

        Ok(Box::new(ChildStream::new(child, self.program.clone())?))
    }
}
