//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use crate::exec::{CommandExecutor, ExecError};
use crate::session::{ClientAction, ClientActionSink};

/// Executor that answers from canned data and records every argv.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<Vec<String>>>,
    listings: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    fail_commands: bool,
    fail_launch: bool,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output returned for `ls -lA <dir>`.
    pub fn with_listing(mut self, dir: &str, output: &str) -> Self {
        self.listings.insert(dir.to_string(), output.to_string());
        self
    }

    /// Content returned for `cat <path>`.
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.insert(path.to_string(), content.to_vec());
        self
    }

    /// Make `run_to_completion` report a non-zero exit.
    pub fn failing(mut self) -> Self {
        self.fail_commands = true;
        self
    }

    /// Make every launch fail as if the elevation binary were missing.
    pub fn unlaunchable(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, argv: &[&str]) {
        self.calls
            .lock()
            .unwrap()
            .push(argv.iter().map(|s| s.to_string()).collect());
    }

    fn launch_error() -> ExecError {
        ExecError::Launch {
            program: "su".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "su not found"),
        }
    }
}

impl CommandExecutor for MockExecutor {
    fn run_to_completion(&self, argv: &[&str]) -> bool {
        self.record(argv);
        !self.fail_launch && !self.fail_commands
    }

    fn open_stream(&self, argv: &[&str]) -> Result<Box<dyn Read + Send>, ExecError> {
        self.record(argv);
        if self.fail_launch {
            return Err(Self::launch_error());
        }

        let output = match argv {
            ["ls", "-lA", dir] => self
                .listings
                .get(*dir)
                .map(|s| s.as_bytes().to_vec())
                .unwrap_or_default(),
            ["cat", path] => self.files.get(*path).cloned().unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(Box::new(Cursor::new(output)))
    }
}

/// Sink that keeps every posted action.
#[derive(Default)]
pub struct RecordingSink {
    actions: Mutex<Vec<ClientAction>>,
}

impl RecordingSink {
    pub fn actions(&self) -> Vec<ClientAction> {
        self.actions.lock().unwrap().clone()
    }
}

impl ClientActionSink for RecordingSink {
    fn post(&self, action: ClientAction) {
        self.actions.lock().unwrap().push(action);
    }
}
