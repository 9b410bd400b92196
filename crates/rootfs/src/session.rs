//! Protocol session context.
//!
//! The wire-protocol layer hands a [`SessionContext`] to each filesystem view
//! it creates. The context identifies the session for logging and carries the
//! sink that is told about user-visible client actions (listings, downloads,
//! deletions, ...). It plays no part in filesystem logic.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

/// Kind of client action reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientActionKind {
    /// Directory listing.
    List,
    /// File content read.
    Download,
    /// Directory creation.
    CreateDir,
    /// File or directory removal.
    Delete,
    /// Rename or move.
    Rename,
}

/// One client action, as posted to a [`ClientActionSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientAction {
    pub session_id: String,
    pub client: String,
    pub kind: ClientActionKind,
    pub path: String,
    /// Target path for renames.
    pub destination: Option<String>,
}

/// Receiver of client action notifications.
pub trait ClientActionSink: Send + Sync {
    fn post(&self, action: ClientAction);
}

/// Sink that writes every action to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActionSink;

impl ClientActionSink for LogActionSink {
    fn post(&self, action: ClientAction) {
        info!(
            session_id = %action.session_id,
            client = %action.client,
            action = ?action.kind,
            path = %action.path,
            destination = ?action.destination,
            "Client action"
        );
    }
}

/// Identity of the protocol session a view serves.
#[derive(Clone)]
pub struct SessionContext {
    session_id: String,
    client: String,
    sink: Arc<dyn ClientActionSink>,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        client: impl Into<String>,
        sink: Arc<dyn ClientActionSink>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client: client.into(),
            sink,
        }
    }

    /// Context for local use (CLI, tests) that only logs actions.
    pub fn local() -> Self {
        Self::new("local", "localhost", Arc::new(LogActionSink))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    /// Report an action to the sink.
    pub fn post(&self, kind: ClientActionKind, path: &str, destination: Option<&str>) {
        self.sink.post(ClientAction {
            session_id: self.session_id.clone(),
            client: self.client.clone(),
            kind,
            path: path.to_string(),
            destination: destination.map(str::to_string),
        });
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_post_fills_session_fields() {
        let sink = Arc::new(RecordingSink::default());
        let session = SessionContext::new("s-1", "10.0.0.2:50022", sink.clone());

        session.post(ClientActionKind::Rename, "/data/a", Some("/data/b"));

        let actions = sink.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].session_id, "s-1");
        assert_eq!(actions[0].client, "10.0.0.2:50022");
        assert_eq!(actions[0].kind, ClientActionKind::Rename);
        assert_eq!(actions[0].path, "/data/a");
        assert_eq!(actions[0].destination.as_deref(), Some("/data/b"));
    }

    #[test]
    fn test_local_context() {
        let session = SessionContext::local();
        assert_eq!(session.session_id(), "local");
        assert_eq!(session.client(), "localhost");
        // Logging sink must accept posts without a subscriber installed.
        session.post(ClientActionKind::List, "/", None);
    }

    #[test]
    fn test_action_serializes_snake_case() {
        let action = ClientAction {
            session_id: "s".to_string(),
            client: "c".to_string(),
            kind: ClientActionKind::CreateDir,
            path: "/x".to_string(),
            destination: None,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"kind\":\"create_dir\""));
    }
}
