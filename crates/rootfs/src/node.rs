//! File nodes backed by the elevation shell.
//!
//! A [`FileNode`] is the per-path handle a protocol layer works with. It
//! wraps one [`DirEntry`] captured when the node was created and never
//! changes afterwards; a fresh node is resolved whenever newer metadata is
//! needed. Every mutation or content access runs one command through the
//! configured [`CommandExecutor`].

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::FsError;
use crate::exec::{CommandExecutor, ExecError};
use crate::listing::{DirEntry, EntryKind, ListingParser};
use crate::session::{ClientActionKind, SessionContext};

/// Collaborators shared by a view and every node it hands out.
pub(crate) struct Backend {
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) parser: ListingParser,
    pub(crate) session: SessionContext,
}

impl Backend {
    /// Run `ls -lA <dir>` and parse its output.
    pub(crate) fn list_entries(&self, dir: &str) -> Result<Vec<DirEntry>, FsError> {
        let mut stream = self.executor.open_stream(&["ls", "-lA", dir])?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .map_err(|source| ExecError::Read {
                program: "ls".to_string(),
                source,
            })?;
        drop(stream);

        Ok(self.parser.parse(&String::from_utf8_lossy(&raw))?)
    }
}

/// Protocol-neutral snapshot of a node, for building protocol-specific handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Final path segment.
    pub name: String,
    /// Absolute path.
    pub path: String,
    pub kind: EntryKind,
    pub exists: bool,
    /// Size in bytes.
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Link target if this is a symlink.
    pub symlink_target: Option<String>,
}

/// A filesystem object reachable through the elevation shell.
#[derive(Clone)]
pub struct FileNode {
    entry: DirEntry,
    path: String,
    backend: Arc<Backend>,
}

impl FileNode {
    pub(crate) fn new(entry: DirEntry, path: String, backend: Arc<Backend>) -> Self {
        Self {
            entry,
            path,
            backend,
        }
    }

    /// Final path segment (`/` for the root).
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn absolute_path(&self) -> &str {
        &self.path
    }

    /// Metadata captured when this node was created.
    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    pub fn is_directory(&self) -> bool {
        self.entry.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.entry.is_file()
    }

    pub fn exists(&self) -> bool {
        self.entry.exists()
    }

    /// Always true: permissions are enforced by the elevation shell itself.
    pub fn is_readable(&self) -> bool {
        true
    }

    /// Always true, see [`FileNode::is_readable`].
    pub fn is_writable(&self) -> bool {
        true
    }

    /// Always true, see [`FileNode::is_readable`].
    pub fn is_removable(&self) -> bool {
        true
    }

    pub fn last_modified(&self) -> SystemTime {
        self.entry.modified()
    }

    /// Changing timestamps is not supported; always returns `false`.
    #[instrument(level = "trace", skip(self), fields(path = %self.path), ret)]
    pub fn set_last_modified(&self, _time: SystemTime) -> bool {
        false
    }

    pub fn size(&self) -> u64 {
        self.entry.size()
    }

    /// Create this path as a directory.
    #[instrument(level = "trace", skip(self), fields(path = %self.path), ret)]
    pub fn mkdir(&self) -> bool {
        self.backend
            .session
            .post(ClientActionKind::CreateDir, &self.path, None);
        self.backend.executor.run_to_completion(&["mkdir", self.path.as_str()])
    }

    /// Remove this path recursively.
    ///
    /// Any failure, including permission problems, is reported as `false`.
    #[instrument(level = "trace", skip(self), fields(path = %self.path), ret)]
    pub fn delete(&self) -> bool {
        self.backend
            .session
            .post(ClientActionKind::Delete, &self.path, None);
        self.backend
            .executor
            .run_to_completion(&["rm", "-rf", self.path.as_str()])
    }

    /// Rename or move this path to `destination`.
    #[instrument(level = "trace", skip_all, fields(path = %self.path, destination = %destination.path), ret)]
    pub fn move_to(&self, destination: &FileNode) -> bool {
        self.backend.session.post(
            ClientActionKind::Rename,
            &self.path,
            Some(&destination.path),
        );
        self.backend
            .executor
            .run_to_completion(&["mv", self.path.as_str(), destination.path.as_str()])
    }

    /// List the children of this directory.
    ///
    /// Order is whatever the listing command printed. A listing that cannot
    /// be run yields an empty list.
    #[instrument(level = "trace", skip(self), fields(path = %self.path))]
    pub fn list_files(&self) -> Vec<FileNode> {
        self.backend
            .session
            .post(ClientActionKind::List, &self.path, None);

        match self.backend.list_entries(&self.path) {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| {
                    let path = child_path(&self.path, entry.name());
                    FileNode::new(entry, path, Arc::clone(&self.backend))
                })
                .collect(),
            Err(e) => {
                warn!(path = %self.path, error = %e, "Could not list directory");
                Vec::new()
            }
        }
    }

    /// Stream the content of this file.
    ///
    /// Reads always start at byte 0: `offset` is accepted but ignored, so a
    /// resumed download receives the whole file again.
    #[instrument(level = "trace", skip(self), fields(path = %self.path))]
    pub fn create_input_stream(&self, offset: u64) -> Result<Box<dyn Read + Send>, FsError> {
        if offset > 0 {
            warn!(path = %self.path, offset, "Read offset is not supported, streaming from start");
        }
        self.backend
            .session
            .post(ClientActionKind::Download, &self.path, None);
        Ok(self.backend.executor.open_stream(&["cat", self.path.as_str()])?)
    }

    /// Writing through the elevation shell is not supported.
    #[instrument(level = "trace", skip(self), fields(path = %self.path))]
    pub fn create_output_stream(&self, _offset: u64) -> Result<Box<dyn Write + Send>, FsError> {
        Err(FsError::Unsupported {
            operation: "create_output_stream",
        })
    }

    /// Snapshot of this node for protocol adapters.
    pub fn attributes(&self) -> FileAttributes {
        let modified = self
            .entry
            .modified()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        FileAttributes {
            name: self.name().to_string(),
            path: self.path.clone(),
            kind: self.entry.kind(),
            exists: self.entry.exists(),
            size: self.entry.size(),
            mode: self.entry.mode(),
            modified,
            symlink_target: self.entry.symlink_target().map(str::to_string),
        }
    }
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNode")
            .field("path", &self.path)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Join a directory path and an entry name.
pub(crate) fn child_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::DateFormat;
    use crate::testing::{MockExecutor, RecordingSink};
    use std::time::Duration;

    const DATA_LISTING: &str = "total 8\n\
        -rw-r--r-- 1 root root 42 Jan  1 00:00 foo.txt\n\
        drwxr-xr-x 2 root root 4096 Jan  1 00:00 bar\n";

    fn backend(executor: Arc<MockExecutor>, sink: Arc<RecordingSink>) -> Arc<Backend> {
        Arc::new(Backend {
            executor,
            parser: ListingParser::new(DateFormat::Traditional).with_reference_year(2024),
            session: SessionContext::new("test", "client", sink),
        })
    }

    fn dir_node(path: &str, executor: Arc<MockExecutor>) -> FileNode {
        let name = path.rsplit('/').next().unwrap_or(path);
        let entry = DirEntry::new(name, EntryKind::Directory, 4096, UNIX_EPOCH);
        FileNode::new(
            entry,
            path.to_string(),
            backend(executor, Arc::new(RecordingSink::default())),
        )
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_list_files_builds_child_paths() {
        let executor = Arc::new(MockExecutor::new().with_listing("/data", DATA_LISTING));
        let node = dir_node("/data", executor.clone());

        let children = node.list_files();

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name(), "foo.txt");
        assert_eq!(children[0].absolute_path(), "/data/foo.txt");
        assert!(children[0].is_file());
        assert!(children[0].exists());
        assert_eq!(children[0].size(), 42);

        assert_eq!(children[1].name(), "bar");
        assert_eq!(children[1].absolute_path(), "/data/bar");
        assert!(children[1].is_directory());
        assert_eq!(children[1].size(), 4096);

        assert_eq!(executor.calls(), vec![argv(&["ls", "-lA", "/data"])]);
    }

    #[test]
    fn test_list_files_of_root() {
        let executor = Arc::new(MockExecutor::new().with_listing(
            "/",
            "drwxr-xr-x 2 root root 4096 Jan  1 00:00 data\n",
        ));
        let node = FileNode::new(
            DirEntry::root(),
            "/".to_string(),
            backend(executor, Arc::new(RecordingSink::default())),
        );

        let children = node.list_files();
        assert_eq!(children[0].absolute_path(), "/data");
    }

    #[test]
    fn test_list_files_launch_failure_is_empty() {
        let executor = Arc::new(MockExecutor::new().unlaunchable());
        let node = dir_node("/data", executor);
        assert!(node.list_files().is_empty());
    }

    #[test]
    fn test_list_files_posts_action() {
        let executor = Arc::new(MockExecutor::new().with_listing("/data", DATA_LISTING));
        let sink = Arc::new(RecordingSink::default());
        let entry = DirEntry::new("data", EntryKind::Directory, 0, UNIX_EPOCH);
        let node = FileNode::new(entry, "/data".to_string(), backend(executor, sink.clone()));

        node.list_files();

        let actions = sink.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ClientActionKind::List);
        assert_eq!(actions[0].path, "/data");
    }

    #[test]
    fn test_mkdir_runs_mkdir() {
        let executor = Arc::new(MockExecutor::new());
        let node = FileNode::new(
            DirEntry::missing("newdir"),
            "/data/newdir".to_string(),
            backend(executor.clone(), Arc::new(RecordingSink::default())),
        );

        assert!(node.mkdir());
        assert_eq!(executor.calls(), vec![argv(&["mkdir", "/data/newdir"])]);
    }

    #[test]
    fn test_mkdir_failure() {
        let executor = Arc::new(MockExecutor::new().failing());
        let node = dir_node("/data/newdir", executor);
        assert!(!node.mkdir());
    }

    #[test]
    fn test_delete_runs_rm_rf() {
        let executor = Arc::new(MockExecutor::new());
        let node = dir_node("/data/bar", executor.clone());

        assert!(node.delete());
        assert_eq!(executor.calls(), vec![argv(&["rm", "-rf", "/data/bar"])]);
    }

    #[test]
    fn test_delete_launch_failure() {
        let executor = Arc::new(MockExecutor::new().unlaunchable());
        let node = dir_node("/data/bar", executor);
        assert!(!node.delete());
    }

    #[test]
    fn test_move_to_runs_mv() {
        let executor = Arc::new(MockExecutor::new());
        let sink = Arc::new(RecordingSink::default());
        let shared = backend(executor.clone(), sink.clone());
        let source = FileNode::new(
            DirEntry::new("a.txt", EntryKind::File, 1, UNIX_EPOCH),
            "/data/a.txt".to_string(),
            Arc::clone(&shared),
        );
        let target = FileNode::new(
            DirEntry::missing("b.txt"),
            "/data/b.txt".to_string(),
            shared,
        );

        assert!(source.move_to(&target));
        assert_eq!(
            executor.calls(),
            vec![argv(&["mv", "/data/a.txt", "/data/b.txt"])]
        );
        let actions = sink.actions();
        assert_eq!(actions[0].kind, ClientActionKind::Rename);
        assert_eq!(actions[0].destination.as_deref(), Some("/data/b.txt"));
    }

    #[test]
    fn test_input_stream_ignores_offset() {
        let content = [7u8; 50];
        let executor = Arc::new(MockExecutor::new().with_file("/data/f.bin", &content));
        let node = FileNode::new(
            DirEntry::new("f.bin", EntryKind::File, 50, UNIX_EPOCH),
            "/data/f.bin".to_string(),
            backend(executor.clone(), Arc::new(RecordingSink::default())),
        );

        let mut stream = node.create_input_stream(100).unwrap();
        let mut read = Vec::new();
        stream.read_to_end(&mut read).unwrap();

        assert_eq!(read, content.to_vec());
        assert_eq!(executor.calls(), vec![argv(&["cat", "/data/f.bin"])]);
    }

    #[test]
    fn test_input_stream_launch_failure() {
        let executor = Arc::new(MockExecutor::new().unlaunchable());
        let node = dir_node("/data/f.bin", executor);
        assert!(matches!(
            node.create_input_stream(0),
            Err(FsError::Exec(ExecError::Launch { .. }))
        ));
    }

    #[test]
    fn test_output_stream_unsupported() {
        let executor = Arc::new(MockExecutor::new());
        let node = dir_node("/data/upload.bin", executor.clone());

        assert!(matches!(
            node.create_output_stream(0),
            Err(FsError::Unsupported { .. })
        ));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_set_last_modified_fails() {
        let executor = Arc::new(MockExecutor::new());
        let node = dir_node("/data", executor.clone());
        assert!(!node.set_last_modified(UNIX_EPOCH + Duration::from_secs(10)));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_missing_entry_predicates() {
        let node = FileNode::new(
            DirEntry::missing("missing.txt"),
            "/data/missing.txt".to_string(),
            backend(Arc::new(MockExecutor::new()), Arc::new(RecordingSink::default())),
        );

        assert!(!node.exists());
        assert!(!node.is_directory());
        assert!(!node.is_file());
        assert_eq!(node.name(), "missing.txt");
        assert!(node.is_readable());
        assert!(node.is_writable());
        assert!(node.is_removable());
    }

    #[test]
    fn test_attributes() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        let entry = DirEntry::new("test.txt", EntryKind::File, 1024, modified).with_mode(0o644);
        let node = FileNode::new(
            entry,
            "/test/test.txt".to_string(),
            backend(Arc::new(MockExecutor::new()), Arc::new(RecordingSink::default())),
        );

        let attrs = node.attributes();
        assert_eq!(attrs.name, "test.txt");
        assert_eq!(attrs.path, "/test/test.txt");
        assert_eq!(attrs.kind, EntryKind::File);
        assert!(attrs.exists);
        assert_eq!(attrs.size, 1024);
        assert_eq!(attrs.mode, 0o644);
        assert_eq!(attrs.modified, 1_704_067_200);
        assert_eq!(node.last_modified(), modified);
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/", "data"), "/data");
        assert_eq!(child_path("/data", "foo"), "/data/foo");
    }
}
