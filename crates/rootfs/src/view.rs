//! Root-bounded filesystem view.
//!
//! The [`FileSystemView`] is the entry point a wire-protocol layer calls. It
//! turns protocol path strings into absolute, normalized paths inside the
//! configured root and hands back [`FileNode`]s built from a fresh listing.
//! Nothing is cached between calls.
//!
//! # Path handling
//!
//! Absolute paths are used as given, relative ones are joined to the home
//! directory. Either way the result is normalized lexically (`.`, `..`,
//! repeated and trailing slashes) and must stay inside the root. Symlinks are
//! not followed; the elevation shell sees the normalized string.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::FsError;
use crate::exec::{CommandExecutor, ElevatedShell};
use crate::listing::{DirEntry, ListingParser};
use crate::node::{child_path, Backend, FileNode};
use crate::session::SessionContext;

/// Per-session view of the filesystem region reachable through the shell.
pub struct FileSystemView {
    root: String,
    home: String,
    backend: Arc<Backend>,
}

impl FileSystemView {
    /// Create a view bounded by `root`, resolving relative paths against `home`.
    ///
    /// Both paths must be absolute and `home` must lie inside `root`.
    pub fn new(
        root: &str,
        home: &str,
        executor: Arc<dyn CommandExecutor>,
        parser: ListingParser,
        session: SessionContext,
    ) -> Result<Self, FsError> {
        if !root.starts_with('/') {
            return Err(FsError::InvalidPath(format!("root must be absolute: {root}")));
        }
        if !home.starts_with('/') {
            return Err(FsError::InvalidPath(format!("home must be absolute: {home}")));
        }

        let root = normalize(root);
        let home = normalize(home);
        if !is_within(&home, &root) {
            return Err(FsError::OutsideRoot { path: home, root });
        }

        Ok(Self {
            root,
            home,
            backend: Arc::new(Backend {
                executor,
                parser,
                session,
            }),
        })
    }

    /// Build a view using the elevation shell and listing settings from `config`.
    pub fn from_config(config: &Config, session: SessionContext) -> Result<Self, FsError> {
        let parser = ListingParser::new(config.filesystem.date_format)
            .strict(config.filesystem.strict_listing);
        Self::new(
            &config.filesystem.root,
            &config.filesystem.home,
            Arc::new(ElevatedShell::from_config(&config.elevation)),
            parser,
            session,
        )
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn session(&self) -> &SessionContext {
        &self.backend.session
    }

    /// Absolute, normalized form of a protocol path.
    pub fn absolute(&self, path: &str) -> Result<String, FsError> {
        let joined = if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&child_path(&self.home, path))
        };

        if is_within(&joined, &self.root) {
            Ok(joined)
        } else {
            Err(FsError::OutsideRoot {
                path: joined,
                root: self.root.clone(),
            })
        }
    }

    /// Resolve a protocol path to a node.
    ///
    /// The parent directory is listed and the entry with the matching name is
    /// wrapped. If there is none (or the listing could not be run) the node
    /// wraps a non-existent entry, so the same call serves both "stat" and
    /// "prepare a path for creation". The root of the view itself gets a
    /// synthetic directory entry.
    #[instrument(level = "trace", skip(self))]
    pub fn resolve(&self, path: &str) -> Result<FileNode, FsError> {
        let absolute = self.absolute(path)?;

        let Some((parent, name)) = split_parent(&absolute) else {
            return Ok(FileNode::new(
                DirEntry::root(),
                absolute,
                Arc::clone(&self.backend),
            ));
        };

        // The view's own root is never looked up in its parent, which lies outside it.
        if absolute == self.root {
            return Ok(FileNode::new(
                DirEntry::boundary(name),
                absolute,
                Arc::clone(&self.backend),
            ));
        }

        let entry = match self.backend.list_entries(parent) {
            Ok(entries) => entries.into_iter().find(|e| e.name() == name),
            Err(e) => {
                warn!(path = %absolute, error = %e, "Could not list parent directory");
                None
            }
        };

        let entry = entry.unwrap_or_else(|| {
            debug!(path = %absolute, "No listing entry, treating path as non-existent");
            DirEntry::missing(name)
        });

        Ok(FileNode::new(entry, absolute, Arc::clone(&self.backend)))
    }

    /// Resolve `name` relative to a directory node (scp-style requests).
    pub fn resolve_in(&self, base: &FileNode, name: &str) -> Result<FileNode, FsError> {
        self.resolve(&child_path(base.absolute_path(), name))
    }

    /// List the children of a directory node.
    pub fn list(&self, directory: &FileNode) -> Vec<FileNode> {
        directory.list_files()
    }

    /// This view; paths are never symlink-normalized, so there is no other variant.
    pub fn normalized_self(&self) -> &Self {
        self
    }
}

impl std::fmt::Debug for FileSystemView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemView")
            .field("root", &self.root)
            .field("home", &self.home)
            .field("session", &self.backend.session)
            .finish_non_exhaustive()
    }
}

/// Lexically normalize a slash-separated path into absolute form.
///
/// `..` never climbs above `/`.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

pub(crate) fn is_within(path: &str, root: &str) -> bool {
    root == "/"
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Split a normalized absolute path into parent and final segment.
/// Returns `None` for `/`.
fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}
