//! # rootfs
//!
//! A file-transfer server's view of a filesystem region it cannot access
//! directly. Every operation is delegated to an elevation shell (`su -c ...`)
//! and the shell's text output is parsed back into typed values.
//!
//! ## Overview
//!
//! - **Listing parser** ([`listing`]): turns `ls -lA` output into [`DirEntry`] values
//! - **Command executor** ([`exec`]): runs one elevated process per operation
//! - **File node** ([`node`]): per-path handle with stat, list, read and mutate operations
//! - **Filesystem view** ([`view`]): root-bounded path resolution, the entry point
//!   for wire-protocol layers
//!
//! ```text
//!  protocol layer ──► FileSystemView::resolve ──► ls -lA <parent> ──► ListingParser
//!        │                      │
//!        └──────► FileNode ─────┴──► mkdir / rm -rf / mv / cat / ls -lA
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rootfs::{Config, FileSystemView, SessionContext};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let view = FileSystemView::from_config(&config, SessionContext::local())?;
//!
//!     let dir = view.resolve("/data/local/tmp")?;
//!     for child in view.list(&dir) {
//!         println!("{} {}", child.size(), child.absolute_path());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Uploads are not supported: [`FileNode::create_output_stream`] always
//! fails, and reads ignore the requested offset.

pub mod config;
pub mod error;
pub mod exec;
pub mod listing;
pub mod node;
pub mod session;
pub mod view;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::FsError;
pub use exec::{ChildStream, CommandExecutor, ElevatedShell, ExecError};
pub use listing::{DateFormat, DirEntry, EntryKind, ListingParser, ListingReport, ParseError};
pub use node::{FileAttributes, FileNode};
pub use session::{ClientAction, ClientActionKind, ClientActionSink, LogActionSink, SessionContext};
pub use view::FileSystemView;
