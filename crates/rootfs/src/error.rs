//! Errors surfaced by file nodes and filesystem views.

use thiserror::Error;

use crate::exec::ExecError;
use crate::listing::ParseError;

/// Errors that a protocol layer may need to translate into its own codes.
///
/// Most node operations report failure as a plain `false` or an empty list;
/// this type covers the calls that hand back a value.
#[derive(Debug, Error)]
pub enum FsError {
    /// The operation is not available on this backend.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    /// The normalized path escapes the configured root.
    #[error("path is outside the configured root {root}: {path}")]
    OutsideRoot { path: String, root: String },

    /// A root or home path is not usable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The elevation shell could not be run.
    #[error("command failed: {0}")]
    Exec(#[from] ExecError),

    /// The listing did not match the expected format (strict mode only).
    #[error("listing parse error: {0}")]
    Listing(#[from] ParseError),
}
