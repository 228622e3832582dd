// src/error.rs

//! Crate-wide error types
//!
//! Precondition failures (caller bugs) and prepare-phase failures raise.
//! Cleanup failures during finish and abort never appear here: by that
//! point the transaction outcome is decided, so the engines log and
//! swallow them instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the data manager and the front-end functions
#[derive(Debug, Error)]
pub enum Error {
    /// The target path already has a pending operation in this transaction
    #[error("{} is already staged in this transaction", .0.display())]
    AlreadyStaged(PathBuf),

    /// Delete or open of a path the transaction considers absent
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    /// A front-end call was made on a thread with no active transaction
    #[error("no active transaction on this thread")]
    NoActiveTransaction,

    /// The open-mode string could not be parsed
    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),

    /// Failed to allocate or open a staging file
    #[error("failed to stage {}", target.display())]
    Staging {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Prepare-phase failure; the coordinator is expected to vote failure
    /// and drive abort on every participant
    #[error("commit failed for {}", target.display())]
    Commit {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The staging directory and the target live on different filesystems
    #[error(
        "cannot rename across filesystems; the staging directory must share \
         a filesystem with {}",
        target.display()
    )]
    CrossDevice { target: PathBuf },

    /// Passthrough I/O error from a plain filesystem open
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
