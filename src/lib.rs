// src/lib.rs

//! FileSafe
//!
//! Transaction-aware filesystem mutations: inside a transaction, code can
//! create, overwrite, rename, and delete regular files and have the whole
//! batch applied atomically at commit or rolled back on abort, in
//! cooperation with a two-phase-commit coordinator that may arbitrate
//! other resource managers alongside this one.
//!
//! # Architecture
//!
//! - Staged writes: `create` hands out a handle to a temp file in the
//!   staging directory; target paths stay untouched until the prepare phase
//! - Backup-before-overwrite: originals survive the commit window as
//!   `<target>.filesafe` hard links, so abort can restore them and a crash
//!   leaves an operator-recoverable backup
//! - Thread-scoped ambient manager: the free functions bind one manager
//!   per thread to the active transaction and release it when it ends
//! - In-memory double: `testing::MemoryManager` mirrors the whole contract
//!   for callers that must not touch disk

mod ambient;
mod error;
mod fsutil;
mod handle;
mod manager;
mod mode;
pub mod testing;
pub mod txn;
mod vault;

pub use ambient::{create_file, delete_file, file_exists, open_file, rename_file};
pub use error::{Error, Result};
pub use handle::FileHandle;
pub use manager::{DataManager, FileSafeManager, SORT_KEY};
pub use mode::{Access, OpenMode};
pub use txn::{Transaction, TxnId, TxnStatus};
pub use vault::{EntryKind, Vault, VaultEntry};
