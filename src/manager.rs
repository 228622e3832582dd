// src/manager.rs

//! File-level two-phase-commit data manager
//!
//! Pending creates, renames, and deletes are recorded in a vault without
//! touching their target paths. The coordinator's prepare phase then
//! realises the whole batch: each original is preserved as a
//! `<target>.filesafe` hard link (or renamed aside for deletions) before a
//! single rename moves the staged file or rename source into place. Finish
//! removes the backups; abort restores them.
//!
//! A failure mid-commit stops the loop and leaves partially-moved state in
//! place; the subsequent abort consults each entry's `moved` flag to undo
//! exactly what was done. A `.filesafe` file found after a crash means a
//! commit was interrupted after backup creation; renaming it back over the
//! target restores the original.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fsutil;
use crate::handle::FileHandle;
use crate::mode::OpenMode;
use crate::txn::TxnId;
use crate::vault::{EntryKind, Vault};
use crate::{Error, Result};

/// Sort key ordering this manager's callbacks ahead of most other resource
/// managers
pub const SORT_KEY: &str = "safety first";

/// Capability set shared by the real manager and the in-memory double.
///
/// The `tpc_*` methods are the resource-manager side of the coordinator's
/// two-phase commit: `tpc_begin → commit → tpc_vote → tpc_finish`, with
/// `tpc_abort` replacing `tpc_finish` on failure. `tpc_begin` and
/// `tpc_vote` are successful no-ops; all the prepare work happens in
/// `commit`. Finish and abort cannot fail: cleanup errors are logged and
/// swallowed because the transaction outcome is already decided.
pub trait DataManager {
    /// Stage a new file for `target` and return a writable handle to the
    /// staged copy. The target itself is untouched until commit.
    fn create(&mut self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>>;

    /// Open `target` with read-after-write consistency inside the
    /// transaction: a pending create is served from its staged file.
    fn open(&self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>>;

    /// Record a move of `source` onto `target` at commit. The source stays
    /// in place until then; a missing source surfaces as a commit error.
    fn rename(&mut self, source: &Path, target: &Path, recursive: bool) -> Result<()>;

    /// Record removal of `target` at commit, or discard a pending
    /// operation already staged for it.
    fn delete(&mut self, target: &Path) -> Result<()>;

    /// The transaction's logical view of whether `target` is present
    fn exists(&self, target: &Path) -> bool;

    fn tpc_begin(&mut self, txn: TxnId) -> Result<()>;

    /// Prepare phase: apply the vault to the backing store
    fn commit(&mut self, txn: TxnId) -> Result<()>;

    fn tpc_vote(&mut self, txn: TxnId) -> Result<()>;

    /// Terminal success path: drop backups
    fn tpc_finish(&mut self, txn: TxnId);

    /// Terminal failure path: restore originals, undo moves, drop staged
    /// files
    fn tpc_abort(&mut self, txn: TxnId);

    /// The coordinator may abort pre- or post-prepare; the per-entry
    /// `moved` flag makes this the same operation as `tpc_abort`.
    fn abort(&mut self, txn: TxnId) {
        self.tpc_abort(txn);
    }

    /// Constant key the coordinator sorts resource callbacks by
    fn sort_key(&self) -> &'static str {
        SORT_KEY
    }
}

/// Two-phase-commit data manager for regular files on a local filesystem.
///
/// One manager serves one transaction on one thread. The staging directory
/// must share a filesystem with the targets it will commit to; a violation
/// surfaces as a cross-device error during the prepare phase.
pub struct FileSafeManager {
    staging_dir: Option<PathBuf>,
    in_commit: bool,
    vault: Vault,
}

impl FileSafeManager {
    /// Create a manager staging into `staging_dir`, or the platform temp
    /// directory when `None`
    pub fn new(staging_dir: Option<PathBuf>) -> Self {
        Self {
            staging_dir,
            in_commit: false,
            vault: Vault::new(),
        }
    }

    /// The vault of pending operations (test inspection)
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// True exactly between the start of the prepare phase and the start
    /// of finish or abort
    pub fn in_commit(&self) -> bool {
        self.in_commit
    }

    fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// Allocate a uniquely named staging file that survives handle drop
    fn stage_file(&self, target: &Path) -> Result<PathBuf> {
        let staged = tempfile::Builder::new()
            .prefix("filesafe-")
            .tempfile_in(self.staging_dir())
            .map_err(|source| Error::Staging {
                target: target.to_path_buf(),
                source,
            })?;
        let (_, path) = staged.keep().map_err(|err| Error::Staging {
            target: target.to_path_buf(),
            source: err.error,
        })?;
        Ok(path)
    }
}

fn commit_error(target: &Path, source: io::Error) -> Error {
    if fsutil::is_cross_device(&source) {
        Error::CrossDevice {
            target: target.to_path_buf(),
        }
    } else {
        Error::Commit {
            target: target.to_path_buf(),
            source,
        }
    }
}

impl DataManager for FileSafeManager {
    fn create(&mut self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        // Check before allocating so a rejected registration leaves no
        // stray staging file behind.
        if let Some(entry) = self.vault.get(target)
            && !entry.is_delete()
        {
            return Err(Error::AlreadyStaged(target.to_path_buf()));
        }
        let staged = self.stage_file(target)?;
        let handle = mode.open_options().open(&staged).map_err(|source| Error::Staging {
            target: target.to_path_buf(),
            source,
        })?;
        self.vault
            .record(target.to_path_buf(), EntryKind::Create { staged })?;
        Ok(Box::new(handle))
    }

    fn open(&self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        if let Some(entry) = self.vault.get(target) {
            match &entry.kind {
                EntryKind::Create { staged } => {
                    return Ok(Box::new(mode.open_options().open(staged)?));
                }
                EntryKind::DeletePending => {
                    return Err(Error::NotFound(target.to_path_buf()));
                }
                EntryKind::Rename { .. } => {}
            }
        }
        Ok(Box::new(mode.open_options().open(target)?))
    }

    fn rename(&mut self, source: &Path, target: &Path, recursive: bool) -> Result<()> {
        self.vault.record(
            target.to_path_buf(),
            EntryKind::Rename {
                source: source.to_path_buf(),
                recursive,
            },
        )
    }

    fn delete(&mut self, target: &Path) -> Result<()> {
        match self.vault.get(target).map(|entry| entry.kind.clone()) {
            Some(EntryKind::Create { staged }) => {
                // Net effect is "no change for this target".
                if let Err(err) = fs::remove_file(&staged) {
                    log::warn!(
                        "failed to remove staged file {}: {}",
                        staged.display(),
                        err
                    );
                }
                self.vault.remove(target);
                Ok(())
            }
            Some(EntryKind::Rename { .. }) => {
                self.vault.remove(target);
                Ok(())
            }
            Some(EntryKind::DeletePending) => Err(Error::NotFound(target.to_path_buf())),
            None => {
                if !target.exists() {
                    return Err(Error::NotFound(target.to_path_buf()));
                }
                self.vault
                    .record(target.to_path_buf(), EntryKind::DeletePending)
            }
        }
    }

    fn exists(&self, target: &Path) -> bool {
        self.vault
            .presence(target)
            .unwrap_or_else(|| target.exists())
    }

    fn tpc_begin(&mut self, _txn: TxnId) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self, _txn: TxnId) -> Result<()> {
        self.in_commit = true;
        for target in self.vault.targets() {
            let Some(entry) = self.vault.get_mut(&target) else {
                continue;
            };
            let backup = fsutil::backup_path(&target);
            match &entry.kind {
                EntryKind::DeletePending => {
                    // The client contract said the file existed when the
                    // delete was recorded; a missing target propagates.
                    fs::rename(&target, &backup).map_err(|err| commit_error(&target, err))?;
                    entry.has_original = true;
                    entry.moved = true;
                }
                EntryKind::Create { staged } => {
                    if target.exists() {
                        fs::hard_link(&target, &backup)
                            .map_err(|err| commit_error(&target, err))?;
                        entry.has_original = true;
                    }
                    fs::rename(staged, &target).map_err(|err| commit_error(&target, err))?;
                    entry.moved = true;
                }
                EntryKind::Rename { source, recursive } => {
                    if target.exists() {
                        fs::hard_link(&target, &backup)
                            .map_err(|err| commit_error(&target, err))?;
                        entry.has_original = true;
                    }
                    fsutil::rename(source, &target, *recursive)
                        .map_err(|err| commit_error(&target, err))?;
                    entry.moved = true;
                }
            }
        }
        Ok(())
    }

    fn tpc_vote(&mut self, _txn: TxnId) -> Result<()> {
        Ok(())
    }

    fn tpc_finish(&mut self, _txn: TxnId) {
        for (target, entry) in self.vault.iter() {
            if entry.is_delete() || entry.has_original {
                let backup = fsutil::backup_path(target);
                if let Err(err) = fs::remove_file(&backup) {
                    log::warn!("failed to remove backup {}: {}", backup.display(), err);
                }
            }
        }
        self.vault.clear();
        self.in_commit = false;
    }

    fn tpc_abort(&mut self, _txn: TxnId) {
        for (target, entry) in self.vault.iter() {
            if entry.moved {
                if entry.has_original {
                    let backup = fsutil::backup_path(target);
                    if let Err(err) = fs::rename(&backup, target) {
                        log::warn!(
                            "failed to restore original {}: {}",
                            target.display(),
                            err
                        );
                    }
                } else {
                    match &entry.kind {
                        EntryKind::Rename { source, recursive } => {
                            if let Err(err) = fsutil::rename(target, source, *recursive) {
                                log::warn!(
                                    "failed to move {} back to {}: {}",
                                    target.display(),
                                    source.display(),
                                    err
                                );
                            }
                        }
                        _ => {
                            if let Err(err) = fs::remove_file(target) {
                                log::warn!(
                                    "failed to remove {}: {}",
                                    target.display(),
                                    err
                                );
                            }
                        }
                    }
                }
            } else if let EntryKind::Create { staged } = &entry.kind {
                if let Err(err) = fs::remove_file(staged) {
                    log::warn!(
                        "failed to remove staged file {}: {}",
                        staged.display(),
                        err
                    );
                }
            }
        }
        self.vault.clear();
        self.in_commit = false;
    }
}
