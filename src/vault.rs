// src/vault.rs

//! In-memory registry of pending operations for a single transaction
//!
//! The vault maps each final target path to exactly one pending operation.
//! Recording never touches the target path itself; the commit engine
//! consumes the vault during the prepare phase and tracks its progress in
//! the per-entry flags so a later abort can undo exactly what was done.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// What should happen to a target path at commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A freshly staged file whose contents replace or create the target
    Create { staged: PathBuf },
    /// An existing filesystem path to be moved onto the target at commit.
    /// `recursive` selects whether missing parents of the target are
    /// created (and emptied parents of the source pruned).
    Rename { source: PathBuf, recursive: bool },
    /// The target is removed at commit; the path to remove is the map key
    DeletePending,
}

/// A pending operation plus the commit engine's progress flags
#[derive(Debug, Clone)]
pub struct VaultEntry {
    pub kind: EntryKind,
    /// Did the target already exist on disk when the commit engine reached
    /// this entry?
    pub has_original: bool,
    /// Has the filesystem-visible move for this entry been performed?
    pub moved: bool,
}

impl VaultEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            has_original: false,
            moved: false,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.kind, EntryKind::DeletePending)
    }
}

/// Mapping from final target path to its pending operation
#[derive(Debug, Default)]
pub struct Vault {
    entries: HashMap<PathBuf, VaultEntry>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new operation for `target`.
    ///
    /// An existing entry is replaced only when it is `DeletePending`
    /// (the delete-then-recreate case); any other occupant rejects the
    /// registration with `AlreadyStaged`.
    pub fn record(&mut self, target: PathBuf, kind: EntryKind) -> Result<()> {
        if let Some(existing) = self.entries.get(&target)
            && !existing.is_delete()
        {
            return Err(Error::AlreadyStaged(target));
        }
        self.entries.insert(target, VaultEntry::new(kind));
        Ok(())
    }

    pub fn get(&self, target: &Path) -> Option<&VaultEntry> {
        self.entries.get(target)
    }

    pub fn get_mut(&mut self, target: &Path) -> Option<&mut VaultEntry> {
        self.entries.get_mut(target)
    }

    pub fn remove(&mut self, target: &Path) -> Option<VaultEntry> {
        self.entries.remove(target)
    }

    pub fn contains(&self, target: &Path) -> bool {
        self.entries.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Stable snapshot of the target set, for commit iteration
    pub fn targets(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &VaultEntry)> {
        self.entries.iter()
    }

    /// The vault's logical view of `target`: `Some(true)` when a pending
    /// operation makes it present, `Some(false)` when pending state makes
    /// it absent, `None` when the vault has no opinion and the backing
    /// store decides.
    pub fn presence(&self, target: &Path) -> Option<bool> {
        self.entries.get(target).map(|entry| match &entry.kind {
            EntryKind::DeletePending => false,
            EntryKind::Rename { source, .. } if source == target => false,
            _ => true,
        })
    }
}
