// src/testing.rs

//! In-memory test double for the data manager
//!
//! `MemoryManager` implements the same contract as `FileSafeManager`
//! against a map from path to shared byte buffer, so callers can be
//! exercised without touching disk. It reuses the same vault type and
//! state transitions; backups are extra map entries sharing the original's
//! buffer, mirroring the hard-link backups of the real manager. Unknown
//! paths fail with a not-found I/O error instead of falling through to the
//! real filesystem.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::ambient;
use crate::fsutil;
use crate::handle::FileHandle;
use crate::manager::DataManager;
use crate::mode::OpenMode;
use crate::txn::TxnId;
use crate::vault::{EntryKind, Vault};
use crate::{Error, Result};

type Buffer = Rc<RefCell<Vec<u8>>>;

fn missing(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file in memory store: {}", path.display()),
    )
}

/// Cursor over a shared in-memory buffer, honouring the open mode the way
/// a real file handle would
#[derive(Debug)]
pub struct MemFile {
    buf: Buffer,
    pos: usize,
    mode: OpenMode,
}

impl MemFile {
    fn open(buf: Buffer, mode: OpenMode) -> Self {
        if mode.truncates() {
            buf.borrow_mut().clear();
        }
        Self { buf, pos: 0, mode }
    }
}

impl Read for MemFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.mode.readable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle is not readable",
            ));
        }
        let buf = self.buf.borrow();
        let available = buf.len().saturating_sub(self.pos);
        let n = available.min(out.len());
        out[..n].copy_from_slice(&buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.mode.writable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle is not writable",
            ));
        }
        let mut buf = self.buf.borrow_mut();
        if self.mode.appends() {
            self.pos = buf.len();
        }
        let end = self.pos + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.buf.borrow().len() as i64;
        let next = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = next as usize;
        Ok(self.pos as u64)
    }
}

impl FileHandle for MemFile {}

/// Data manager double backed by an in-memory path-to-buffer map
#[derive(Default)]
pub struct MemoryManager {
    in_commit: bool,
    vault: Vault,
    data: HashMap<PathBuf, Buffer>,
    stage_seq: u64,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vault of pending operations (test inspection)
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn in_commit(&self) -> bool {
        self.in_commit
    }

    /// Seed a file into the store, the double's equivalent of a
    /// pre-existing file on disk
    pub fn set_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.data
            .insert(path.into(), Rc::new(RefCell::new(contents.into())));
    }

    /// Raw contents currently stored at `path`, including staged files and
    /// backups
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.data.get(path).map(|buf| buf.borrow().clone())
    }

    /// Whether the store holds an entry at `path` (staged files and
    /// backups included)
    pub fn stored(&self, path: &Path) -> bool {
        self.data.contains_key(path)
    }

    fn stage_key(&mut self, target: &Path) -> PathBuf {
        self.stage_seq += 1;
        let mut name = target.as_os_str().to_os_string();
        name.push(format!(".stage-{}", self.stage_seq));
        PathBuf::from(name)
    }
}

impl DataManager for MemoryManager {
    fn create(&mut self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        if let Some(entry) = self.vault.get(target)
            && !entry.is_delete()
        {
            return Err(Error::AlreadyStaged(target.to_path_buf()));
        }
        let staged = self.stage_key(target);
        let buf: Buffer = Rc::new(RefCell::new(Vec::new()));
        self.data.insert(staged.clone(), Rc::clone(&buf));
        self.vault
            .record(target.to_path_buf(), EntryKind::Create { staged })?;
        Ok(Box::new(MemFile::open(buf, mode)))
    }

    fn open(&self, target: &Path, mode: OpenMode) -> Result<Box<dyn FileHandle>> {
        if let Some(entry) = self.vault.get(target) {
            match &entry.kind {
                EntryKind::Create { staged } => {
                    let buf = self
                        .data
                        .get(staged)
                        .cloned()
                        .ok_or_else(|| Error::Io(missing(staged)))?;
                    return Ok(Box::new(MemFile::open(buf, mode)));
                }
                EntryKind::DeletePending => {
                    return Err(Error::NotFound(target.to_path_buf()));
                }
                EntryKind::Rename { .. } => {}
            }
        }
        let buf = self
            .data
            .get(target)
            .cloned()
            .ok_or_else(|| Error::Io(missing(target)))?;
        Ok(Box::new(MemFile::open(buf, mode)))
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
                self.data.remove(&staged);
                self.vault.remove(target);
                Ok(())
            }
            Some(EntryKind::Rename { .. }) => {
                self.vault.remove(target);
                Ok(())
            }
            Some(EntryKind::DeletePending) => Err(Error::NotFound(target.to_path_buf())),
            None => {
                if !self.data.contains_key(target) {
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
            .unwrap_or_else(|| self.data.contains_key(target))
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
            match entry.kind.clone() {
                EntryKind::DeletePending => {
                    let Some(buf) = self.data.remove(&target) else {
                        return Err(Error::Commit {
                            source: missing(&target),
                            target,
                        });
                    };
                    self.data.insert(backup, buf);
                    entry.has_original = true;
                    entry.moved = true;
                }
                EntryKind::Create { staged }
                | EntryKind::Rename {
                    source: staged, ..
                } => {
                    if let Some(original) = self.data.get(&target).cloned() {
                        // Same buffer under the backup key, like the hard
                        // link the real manager takes.
                        self.data.insert(backup, original);
                        entry.has_original = true;
                    }
                    let Some(buf) = self.data.remove(&staged) else {
                        return Err(Error::Commit {
                            source: missing(&staged),
                            target,
                        });
                    };
                    self.data.insert(target.clone(), buf);
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
                if self.data.remove(&backup).is_none() {
                    log::warn!("no backup to remove for {}", target.display());
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
                    match self.data.remove(&backup) {
                        Some(buf) => {
                            self.data.insert(target.clone(), buf);
                        }
                        None => log::warn!("no backup to restore for {}", target.display()),
                    }
                } else {
                    match &entry.kind {
                        EntryKind::Rename { source, .. } => match self.data.remove(target) {
                            Some(buf) => {
                                self.data.insert(source.clone(), buf);
                            }
                            None => log::warn!(
                                "nothing to move back to {} for {}",
                                source.display(),
                                target.display()
                            ),
                        },
                        _ => {
                            if self.data.remove(target).is_none() {
                                log::warn!("nothing to remove for {}", target.display());
                            }
                        }
                    }
                }
            } else if let EntryKind::Create { staged } = &entry.kind
                && self.data.remove(staged).is_none()
            {
                log::warn!("no staged file to remove for {}", target.display());
            }
        }
        self.vault.clear();
        self.in_commit = false;
    }
}

/// Bind a fresh in-memory manager as the thread's ambient manager.
///
/// Front-end calls made afterwards operate purely in memory and need no
/// active transaction; drive the 2PC callbacks on the returned manager to
/// play the coordinator. Pair with [`teardown_memory_manager`].
pub fn setup_memory_manager() -> Rc<RefCell<MemoryManager>> {
    let manager = Rc::new(RefCell::new(MemoryManager::new()));
    let coerced: Rc<RefCell<dyn DataManager>> = Rc::clone(&manager) as Rc<RefCell<dyn DataManager>>;
    ambient::bind(coerced);
    manager
}

/// Remove the ambient binding installed by [`setup_memory_manager`]
pub fn teardown_memory_manager() {
    ambient::unbind();
}
