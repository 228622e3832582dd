// src/ambient.rs

//! Per-thread binding of a data manager to the active transaction
//!
//! The front-end functions operate on an ambient manager. The first call
//! on an unbound thread looks up the active transaction, constructs a
//! `FileSafeManager`, joins it as a resource, and registers an after-end
//! hook that releases the binding; later calls in the same transaction
//! reuse it. After the hook fires, the next call binds a fresh manager in
//! a fresh transaction.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::handle::FileHandle;
use crate::manager::{DataManager, FileSafeManager};
use crate::mode::OpenMode;
use crate::txn;
use crate::Result;

type Bound = Rc<RefCell<dyn DataManager>>;

thread_local! {
    static MANAGER: RefCell<Option<Bound>> = const { RefCell::new(None) };
}

/// Install `manager` as the thread's ambient manager without joining a
/// transaction. Used by the in-memory test double.
pub(crate) fn bind(manager: Bound) {
    MANAGER.with(|slot| *slot.borrow_mut() = Some(manager));
}

/// Drop the thread's ambient manager binding, if any
pub(crate) fn unbind() {
    MANAGER.with(|slot| slot.borrow_mut().take());
}

/// The manager bound to this thread, constructing and joining one when
/// none is bound yet
fn bound_manager(staging_dir: Option<&Path>) -> Result<Bound> {
    if let Some(bound) = MANAGER.with(|slot| slot.borrow().clone()) {
        return Ok(bound);
    }

    let tx = txn::current()?;
    let manager: Bound = Rc::new(RefCell::new(FileSafeManager::new(
        staging_dir.map(Path::to_path_buf),
    )));
    {
        let mut tx = tx.borrow_mut();
        tx.join(Rc::clone(&manager));
        tx.on_after_end(unbind);
    }
    MANAGER.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&manager)));
    Ok(manager)
}

/// Stage a new file at `path` within the current transaction and return a
/// writable handle to the staged copy.
///
/// `staging_dir` applies only when this call constructs the thread's
/// manager; an already-bound manager keeps its staging directory.
pub fn create_file(
    path: impl AsRef<Path>,
    mode: &str,
    staging_dir: Option<&Path>,
) -> Result<Box<dyn FileHandle>> {
    let mode: OpenMode = mode.parse()?;
    bound_manager(staging_dir)?
        .borrow_mut()
        .create(path.as_ref(), mode)
}

/// Open `path` with read-after-write consistency inside the transaction
pub fn open_file(path: impl AsRef<Path>, mode: &str) -> Result<Box<dyn FileHandle>> {
    let mode: OpenMode = mode.parse()?;
    bound_manager(None)?.borrow().open(path.as_ref(), mode)
}

/// Schedule removal of `path` at commit
pub fn delete_file(path: impl AsRef<Path>) -> Result<()> {
    bound_manager(None)?.borrow_mut().delete(path.as_ref())
}

/// Schedule a move of `src` onto `dst` at commit
pub fn rename_file(src: impl AsRef<Path>, dst: impl AsRef<Path>, recursive: bool) -> Result<()> {
    bound_manager(None)?
        .borrow_mut()
        .rename(src.as_ref(), dst.as_ref(), recursive)
}

/// The transaction's logical view of whether `path` exists
pub fn file_exists(path: impl AsRef<Path>) -> Result<bool> {
    Ok(bound_manager(None)?.borrow().exists(path.as_ref()))
}
