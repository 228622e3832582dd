// src/txn.rs

//! Minimal two-phase-commit coordinator
//!
//! Thread-scoped transactions that drive registered data managers through
//! `tpc_begin → commit → tpc_vote → tpc_finish`, or `tpc_abort` when any
//! of the first three fails. The commit-before-vote ordering is the
//! contract the managers are written against.
//!
//! Each transaction is owned by the thread that began it; resources are
//! `Rc`-shared between the transaction and the ambient binding, never
//! across threads.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::manager::DataManager;
use crate::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token identifying a transaction in resource callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(u64);

impl TxnId {
    /// Allocate a fresh token; normally done by [`begin`]
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

type Managed = Rc<RefCell<dyn DataManager>>;
type Hook = Box<dyn FnOnce()>;

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// A single thread-bound transaction
pub struct Transaction {
    id: TxnId,
    status: TxnStatus,
    resources: Vec<Managed>,
    after_end: Vec<Hook>,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<Transaction>>>> = const { RefCell::new(None) };
}

impl Transaction {
    fn new() -> Self {
        Self {
            id: TxnId::new(),
            status: TxnStatus::Active,
            resources: Vec::new(),
            after_end: Vec::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    /// Register a data manager as a participant. Joining the same manager
    /// twice is a no-op.
    pub fn join(&mut self, resource: Managed) {
        if self.resources.iter().any(|r| Rc::ptr_eq(r, &resource)) {
            return;
        }
        self.resources.push(resource);
    }

    /// Register a hook that runs once after the transaction commits or
    /// aborts, after the terminal resource callbacks.
    pub fn on_after_end(&mut self, hook: impl FnOnce() + 'static) {
        self.after_end.push(Box::new(hook));
    }
}

/// Start a new transaction bound to this thread, aborting any still-active
/// one first.
pub fn begin() -> Rc<RefCell<Transaction>> {
    if CURRENT.with(|current| current.borrow().is_some()) {
        log::warn!("beginning a transaction while one is active; aborting the active one");
        abort();
    }
    let tx = Rc::new(RefCell::new(Transaction::new()));
    CURRENT.with(|current| *current.borrow_mut() = Some(Rc::clone(&tx)));
    tx
}

/// The transaction bound to this thread
pub fn current() -> Result<Rc<RefCell<Transaction>>> {
    CURRENT
        .with(|current| current.borrow().clone())
        .ok_or(Error::NoActiveTransaction)
}

/// Commit the thread's transaction.
///
/// Resources are driven in sort-key order. An error from any begin,
/// commit, or vote callback aborts every participant and propagates;
/// after-end hooks run either way.
pub fn commit() -> Result<()> {
    let tx = CURRENT
        .with(|current| current.borrow_mut().take())
        .ok_or(Error::NoActiveTransaction)?;
    let (id, resources, hooks) = detach(&tx);

    let prepared = (|| -> Result<()> {
        for resource in &resources {
            resource.borrow_mut().tpc_begin(id)?;
        }
        for resource in &resources {
            resource.borrow_mut().commit(id)?;
        }
        for resource in &resources {
            resource.borrow_mut().tpc_vote(id)?;
        }
        Ok(())
    })();

    match prepared {
        Ok(()) => {
            for resource in &resources {
                resource.borrow_mut().tpc_finish(id);
            }
            tx.borrow_mut().status = TxnStatus::Committed;
            run_hooks(hooks);
            Ok(())
        }
        Err(err) => {
            for resource in &resources {
                resource.borrow_mut().tpc_abort(id);
            }
            tx.borrow_mut().status = TxnStatus::Aborted;
            run_hooks(hooks);
            Err(err)
        }
    }
}

/// Abort the thread's transaction. A no-op when none is active.
pub fn abort() {
    let Some(tx) = CURRENT.with(|current| current.borrow_mut().take()) else {
        return;
    };
    let (id, resources, hooks) = detach(&tx);
    for resource in &resources {
        resource.borrow_mut().tpc_abort(id);
    }
    tx.borrow_mut().status = TxnStatus::Aborted;
    run_hooks(hooks);
}

/// Pull the resource list (sorted by sort key) and the hooks out of the
/// transaction so callbacks run without holding its borrow.
fn detach(tx: &Rc<RefCell<Transaction>>) -> (TxnId, Vec<Managed>, Vec<Hook>) {
    let mut tx = tx.borrow_mut();
    let mut resources = mem::take(&mut tx.resources);
    resources.sort_by(|a, b| a.borrow().sort_key().cmp(b.borrow().sort_key()));
    (tx.id, resources, mem::take(&mut tx.after_end))
}

fn run_hooks(hooks: Vec<Hook>) {
    for hook in hooks {
        hook();
    }
}
