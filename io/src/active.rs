//! Process-global "active workspace" convenience slot.
//!
//! `geoh5py` keeps a single module-level `weakref` to "the" workspace so
//! code far from the call site (forms, merge helpers) can reach it without
//! threading a handle through every call. Rust has no implicit GC-backed
//! weak upgrade story for an arbitrary `&mut Workspace`, so this slot holds
//! a `Weak` to a reference-counted, interior-mutable handle: callers that
//! want the convenience wrap their `Workspace` in `Rc<RefCell<Workspace>>`
//! and call `activate`; callers that don't care about the global slot just
//! use `Workspace` directly. Implemented as a `thread_local!`: activation is
//! explicitly not thread-safe, one active workspace per thread.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{IoError, Result};
use crate::workspace::Workspace;

thread_local! {
    static ACTIVE: RefCell<Option<Weak<RefCell<Workspace>>>> = RefCell::new(None);
}

/// Set `workspace` as the active workspace for this thread, replacing
/// whatever was active before.
pub fn activate(workspace: &Rc<RefCell<Workspace>>) {
    ACTIVE.with(|slot| *slot.borrow_mut() = Some(Rc::downgrade(workspace)));
}

/// Clear the active workspace slot, if set.
pub fn deactivate() {
    ACTIVE.with(|slot| *slot.borrow_mut() = None);
}

/// Fetch the active workspace, upgrading the weak reference.
///
/// Fails with `ClosedFile` if no workspace is active or the active one was
/// dropped.
pub fn active() -> Result<Rc<RefCell<Workspace>>> {
    ACTIVE.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(IoError::ClosedFile)
    })
}

/// RAII helper that activates `workspace` for the duration of the guard and
/// restores the previously active workspace (or clears the slot) on drop,
/// even if the guarded scope unwinds via panic.
pub struct ActivationGuard {
    previous: Option<Weak<RefCell<Workspace>>>,
}

impl ActivationGuard {
    pub fn new(workspace: &Rc<RefCell<Workspace>>) -> Self {
        let previous = ACTIVE.with(|slot| slot.borrow().clone());
        activate(workspace);
        ActivationGuard { previous }
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        ACTIVE.with(|slot| *slot.borrow_mut() = self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_fails_clearly_when_nothing_is_active() {
        deactivate();
        assert!(matches!(active(), Err(IoError::ClosedFile)));
    }
}
