//! Global object handles

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use jbridge_sdk::RawRef;
use tracing::trace;

use super::{Disposition, Lifecycle};

/// Release state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    /// Native reference is valid
    Live = 0,
    /// Released on a detached thread; waiting in the pending-actions queue
    PendingRelease = 1,
    /// Native reference deleted (terminal)
    Released = 2,
}

impl HandleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HandleState::Live,
            1 => HandleState::PendingRelease,
            _ => HandleState::Released,
        }
    }
}

/// Shared release bookkeeping; the queue keeps a clone to complete the
/// state transition after the deferred action runs.
pub(crate) struct HandleCell {
    raw: AtomicU64,
    state: AtomicU8,
    unregister_natives: bool,
}

impl HandleCell {
    pub(crate) fn set_state(&self, state: HandleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn unregisters_natives(&self) -> bool {
        self.unregister_natives
    }
}

/// Owner of one global reference.
///
/// The reference is deleted exactly once: on the first call to
/// [`release`](Self::release) or on drop. The native pointer is nulled before
/// the release action is scheduled, so later requests are no-ops.
pub struct ObjectHandle {
    cell: Arc<HandleCell>,
    lifecycle: Weak<Lifecycle>,
}

impl ObjectHandle {
    pub(crate) fn new(lifecycle: &Arc<Lifecycle>, raw: RawRef, unregister_natives: bool) -> Self {
        Self {
            cell: Arc::new(HandleCell {
                raw: AtomicU64::new(raw.to_bits()),
                state: AtomicU8::new(HandleState::Live as u8),
                unregister_natives,
            }),
            lifecycle: Arc::downgrade(lifecycle),
        }
    }

    /// The native reference, `None` once released
    pub fn raw(&self) -> Option<RawRef> {
        RawRef::from_bits(self.cell.raw.load(Ordering::Acquire))
    }

    /// Current release state
    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.cell.state.load(Ordering::Acquire))
    }

    /// Whether the native reference is still valid
    pub fn is_live(&self) -> bool {
        self.state() == HandleState::Live
    }

    /// Release the native reference.
    ///
    /// Runs the release action now when the calling thread is attached,
    /// otherwise queues it. Returns the state after the request.
    pub fn release(&self) -> HandleState {
        let bits = self.cell.raw.swap(0, Ordering::AcqRel);
        let Some(raw) = RawRef::from_bits(bits) else {
            trace!(target: "jbridge::lifecycle", "release of already released handle ignored");
            return self.state();
        };
        let Some(lifecycle) = self.lifecycle.upgrade() else {
            // Runtime connection is gone; nothing left to delete from
            self.cell.set_state(HandleState::Released);
            return HandleState::Released;
        };
        match lifecycle.release_handle(raw, Arc::clone(&self.cell)) {
            Disposition::Ran => HandleState::Released,
            Disposition::Deferred => self.state(),
        }
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("raw", &self.raw())
            .field("state", &self.state())
            .finish()
    }
}
