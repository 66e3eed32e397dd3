//! Reference lifecycle and the pending-actions queue
//!
//! Every global handle has exactly one releasing action (delete the global
//! reference, optionally preceded by unregistering native callbacks). Those
//! actions must run on a thread attached to the runtime. When the releasing
//! thread is not attached the action is queued on the process-wide FIFO owned
//! by the runtime connection and runs the next time a thread attaches or
//! enters the runtime through the interop context.
//!
//! Queue discipline:
//! - enqueue from any thread, attached or not
//! - one drainer at a time (the drain right)
//! - FIFO, each action executed at most once

mod frame;
mod handle;

pub use frame::{LocalFrame, LocalRef, MonitorGuard};
pub use handle::{HandleState, ObjectHandle};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jbridge_sdk::{JavaRuntime, RawRef, RuntimeError, RuntimeResult};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use handle::HandleCell;

/// A cleanup operation that must run on an attached thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// Delete a global reference
    DeleteGlobalRef(RawRef),
    /// Unregister native callbacks bound to a class
    UnregisterNatives(RawRef),
}

impl ReleaseAction {
    fn execute(self, runtime: &dyn JavaRuntime) -> RuntimeResult<()> {
        match self {
            ReleaseAction::DeleteGlobalRef(raw) => runtime.delete_global_ref(raw),
            ReleaseAction::UnregisterNatives(raw) => runtime.unregister_natives(raw),
        }
    }
}

/// What happened to a release request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Executed on the calling thread
    Ran,
    /// Queued until the next attach point
    Deferred,
}

struct PendingAction {
    action: ReleaseAction,
    /// Handle that becomes RELEASED once this action has run
    completes: Option<Arc<HandleCell>>,
}

/// Counters for the lifecycle subsystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    /// Actions executed (immediately or from the queue)
    pub executed: u64,
    /// Actions that had to be queued
    pub deferred: u64,
    /// Actions currently queued
    pub pending: usize,
}

/// Owner of the pending-actions queue for one runtime connection
pub struct Lifecycle {
    runtime: Arc<dyn JavaRuntime>,
    pending: Mutex<VecDeque<PendingAction>>,
    drain_right: Mutex<()>,
    warn_threshold: usize,
    executed: AtomicU64,
    deferred: AtomicU64,
}

impl Lifecycle {
    /// Create the lifecycle subsystem for a runtime connection
    pub fn new(runtime: Arc<dyn JavaRuntime>, warn_threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            pending: Mutex::new(VecDeque::new()),
            drain_right: Mutex::new(()),
            warn_threshold,
            executed: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
        })
    }

    /// The runtime this lifecycle releases references into
    pub fn runtime(&self) -> &Arc<dyn JavaRuntime> {
        &self.runtime
    }

    /// Whether the calling thread may run actions now
    pub fn is_attached(&self) -> bool {
        self.runtime.is_current_thread_attached()
    }

    /// Run an action now if the calling thread is attached, otherwise queue it
    pub fn run_or_defer(&self, action: ReleaseAction) -> Disposition {
        self.run_or_defer_all(&[action], None)
    }

    fn run_or_defer_all(
        &self,
        actions: &[ReleaseAction],
        completes: Option<Arc<HandleCell>>,
    ) -> Disposition {
        if self.is_attached() {
            for action in actions {
                self.execute(*action);
            }
            if let Some(cell) = completes {
                cell.set_state(HandleState::Released);
            }
            return Disposition::Ran;
        }

        if let Some(cell) = &completes {
            cell.set_state(HandleState::PendingRelease);
        }
        let depth = {
            let mut pending = self.pending.lock();
            let last = actions.len().saturating_sub(1);
            for (i, action) in actions.iter().enumerate() {
                pending.push_back(PendingAction {
                    action: *action,
                    completes: if i == last { completes.clone() } else { None },
                });
            }
            pending.len()
        };
        self.deferred.fetch_add(actions.len() as u64, Ordering::Relaxed);
        if depth > self.warn_threshold {
            warn!(
                target: "jbridge::lifecycle",
                depth,
                "pending-actions queue is growing; no thread has attached recently"
            );
        } else {
            trace!(target: "jbridge::lifecycle", depth, "release deferred until next attach");
        }
        Disposition::Deferred
    }

    /// Release a global handle's native reference
    pub(crate) fn release_handle(&self, raw: RawRef, cell: Arc<HandleCell>) -> Disposition {
        if cell.unregisters_natives() {
            self.run_or_defer_all(
                &[
                    ReleaseAction::UnregisterNatives(raw),
                    ReleaseAction::DeleteGlobalRef(raw),
                ],
                Some(cell),
            )
        } else {
            self.run_or_defer_all(&[ReleaseAction::DeleteGlobalRef(raw)], Some(cell))
        }
    }

    fn execute(&self, action: ReleaseAction) {
        if let Err(err) = action.execute(&*self.runtime) {
            warn!(target: "jbridge::lifecycle", ?action, error = %err, "release action failed");
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Run every queued action on the calling thread.
    ///
    /// Returns the number of actions executed. Does nothing when the calling
    /// thread is not attached. Blocks while another thread holds the drain
    /// right, so on return every action queued before the call has run.
    pub fn drain(&self) -> usize {
        if !self.is_attached() {
            return 0;
        }
        let _right = self.drain_right.lock();
        let mut count = 0;
        loop {
            let next = self.pending.lock().pop_front();
            let Some(pending) = next else { break };
            self.execute(pending.action);
            if let Some(cell) = pending.completes {
                cell.set_state(HandleState::Released);
            }
            count += 1;
        }
        if count > 0 {
            debug!(target: "jbridge::lifecycle", count, "drained pending actions");
        }
        count
    }

    /// Attach the calling thread (if needed) and drain the queue
    pub fn attach(&self) -> RuntimeResult<usize> {
        if !self.is_attached() {
            self.runtime.attach_current_thread()?;
            trace!(target: "jbridge::lifecycle", "attached current thread");
        }
        Ok(self.drain())
    }

    /// Entry point for application calls: make sure the thread is attached
    /// and the queue is drained before proceeding
    pub fn enter(&self, auto_attach: bool) -> RuntimeResult<()> {
        if self.is_attached() {
            self.drain();
            return Ok(());
        }
        if !auto_attach {
            return Err(RuntimeError::NotAttached);
        }
        self.attach().map(|_| ())
    }

    /// Number of queued actions
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            executed: self.executed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            pending: self.pending_len(),
        }
    }

    /// Take ownership of an existing global reference
    pub fn adopt_global(self: &Arc<Self>, raw: RawRef) -> ObjectHandle {
        ObjectHandle::new(self, raw, false)
    }

    /// Take ownership of a global reference to a class whose native
    /// callbacks must be unregistered before the reference is deleted
    pub fn adopt_class_global(self: &Arc<Self>, raw: RawRef) -> ObjectHandle {
        ObjectHandle::new(self, raw, true)
    }

    /// Create a global reference from any reference and take ownership
    pub fn promote(self: &Arc<Self>, obj: RawRef) -> RuntimeResult<ObjectHandle> {
        let global = self.runtime.new_global_ref(obj)?;
        Ok(self.adopt_global(global))
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("stats", &self.stats())
            .finish()
    }
}
