//! Call-scoped references and monitors

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use jbridge_sdk::{JavaRuntime, RawRef, RuntimeResult};
use tracing::warn;

use super::{Lifecycle, ObjectHandle};

/// Collects the local references created during one native call and deletes
/// them when dropped.
///
/// Local references are bound to the attached thread that created them, so a
/// frame cannot leave its thread.
pub struct LocalFrame<'rt> {
    runtime: &'rt dyn JavaRuntime,
    locals: RefCell<Vec<RawRef>>,
    _thread_bound: PhantomData<*const ()>,
}

impl<'rt> LocalFrame<'rt> {
    /// Open a frame on the calling (attached) thread
    pub fn new(runtime: &'rt dyn JavaRuntime) -> Self {
        Self {
            runtime,
            locals: RefCell::new(Vec::new()),
            _thread_bound: PhantomData,
        }
    }

    /// Runtime the frame's references belong to
    pub fn runtime(&self) -> &'rt dyn JavaRuntime {
        self.runtime
    }

    /// Register a local reference for deletion at frame end
    pub fn track(&self, raw: RawRef) -> RawRef {
        self.locals.borrow_mut().push(raw);
        raw
    }

    /// Register a local reference and borrow it for the frame's lifetime
    pub fn adopt(&self, raw: RawRef) -> LocalRef<'_> {
        LocalRef {
            raw: self.track(raw),
            _frame: PhantomData,
        }
    }

    /// Number of references awaiting deletion
    pub fn len(&self) -> usize {
        self.locals.borrow().len()
    }

    /// Whether the frame holds no references
    pub fn is_empty(&self) -> bool {
        self.locals.borrow().is_empty()
    }
}

impl Drop for LocalFrame<'_> {
    fn drop(&mut self) {
        let locals = std::mem::take(self.locals.get_mut());
        for raw in locals.into_iter().rev() {
            if let Err(err) = self.runtime.delete_local_ref(raw) {
                warn!(
                    target: "jbridge::lifecycle",
                    ?raw,
                    error = %err,
                    "failed to delete local reference"
                );
            }
        }
    }
}

/// A local reference borrowed from a [`LocalFrame`]
#[derive(Debug, Clone, Copy)]
pub struct LocalRef<'f> {
    raw: RawRef,
    _frame: PhantomData<&'f ()>,
}

impl LocalRef<'_> {
    /// The native reference
    pub fn raw(&self) -> RawRef {
        self.raw
    }

    /// Promote to a global handle that outlives the frame.
    ///
    /// The local reference itself is still deleted when the frame ends.
    pub fn into_global(self, lifecycle: &Arc<Lifecycle>) -> RuntimeResult<ObjectHandle> {
        lifecycle.promote(self.raw)
    }
}

/// Holds the runtime monitor of an object; exits it when dropped
pub struct MonitorGuard<'a> {
    runtime: &'a dyn JavaRuntime,
    raw: RawRef,
    _handle: &'a ObjectHandle,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> MonitorGuard<'a> {
    pub(crate) fn enter(
        runtime: &'a dyn JavaRuntime,
        handle: &'a ObjectHandle,
        raw: RawRef,
    ) -> RuntimeResult<Self> {
        runtime.monitor_enter(raw)?;
        Ok(Self {
            runtime,
            raw,
            _handle: handle,
            _thread_bound: PhantomData,
        })
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.runtime.monitor_exit(self.raw) {
            warn!(
                target: "jbridge::lifecycle",
                raw = ?self.raw,
                error = %err,
                "failed to exit monitor"
            );
        }
    }
}

impl std::fmt::Debug for MonitorGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorGuard").field("raw", &self.raw).finish()
    }
}
