//! The runtime-connection context
//!
//! `Interop` owns every registry the engine needs for one runtime connection:
//! the descriptor cache, the converter registry, the overload resolver and
//! the reference lifecycle. There is no ambient global state; everything goes
//! through a context.
//!
//! Each call entry point follows the same steps:
//! 1. make sure the calling thread is attached, then drain pending releases
//! 2. open a local frame for the call's temporary references
//! 3. resolve the overload, convert the arguments, invoke
//! 4. convert the result back; the frame deletes its locals on return

use std::sync::Arc;

use jbridge_sdk::{JValue, JavaRuntime, RawRef};
use tracing::debug;

use crate::convert::{self, ConverterRegistry, HostAdapter, Marshal, Quality, ScoreCx};
use crate::error::{
    ConversionError, InteropError, InteropResult, RejectedCandidate, ResolutionError,
};
use crate::host::{HostValue, JavaObject};
use crate::lifecycle::{
    HandleState, Lifecycle, LifecycleStats, LocalFrame, MonitorGuard, ObjectHandle,
};
use crate::options::InteropOptions;
use crate::reflect::{ClassInfo, DescriptorCache, FieldInfo, MethodInfo, OverloadSet};
use crate::resolve::{self, OverloadResolver, ResolverStats};
use crate::types::TypeRef;

/// One connection to a runtime
pub struct Interop {
    runtime: Arc<dyn JavaRuntime>,
    options: InteropOptions,
    lifecycle: Arc<Lifecycle>,
    classes: DescriptorCache,
    converters: ConverterRegistry,
    resolver: OverloadResolver,
}

impl Interop {
    /// Connect with default options
    pub fn new(runtime: Arc<dyn JavaRuntime>) -> Self {
        Self::with_options(runtime, InteropOptions::default())
    }

    /// Connect with explicit options
    pub fn with_options(runtime: Arc<dyn JavaRuntime>, options: InteropOptions) -> Self {
        let lifecycle = Lifecycle::new(Arc::clone(&runtime), options.pending_warn_threshold);
        Self {
            classes: DescriptorCache::new(Arc::clone(&lifecycle)),
            converters: ConverterRegistry::new(),
            resolver: OverloadResolver::new(
                options.resolution_cache,
                options.resolution_cache_capacity,
            ),
            runtime,
            options,
            lifecycle,
        }
    }

    /// The runtime capability surface
    pub fn runtime(&self) -> &Arc<dyn JavaRuntime> {
        &self.runtime
    }

    /// Options in effect
    pub fn options(&self) -> &InteropOptions {
        &self.options
    }

    /// Reference lifecycle
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Descriptor cache
    pub fn classes(&self) -> &DescriptorCache {
        &self.classes
    }

    /// Converter registry
    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Resolution counters
    pub fn resolver_stats(&self) -> ResolverStats {
        self.resolver.stats()
    }

    /// Lifecycle counters
    pub fn lifecycle_stats(&self) -> LifecycleStats {
        self.lifecycle.stats()
    }

    fn enter(&self) -> InteropResult<()> {
        Ok(self.lifecycle.enter(self.options.auto_attach)?)
    }

    fn marshal<'a>(&'a self, frame: &'a LocalFrame<'a>) -> Marshal<'a> {
        Marshal {
            runtime: &*self.runtime,
            classes: &self.classes,
            converters: &self.converters,
            lifecycle: &self.lifecycle,
            frame,
        }
    }

    /// Scoring view over this context's registries. Scoring may build
    /// descriptors, so the calling thread must have entered first.
    pub(crate) fn scoring(&self) -> ScoreCx<'_> {
        ScoreCx {
            classes: &self.classes,
            converters: &self.converters,
        }
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Attach the calling thread and drain pending releases.
    /// Returns the number of actions drained.
    pub fn attach(&self) -> InteropResult<usize> {
        Ok(self.lifecycle.attach()?)
    }

    /// Drain pending releases, then detach the calling thread
    pub fn detach(&self) -> InteropResult<()> {
        if self.lifecycle.is_attached() {
            self.lifecycle.drain();
            self.runtime.detach_current_thread()?;
        }
        Ok(())
    }

    /// Run queued releases now; does nothing on a detached thread
    pub fn drain_pending(&self) -> usize {
        self.lifecycle.drain()
    }

    /// Number of queued releases
    pub fn pending_actions(&self) -> usize {
        self.lifecycle.pending_len()
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Descriptor for a class by binary name
    pub fn get_class(&self, name: &str) -> InteropResult<Arc<ClassInfo>> {
        self.enter()?;
        Ok(self.classes.get_class(name)?)
    }

    /// Descriptor for the runtime class of a held object
    pub fn class_of_object(&self, handle: &ObjectHandle) -> InteropResult<Arc<ClassInfo>> {
        self.enter()?;
        let raw = handle.raw().ok_or(ConversionError::Released)?;
        Ok(self.classes.class_of_object(raw)?)
    }

    /// Take a global handle on any object reference and pair it with its class
    pub fn wrap(&self, obj: RawRef) -> InteropResult<JavaObject> {
        self.enter()?;
        let class = self.classes.class_of_object(obj)?;
        let handle = self.lifecycle.promote(obj)?;
        Ok(JavaObject::new(handle, class))
    }

    /// Release an object's handle; later releases are no-ops
    pub fn release(&self, obj: &JavaObject) -> HandleState {
        obj.handle().release()
    }

    /// Drop a class (and everything derived from it) after a type-unload
    /// notification. Returns the number of descriptors severed.
    pub fn invalidate_class(&self, name: &str) -> usize {
        let removed = self.classes.invalidate(name);
        self.resolver.clear();
        removed
    }

    /// Sever every descriptor and run what can be released now.
    /// Returns the number of descriptors severed.
    pub fn shutdown(&self) -> usize {
        let severed = self.classes.clear();
        self.resolver.clear();
        let drained = self.lifecycle.drain();
        debug!(
            target: "jbridge::lifecycle",
            severed,
            drained,
            pending = self.pending_actions(),
            "interop shut down"
        );
        severed
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    /// Open a frame for values converted outside a call
    pub fn frame(&self) -> LocalFrame<'_> {
        LocalFrame::new(&*self.runtime)
    }

    /// Score a value against a runtime type.
    ///
    /// Scoring may load the target's descriptor, so the calling thread is
    /// attached (or rejected) first like at every other entry point.
    pub fn score(&self, value: &HostValue, target: &TypeRef) -> InteropResult<Quality> {
        self.enter()?;
        Ok(self.converters.score(value, target, &self.scoring()))
    }

    /// Aggregate quality of `args` for one candidate; `Fail` when it does not
    /// apply
    pub fn score_candidate(
        &self,
        method: &MethodInfo,
        args: &[HostValue],
    ) -> InteropResult<Quality> {
        self.enter()?;
        let bound = resolve::bind(method, args, &self.scoring());
        Ok(bound.map_or(Quality::Fail, |b| b.quality))
    }

    /// Convert a value into a native slot; references live in `frame`
    pub fn convert(
        &self,
        value: &HostValue,
        target: &TypeRef,
        frame: &LocalFrame<'_>,
    ) -> InteropResult<JValue> {
        self.enter()?;
        let m = self.marshal(frame);
        Ok(m.convert(value, target)?)
    }

    /// Convert a native slot back into a host value
    pub fn to_host(&self, value: JValue, declared: &TypeRef) -> InteropResult<HostValue> {
        self.enter()?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        Ok(convert::to_host(value, declared, &m)?)
    }

    /// Register a host adapter. Memoised resolutions are dropped since
    /// scores may change.
    pub fn register_adapter(&self, adapter: HostAdapter) {
        self.converters.register(adapter);
        self.resolver.clear();
    }

    /// Pick the best overload for `args`
    pub fn select(
        &self,
        set: &OverloadSet,
        args: &[HostValue],
        receiver: Option<&ClassInfo>,
    ) -> InteropResult<Arc<MethodInfo>> {
        self.enter()?;
        Ok(self.resolver.select(set, args, receiver, &self.scoring())?)
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Construct an instance
    pub fn new_instance(
        &self,
        class: &Arc<ClassInfo>,
        args: &[HostValue],
    ) -> InteropResult<JavaObject> {
        self.enter()?;
        let class_raw = class.raw()?;
        let ctors = class.constructors();
        if ctors.is_empty() {
            return Err(no_such_member(class, "constructor", "<init>"));
        }
        let frame = self.frame();
        let m = self.marshal(&frame);
        let ctor = self.resolver.select(ctors, args, Some(class), &m.scoring())?;
        let jargs = marshal_args(&ctor, args, &m)?;
        let local = m.local(self.runtime.new_object(class_raw, ctor.id(), &jargs))?;
        let handle = self.lifecycle.promote(local)?;
        Ok(JavaObject::new(handle, Arc::clone(class)))
    }

    /// Call an instance method
    pub fn call_method(
        &self,
        obj: &JavaObject,
        name: &str,
        args: &[HostValue],
    ) -> InteropResult<HostValue> {
        self.enter()?;
        let class = obj.class();
        class.check_live()?;
        let set = class
            .find_methods(name, false)
            .ok_or_else(|| no_such_member(class, "method", name))?;
        let receiver = obj.raw().ok_or(ConversionError::Released)?;

        let frame = self.frame();
        let m = self.marshal(&frame);
        let method = self.resolver.select(set, args, Some(class), &m.scoring())?;
        let jargs = marshal_args(&method, args, &m)?;
        let ret = return_type(&method);
        let result = self
            .runtime
            .call_method(receiver, method.id(), ret.kind(), &jargs)?;
        let result = returned(&frame, result);
        Ok(convert::to_host(result, &ret, &m)?)
    }

    /// Call a static method
    pub fn call_static(
        &self,
        class: &Arc<ClassInfo>,
        name: &str,
        args: &[HostValue],
    ) -> InteropResult<HostValue> {
        self.enter()?;
        let class_raw = class.raw()?;
        let set = class
            .find_methods(name, true)
            .ok_or_else(|| no_such_member(class, "static method", name))?;

        let frame = self.frame();
        let m = self.marshal(&frame);
        let method = self.resolver.select(set, args, Some(class), &m.scoring())?;
        let jargs = marshal_args(&method, args, &m)?;
        let ret = return_type(&method);
        let result = self
            .runtime
            .call_static_method(class_raw, method.id(), ret.kind(), &jargs)?;
        let result = returned(&frame, result);
        Ok(convert::to_host(result, &ret, &m)?)
    }

    /// Read an instance field
    pub fn get_field(&self, obj: &JavaObject, name: &str) -> InteropResult<HostValue> {
        self.enter()?;
        let field = instance_field(obj, name)?;
        let receiver = obj.raw().ok_or(ConversionError::Released)?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        let value = self
            .runtime
            .get_field(receiver, field.id(), field.field_type().kind())?;
        let value = returned(&frame, value);
        Ok(convert::to_host(value, field.field_type(), &m)?)
    }

    /// Write an instance field
    pub fn set_field(&self, obj: &JavaObject, name: &str, value: &HostValue) -> InteropResult<()> {
        self.enter()?;
        let field = instance_field(obj, name)?;
        let receiver = obj.raw().ok_or(ConversionError::Released)?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        let slot = m.convert(value, field.field_type())?;
        Ok(self.runtime.set_field(receiver, field.id(), slot)?)
    }

    /// Read a static field
    pub fn get_static_field(&self, class: &Arc<ClassInfo>, name: &str) -> InteropResult<HostValue> {
        self.enter()?;
        let class_raw = class.raw()?;
        let field = static_field(class, name)?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        let value = self
            .runtime
            .get_static_field(class_raw, field.id(), field.field_type().kind())?;
        let value = returned(&frame, value);
        Ok(convert::to_host(value, field.field_type(), &m)?)
    }

    /// Write a static field
    pub fn set_static_field(
        &self,
        class: &Arc<ClassInfo>,
        name: &str,
        value: &HostValue,
    ) -> InteropResult<()> {
        self.enter()?;
        let class_raw = class.raw()?;
        let field = static_field(class, name)?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        let slot = m.convert(value, field.field_type())?;
        Ok(self.runtime.set_static_field(class_raw, field.id(), slot)?)
    }

    /// Hold the object's monitor until the guard is dropped
    pub fn synchronized<'a>(&'a self, obj: &'a JavaObject) -> InteropResult<MonitorGuard<'a>> {
        self.enter()?;
        let raw = obj.raw().ok_or(ConversionError::Released)?;
        Ok(MonitorGuard::enter(&*self.runtime, obj.handle(), raw)?)
    }

    /// Boxed primitives and strings to host scalars; other objects unchanged
    pub fn unbox(&self, obj: &JavaObject) -> InteropResult<HostValue> {
        self.enter()?;
        let frame = self.frame();
        let m = self.marshal(&frame);
        Ok(convert::unbox(obj, &m)?)
    }
}

impl std::fmt::Debug for Interop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interop")
            .field("options", &self.options)
            .field("classes", &self.classes)
            .field("lifecycle", &self.lifecycle)
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Bind the arguments to the chosen overload and convert each one
fn marshal_args(
    method: &MethodInfo,
    args: &[HostValue],
    m: &Marshal<'_>,
) -> InteropResult<Vec<JValue>> {
    let bound = resolve::bind(method, args, &m.scoring()).map_err(|reason| {
        ResolutionError::NoApplicableOverload {
            name: method.name().to_string(),
            arguments: args.iter().map(|a| a.type_name().to_string()).collect(),
            rejected: vec![RejectedCandidate {
                signature: method.short_signature(),
                reason,
            }],
        }
    })?;
    let mut slots = Vec::with_capacity(method.arity());
    for (param, arg) in method.parameters().iter().zip(bound.args.iter()) {
        slots.push(m.convert(arg, param)?);
    }
    Ok(slots)
}

/// Returned references are locals owned by the call's frame
fn returned(frame: &LocalFrame<'_>, value: JValue) -> JValue {
    if let JValue::Object(Some(raw)) = value {
        frame.track(raw);
    }
    value
}

fn return_type(method: &MethodInfo) -> TypeRef {
    method
        .return_type()
        .cloned()
        .unwrap_or_else(|| method.declaring_type().clone())
}

fn instance_field(obj: &JavaObject, name: &str) -> InteropResult<Arc<FieldInfo>> {
    let class = obj.class();
    class.check_live()?;
    class
        .find_field(name, false)
        .cloned()
        .ok_or_else(|| no_such_member(class, "field", name))
}

fn static_field(class: &ClassInfo, name: &str) -> InteropResult<Arc<FieldInfo>> {
    class
        .find_field(name, true)
        .cloned()
        .ok_or_else(|| no_such_member(class, "static field", name))
}

fn no_such_member(class: &ClassInfo, kind: &'static str, name: &str) -> InteropError {
    ResolutionError::NoSuchMember {
        class: class.readable_name().to_string(),
        kind,
        name: name.to_string(),
    }
    .into()
}
