//! TestRuntime - an in-memory `JavaRuntime`
//!
//! Objects live in a heap map and are never collected. References are
//! numbered handles into the heap, tagged local or global, and are checked on
//! every use so a stale or double-deleted reference surfaces as
//! `InvalidReference`. Every capability except the attachment queries
//! requires the calling thread to be attached.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use jbridge_sdk::{
    ClassFlags, JValue, JavaRuntime, MemberId, RawField, RawMethod, RawRef, RuntimeError,
    RuntimeResult, ValueKind,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::builder::{
    zero_of, Body, ClassBuilder, MethodBuilder, ABSTRACT, FINAL, INTERFACE, PUBLIC, STATIC,
};

const OBJECT: &str = "java.lang.Object";
const STRING: &str = "java.lang.String";
const CLASS: &str = "java.lang.Class";

const PRIMITIVES: [&str; 9] = [
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

type ObjectId = u64;

/// Observable runtime activity, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A thread attached
    Attached(ThreadId),
    /// A thread detached
    Detached(ThreadId),
    /// A global reference was deleted
    DeleteGlobal(RawRef),
    /// A local reference was deleted
    DeleteLocal(RawRef),
    /// Natives were unregistered for a class
    UnregisterNatives(String),
    /// An object was constructed
    Construct(String),
    /// A method was invoked
    Invoke {
        /// Class the method was resolved on
        class: String,
        /// `name(params)`
        signature: String,
    },
}

// ============================================================================
// Heap
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Slot {
    Value(JValue),
    Ref(Option<ObjectId>),
}

#[derive(Debug)]
enum HeapObject {
    Instance {
        class: String,
        fields: FxHashMap<u64, Slot>,
    },
    Str(String),
    Class(String),
    Boxed {
        class: &'static str,
        value: JValue,
    },
    PrimArray {
        class: String,
        values: Vec<JValue>,
    },
    ObjArray {
        class: String,
        elements: Vec<Option<ObjectId>>,
    },
}

impl HeapObject {
    fn class_name(&self) -> &str {
        match self {
            HeapObject::Instance { class, .. }
            | HeapObject::PrimArray { class, .. }
            | HeapObject::ObjArray { class, .. } => class.as_str(),
            HeapObject::Boxed { class, .. } => *class,
            HeapObject::Str(_) => STRING,
            HeapObject::Class(_) => CLASS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RefEntry {
    object: ObjectId,
    global: bool,
    thread: ThreadId,
}

enum Member {
    Method {
        class: String,
        name: String,
        params: Vec<String>,
        ret: String,
        modifiers: u32,
        body: Option<Body>,
    },
    Constructor {
        class: String,
        params: Vec<String>,
        body: Option<Body>,
    },
    Field {
        ty: String,
        is_static: bool,
    },
}

struct ClassDef {
    builder: ClassBuilder,
    constructors: Vec<RawMethod>,
    methods: Vec<RawMethod>,
    fields: Vec<RawField>,
    instance_fields: Vec<(u64, Slot)>,
}

#[derive(Default)]
struct State {
    classes: FxHashMap<String, ClassDef>,
    class_objects: FxHashMap<String, ObjectId>,
    heap: FxHashMap<ObjectId, HeapObject>,
    refs: FxHashMap<u64, RefEntry>,
    members: FxHashMap<u64, Member>,
    statics: FxHashMap<u64, Slot>,
    monitors: FxHashMap<ObjectId, usize>,
    failing: FxHashSet<String>,
    reflective_calls: FxHashMap<String, usize>,
    deleted_globals: Vec<RawRef>,
    events: Vec<Event>,
    next_ref: u64,
    next_object: ObjectId,
    next_member: u64,
}

impl State {
    fn alloc(&mut self, object: HeapObject) -> ObjectId {
        self.next_object += 1;
        self.heap.insert(self.next_object, object);
        self.next_object
    }

    fn new_ref(&mut self, object: ObjectId, global: bool) -> RuntimeResult<RawRef> {
        self.next_ref += 1;
        let raw = RawRef::from_bits(0x1000 + self.next_ref)
            .ok_or_else(|| RuntimeError::Fault("reference space exhausted".to_string()))?;
        self.refs.insert(
            raw.to_bits(),
            RefEntry {
                object,
                global,
                thread: thread::current().id(),
            },
        );
        Ok(raw)
    }

    /// Delete the locals this thread created after `mark`
    fn pop_frame(&mut self, mark: u64) {
        let me = thread::current().id();
        self.refs
            .retain(|bits, entry| entry.global || entry.thread != me || *bits <= 0x1000 + mark);
    }

    fn local(&mut self, object: ObjectId) -> RuntimeResult<RawRef> {
        self.new_ref(object, false)
    }

    fn object_id(&self, raw: RawRef) -> RuntimeResult<ObjectId> {
        self.refs
            .get(&raw.to_bits())
            .map(|entry| entry.object)
            .ok_or_else(|| invalid(raw))
    }

    fn object(&self, raw: RawRef) -> RuntimeResult<&HeapObject> {
        let id = self.object_id(raw)?;
        self.heap.get(&id).ok_or_else(|| invalid(raw))
    }

    fn runtime_class(&self, raw: RawRef) -> RuntimeResult<String> {
        Ok(self.object(raw)?.class_name().to_string())
    }

    fn class_ref_name(&self, class: RawRef) -> RuntimeResult<String> {
        match self.object(class)? {
            HeapObject::Class(name) => Ok(name.clone()),
            other => Err(RuntimeError::InvalidReference(format!(
                "{class:?} is a {}, not a class",
                other.class_name()
            ))),
        }
    }

    fn class_object(&mut self, name: &str) -> ObjectId {
        if let Some(id) = self.class_objects.get(name) {
            return *id;
        }
        let id = self.alloc(HeapObject::Class(name.to_string()));
        self.class_objects.insert(name.to_string(), id);
        id
    }

    /// Make sure a class is defined, synthesizing array classes on demand
    fn ensure_class(&mut self, name: &str) -> RuntimeResult<()> {
        if self.classes.contains_key(name) {
            return Ok(());
        }
        match array_component(name) {
            Some(component) if component != "void" => {
                self.ensure_class(&component)?;
                self.install(ClassBuilder::array(name, &component));
                Ok(())
            }
            _ => Err(RuntimeError::ClassNotFound(name.to_string())),
        }
    }

    fn install(&mut self, builder: ClassBuilder) {
        let mut constructors = Vec::new();
        for ctor in &builder.constructors {
            let id = self.next_member_id();
            constructors.push(raw_method(id, ctor));
            self.members.insert(
                id,
                Member::Constructor {
                    class: builder.name.clone(),
                    params: ctor.params.clone(),
                    body: ctor.body.clone(),
                },
            );
        }
        let mut methods = Vec::new();
        for method in &builder.methods {
            let id = self.next_member_id();
            methods.push(raw_method(id, method));
            self.members.insert(
                id,
                Member::Method {
                    class: builder.name.clone(),
                    name: method.name.clone(),
                    params: method.params.clone(),
                    ret: method.ret.clone().unwrap_or_else(|| "void".to_string()),
                    modifiers: method.modifiers,
                    body: method.body.clone(),
                },
            );
        }
        let mut fields = Vec::new();
        let mut instance_fields = Vec::new();
        for field in &builder.fields {
            let id = self.next_member_id();
            let is_static = field.modifiers & STATIC != 0;
            let initial = self.slot_of(field.initial).unwrap_or(Slot::Ref(None));
            if is_static {
                self.statics.insert(id, initial);
            } else {
                instance_fields.push((id, initial));
            }
            fields.push(RawField {
                id: MemberId(id),
                name: field.name.clone(),
                modifiers: field.modifiers,
                field_type: field.ty.clone(),
            });
            self.members.insert(
                id,
                Member::Field {
                    ty: field.ty.clone(),
                    is_static,
                },
            );
        }
        let name = builder.name.clone();
        self.classes.insert(
            name,
            ClassDef {
                builder,
                constructors,
                methods,
                fields,
                instance_fields,
            },
        );
    }

    fn next_member_id(&mut self) -> u64 {
        self.next_member += 1;
        self.next_member
    }

    fn slot_of(&self, value: JValue) -> RuntimeResult<Slot> {
        Ok(match value {
            JValue::Object(None) => Slot::Ref(None),
            JValue::Object(Some(raw)) => Slot::Ref(Some(self.object_id(raw)?)),
            other => Slot::Value(other),
        })
    }

    fn value_of(&mut self, slot: Slot) -> RuntimeResult<JValue> {
        Ok(match slot {
            Slot::Value(v) => v,
            Slot::Ref(None) => JValue::NULL,
            Slot::Ref(Some(id)) => JValue::Object(Some(self.local(id)?)),
        })
    }

    /// Instance fields of a class and its superclasses with initial values
    fn field_layout(&self, class: &str) -> FxHashMap<u64, Slot> {
        let mut layout = FxHashMap::default();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            let Some(def) = self.classes.get(&name) else {
                break;
            };
            layout.extend(def.instance_fields.iter().copied());
            current = def.builder.superclass.clone();
        }
        layout
    }

    fn assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        if is_primitive(from) || is_primitive(to) {
            return false;
        }
        if to == OBJECT {
            return true;
        }
        if let (Some(f), Some(t)) = (array_component(from), array_component(to)) {
            return !is_primitive(&f) && !is_primitive(&t) && self.assignable(&f, &t);
        }
        let Some(def) = self.classes.get(from) else {
            return false;
        };
        def.builder
            .superclass
            .iter()
            .chain(def.builder.interfaces.iter())
            .any(|parent| self.assignable(parent, to))
    }

    /// Most-derived implementation of an instance method
    fn dispatch(&self, class: &str, name: &str, params: &[String]) -> Option<Body> {
        let mut current = Some(class.to_string());
        while let Some(c) = current {
            let def = self.classes.get(&c)?;
            let found = def.builder.methods.iter().find(|m| {
                m.name == name
                    && m.params == params
                    && m.modifiers & STATIC == 0
                    && m.body.is_some()
            });
            if let Some(method) = found {
                return method.body.clone();
            }
            current = def.builder.superclass.clone();
        }
        None
    }

    fn check_args(&self, what: &str, params: &[String], args: &[JValue]) -> RuntimeResult<()> {
        if params.len() != args.len() {
            return Err(RuntimeError::Fault(format!(
                "{what}: expected {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }
        for (index, (param, arg)) in params.iter().zip(args).enumerate() {
            self.check_slot(param, *arg).map_err(|reason| {
                RuntimeError::Fault(format!("{what}: argument {index}: {reason}"))
            })?;
        }
        Ok(())
    }

    fn check_slot(&self, ty: &str, value: JValue) -> Result<(), String> {
        let expected = kind_of(ty);
        if value.kind() != expected {
            return Err(format!("{} slot for {ty}", value.kind().name()));
        }
        if let JValue::Object(Some(raw)) = value {
            let actual = self.runtime_class(raw).map_err(|e| e.to_string())?;
            if !self.assignable(&actual, ty) {
                return Err(format!("{actual} is not assignable to {ty}"));
            }
        }
        Ok(())
    }

    fn reflect(&mut self, class: RawRef) -> RuntimeResult<&ClassDef> {
        let name = self.class_ref_name(class)?;
        *self.reflective_calls.entry(name.clone()).or_default() += 1;
        if self.failing.contains(&name) {
            return Err(RuntimeError::exception(
                "java.lang.NoClassDefFoundError",
                format!("Could not initialize class {name}"),
            ));
        }
        self.classes.get(&name).ok_or(RuntimeError::Unloaded(name))
    }
}

// ============================================================================
// TestRuntime
// ============================================================================

/// In-memory runtime with the core `java.lang` classes preloaded
pub struct TestRuntime {
    state: Mutex<State>,
    attached: Mutex<FxHashSet<ThreadId>>,
}

impl TestRuntime {
    /// Create a runtime with the bootstrap classes defined
    pub fn new() -> Self {
        let runtime = Self {
            state: Mutex::new(State::default()),
            attached: Mutex::new(FxHashSet::default()),
        };
        runtime.bootstrap();
        runtime
    }

    /// Shared handle, ready to pass to an interop context
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Define (or redefine) a class
    pub fn define(&self, class: ClassBuilder) {
        self.state.lock().install(class);
    }

    /// Make every reflective query on `class` raise an error
    pub fn fail_reflection(&self, class: &str) {
        self.state.lock().failing.insert(class.to_string());
    }

    /// Undo [`fail_reflection`](Self::fail_reflection)
    pub fn heal_reflection(&self, class: &str) {
        self.state.lock().failing.remove(class);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Global references not yet deleted
    pub fn live_global_refs(&self) -> usize {
        self.state.lock().refs.values().filter(|r| r.global).count()
    }

    /// Local references not yet deleted
    pub fn live_local_refs(&self) -> usize {
        self.state.lock().refs.values().filter(|r| !r.global).count()
    }

    /// Deleted global references, in deletion order
    pub fn deleted_globals(&self) -> Vec<RawRef> {
        self.state.lock().deleted_globals.clone()
    }

    /// Classes whose natives were unregistered, in order
    pub fn unregistered_natives(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::UnregisterNatives(class) => Some(class.clone()),
                _ => None,
            })
            .collect()
    }

    /// Everything observed so far
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Signatures of invoked methods, in call order
    pub fn invocations(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Invoke { signature, .. } => Some(signature.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of reflective queries answered for a class
    pub fn reflective_calls(&self, class: &str) -> usize {
        self.state.lock().reflective_calls.get(class).copied().unwrap_or(0)
    }

    /// Monitors currently held, counting re-entries
    pub fn held_monitors(&self) -> usize {
        self.state.lock().monitors.values().sum()
    }

    /// Text of a string object, without the attachment check
    pub fn string_value(&self, raw: RawRef) -> Option<String> {
        match self.state.lock().object(raw).ok()? {
            HeapObject::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Runtime class name of any referenced object
    pub fn class_name_of(&self, raw: RawRef) -> Option<String> {
        self.state.lock().runtime_class(raw).ok()
    }

    /// Elements of a primitive array
    pub fn primitive_array(&self, raw: RawRef) -> Option<Vec<JValue>> {
        match self.state.lock().object(raw).ok()? {
            HeapObject::PrimArray { values, .. } => Some(values.clone()),
            _ => None,
        }
    }

    /// Length of any array
    pub fn array_length(&self, raw: RawRef) -> Option<usize> {
        match self.state.lock().object(raw).ok()? {
            HeapObject::PrimArray { values, .. } => Some(values.len()),
            HeapObject::ObjArray { elements, .. } => Some(elements.len()),
            _ => None,
        }
    }

    /// Text of each string element of an object array (`None` for null or
    /// non-string elements)
    pub fn string_elements(&self, raw: RawRef) -> Option<Vec<Option<String>>> {
        let state = self.state.lock();
        let HeapObject::ObjArray { elements, .. } = state.object(raw).ok()? else {
            return None;
        };
        Some(
            elements
                .iter()
                .map(|e| match e.and_then(|id| state.heap.get(&id)) {
                    Some(HeapObject::Str(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        )
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_attached(&self) -> RuntimeResult<()> {
        if self.attached.lock().contains(&thread::current().id()) {
            Ok(())
        } else {
            Err(RuntimeError::NotAttached)
        }
    }

    /// Run a body with the state unlocked and check the returned slot
    ///
    /// Locals the body creates die with its frame; a returned object comes
    /// back as a fresh local owned by the caller.
    fn run(
        &self,
        what: &str,
        body: Option<Body>,
        this: Option<RawRef>,
        args: &[JValue],
        ret: &str,
    ) -> RuntimeResult<JValue> {
        let mark = self.state.lock().next_ref;
        let value = match body {
            Some(body) => body(self, this, args),
            None => Ok(zero_of(ret)),
        };
        let mut state = self.state.lock();
        let value = match value {
            Ok(value) => value,
            Err(err) => {
                state.pop_frame(mark);
                return Err(err);
            }
        };
        if ret == "void" {
            state.pop_frame(mark);
            return if value == JValue::Void {
                Ok(value)
            } else {
                Err(RuntimeError::Fault(format!("{what}: void method returned a value")))
            };
        }
        let checked = state
            .check_slot(ret, value)
            .map_err(|reason| RuntimeError::Fault(format!("{what}: return value: {reason}")));
        let object = match (checked, value) {
            (Ok(()), JValue::Object(Some(raw))) => state.object_id(raw).map(Some),
            (Ok(()), _) => Ok(None),
            (Err(err), _) => Err(err),
        };
        state.pop_frame(mark);
        match object? {
            Some(id) => Ok(JValue::Object(Some(state.local(id)?))),
            None => Ok(value),
        }
    }

    fn bootstrap(&self) {
        let mut state = self.state.lock();
        for p in PRIMITIVES {
            state.install(ClassBuilder::primitive(p));
        }
        state.install(
            ClassBuilder::new(OBJECT)
                .no_superclass()
                .constructor(MethodBuilder::constructor(&[]))
                .method(MethodBuilder::new("hashCode", &[], "int").body(|rt, this, _| {
                    let id = rt.state.lock().object_id(receiver(this)?)?;
                    Ok(JValue::Int(id as i32))
                }))
                .method(MethodBuilder::new("equals", &[OBJECT], "boolean").body(|rt, this, args| {
                    Ok(JValue::Boolean(rt.is_same_object(this, args[0].as_object())?))
                }))
                .method(MethodBuilder::new("toString", &[], STRING).body(|rt, this, _| {
                    let this = receiver(this)?;
                    let text = {
                        let state = rt.state.lock();
                        format!("{}@{:x}", state.runtime_class(this)?, state.object_id(this)?)
                    };
                    Ok(JValue::Object(Some(rt.new_string(&text)?)))
                })),
        );
        state.install(ClassBuilder::interface("java.io.Serializable"));
        state.install(ClassBuilder::interface("java.lang.Cloneable"));
        state.install(
            ClassBuilder::interface("java.lang.Comparable")
                .method(MethodBuilder::new("compareTo", &[OBJECT], "int").abstrakt()),
        );
        state.install(
            ClassBuilder::interface("java.lang.CharSequence")
                .method(MethodBuilder::new("length", &[], "int").abstrakt()),
        );
        state.install(
            ClassBuilder::new(STRING)
                .modifiers(PUBLIC | FINAL)
                .implements("java.io.Serializable")
                .implements("java.lang.Comparable")
                .implements("java.lang.CharSequence")
                .method(MethodBuilder::new("length", &[], "int").body(|rt, this, _| {
                    let text = rt.read_string(receiver(this)?)?;
                    Ok(JValue::Int(text.encode_utf16().count() as i32))
                }))
                .method(MethodBuilder::new("isEmpty", &[], "boolean").body(|rt, this, _| {
                    Ok(JValue::Boolean(rt.read_string(receiver(this)?)?.is_empty()))
                })),
        );
        state.install(ClassBuilder::new(CLASS).modifiers(PUBLIC | FINAL));
        state.install(
            ClassBuilder::new("java.lang.Number")
                .modifiers(PUBLIC | ABSTRACT)
                .implements("java.io.Serializable"),
        );
        for (class, parent) in [
            ("java.lang.Boolean", OBJECT),
            ("java.lang.Character", OBJECT),
            ("java.lang.Byte", "java.lang.Number"),
            ("java.lang.Short", "java.lang.Number"),
            ("java.lang.Integer", "java.lang.Number"),
            ("java.lang.Long", "java.lang.Number"),
            ("java.lang.Float", "java.lang.Number"),
            ("java.lang.Double", "java.lang.Number"),
        ] {
            state.install(
                ClassBuilder::new(class)
                    .modifiers(PUBLIC | FINAL)
                    .extends(parent)
                    .implements("java.io.Serializable")
                    .implements("java.lang.Comparable"),
            );
        }
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TestRuntime")
            .field("classes", &state.classes.len())
            .field("objects", &state.heap.len())
            .field("refs", &state.refs.len())
            .finish()
    }
}

impl JavaRuntime for TestRuntime {
    // ========================================================================
    // Reference Management
    // ========================================================================

    fn new_local_ref(&self, obj: RawRef) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.object_id(obj)?;
        state.local(id)
    }

    fn delete_local_ref(&self, obj: RawRef) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        match state.refs.get(&obj.to_bits()) {
            Some(entry) if !entry.global => {
                state.refs.remove(&obj.to_bits());
                state.events.push(Event::DeleteLocal(obj));
                Ok(())
            }
            _ => Err(invalid(obj)),
        }
    }

    fn new_global_ref(&self, obj: RawRef) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.object_id(obj)?;
        state.new_ref(id, true)
    }

    fn delete_global_ref(&self, obj: RawRef) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        match state.refs.get(&obj.to_bits()) {
            Some(entry) if entry.global => {
                state.refs.remove(&obj.to_bits());
                state.deleted_globals.push(obj);
                state.events.push(Event::DeleteGlobal(obj));
                Ok(())
            }
            _ => Err(invalid(obj)),
        }
    }

    fn unregister_natives(&self, class: RawRef) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let name = state.class_ref_name(class)?;
        state.events.push(Event::UnregisterNatives(name));
        Ok(())
    }

    fn is_same_object(&self, a: Option<RawRef>, b: Option<RawRef>) -> RuntimeResult<bool> {
        self.require_attached()?;
        let state = self.state.lock();
        Ok(match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => state.object_id(a)? == state.object_id(b)?,
            _ => false,
        })
    }

    // ========================================================================
    // Class Reflection
    // ========================================================================

    fn find_class(&self, name: &str) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        state.ensure_class(name)?;
        let id = state.class_object(name);
        state.local(id)
    }

    fn get_object_class(&self, obj: RawRef) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let class = state.runtime_class(obj)?;
        state.ensure_class(&class)?;
        let id = state.class_object(&class);
        state.local(id)
    }

    fn class_name(&self, class: RawRef) -> RuntimeResult<String> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.name.clone())
    }

    fn class_modifiers(&self, class: RawRef) -> RuntimeResult<u32> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.modifiers)
    }

    fn class_flags(&self, class: RawRef) -> RuntimeResult<ClassFlags> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.flags)
    }

    fn superclass_name(&self, class: RawRef) -> RuntimeResult<Option<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.superclass.clone())
    }

    fn interface_names(&self, class: RawRef) -> RuntimeResult<Vec<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.interfaces.clone())
    }

    fn component_type_name(&self, class: RawRef) -> RuntimeResult<Option<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.component.clone())
    }

    fn declaring_class_name(&self, class: RawRef) -> RuntimeResult<Option<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.declaring.clone())
    }

    fn enclosing_class_name(&self, class: RawRef) -> RuntimeResult<Option<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.enclosing.clone())
    }

    fn declared_class_names(&self, class: RawRef) -> RuntimeResult<Vec<String>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.builder.nested.clone())
    }

    fn declared_constructors(&self, class: RawRef) -> RuntimeResult<Vec<RawMethod>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.constructors.clone())
    }

    fn declared_methods(&self, class: RawRef) -> RuntimeResult<Vec<RawMethod>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.methods.clone())
    }

    fn declared_fields(&self, class: RawRef) -> RuntimeResult<Vec<RawField>> {
        self.require_attached()?;
        Ok(self.state.lock().reflect(class)?.fields.clone())
    }

    fn is_assignable_from(&self, from: RawRef, to: RawRef) -> RuntimeResult<bool> {
        self.require_attached()?;
        let state = self.state.lock();
        let from = state.class_ref_name(from)?;
        let to = state.class_ref_name(to)?;
        Ok(state.assignable(&from, &to))
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    fn call_method(
        &self,
        obj: RawRef,
        method: MemberId,
        ret: ValueKind,
        args: &[JValue],
    ) -> RuntimeResult<JValue> {
        self.require_attached()?;
        let (what, body, ret_ty) = {
            let mut state = self.state.lock();
            let actual = state.runtime_class(obj)?;
            let Some(Member::Method {
                class,
                name,
                params,
                ret: ret_ty,
                modifiers,
                body,
            }) = state.members.get(&method.0)
            else {
                return Err(RuntimeError::InvalidReference(format!("method {}", method.0)));
            };
            let what = format!("{name}({})", params.join(","));
            if modifiers & STATIC != 0 {
                return Err(RuntimeError::exception("java.lang.IncompatibleClassChangeError", what));
            }
            if kind_of(ret_ty) != ret {
                return Err(RuntimeError::Fault(format!(
                    "{what}: called as returning {}",
                    ret.name()
                )));
            }
            if !state.assignable(&actual, class) {
                return Err(RuntimeError::exception(
                    "java.lang.IncompatibleClassChangeError",
                    format!("{actual} does not implement {class}"),
                ));
            }
            let body = state.dispatch(&actual, name, params).or_else(|| body.clone());
            if body.is_none() && modifiers & ABSTRACT != 0 {
                return Err(RuntimeError::exception("java.lang.AbstractMethodError", what));
            }
            state.check_args(&what, params, args)?;
            let ret_ty = ret_ty.clone();
            let class = class.clone();
            state.events.push(Event::Invoke {
                class,
                signature: what.clone(),
            });
            (what, body, ret_ty)
        };
        self.run(&what, body, Some(obj), args, &ret_ty)
    }

    fn call_static_method(
        &self,
        class: RawRef,
        method: MemberId,
        ret: ValueKind,
        args: &[JValue],
    ) -> RuntimeResult<JValue> {
        self.require_attached()?;
        let (what, body, ret_ty) = {
            let mut state = self.state.lock();
            let target = state.class_ref_name(class)?;
            let Some(Member::Method {
                class: declaring,
                name,
                params,
                ret: ret_ty,
                modifiers,
                body,
            }) = state.members.get(&method.0)
            else {
                return Err(RuntimeError::InvalidReference(format!("method {}", method.0)));
            };
            let what = format!("{name}({})", params.join(","));
            if modifiers & STATIC == 0 {
                return Err(RuntimeError::exception("java.lang.IncompatibleClassChangeError", what));
            }
            if kind_of(ret_ty) != ret {
                return Err(RuntimeError::Fault(format!(
                    "{what}: called as returning {}",
                    ret.name()
                )));
            }
            if !state.assignable(&target, declaring) {
                return Err(RuntimeError::exception(
                    "java.lang.NoSuchMethodError",
                    format!("{what} is not a member of {target}"),
                ));
            }
            state.check_args(&what, params, args)?;
            let body = body.clone();
            let ret_ty = ret_ty.clone();
            state.events.push(Event::Invoke {
                class: target,
                signature: what.clone(),
            });
            (what, body, ret_ty)
        };
        self.run(&what, body, None, args, &ret_ty)
    }

    fn new_object(&self, class: RawRef, ctor: MemberId, args: &[JValue]) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let (what, body, local) = {
            let mut state = self.state.lock();
            let target = state.class_ref_name(class)?;
            let Some(Member::Constructor {
                class: declaring,
                params,
                body,
            }) = state.members.get(&ctor.0)
            else {
                return Err(RuntimeError::InvalidReference(format!("constructor {}", ctor.0)));
            };
            let what = format!("{declaring}({})", params.join(","));
            if *declaring != target {
                return Err(RuntimeError::exception(
                    "java.lang.NoSuchMethodError",
                    format!("{what} does not construct {target}"),
                ));
            }
            let abstract_class = state
                .classes
                .get(&target)
                .map_or(true, |def| def.builder.modifiers & (ABSTRACT | INTERFACE) != 0);
            if abstract_class {
                return Err(RuntimeError::exception("java.lang.InstantiationException", target));
            }
            state.check_args(&what, params, args)?;
            let body = body.clone();
            let fields = state.field_layout(&target);
            let id = state.alloc(HeapObject::Instance {
                class: target.clone(),
                fields,
            });
            let local = state.local(id)?;
            state.events.push(Event::Construct(target));
            (what, body, local)
        };
        if let Err(err) = self.run(&what, body, Some(local), args, "void") {
            self.state.lock().refs.remove(&local.to_bits());
            return Err(err);
        }
        Ok(local)
    }

    // ========================================================================
    // Field Access
    // ========================================================================

    fn get_field(&self, obj: RawRef, field: MemberId, kind: ValueKind) -> RuntimeResult<JValue> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let ty = field_type(&state, field, false)?;
        if kind_of(&ty) != kind {
            return Err(RuntimeError::Fault(format!("field of type {ty} read as {}", kind.name())));
        }
        let id = state.object_id(obj)?;
        let slot = match state.heap.get(&id) {
            Some(HeapObject::Instance { fields, .. }) => fields.get(&field.0).copied(),
            _ => None,
        };
        let slot = slot.ok_or_else(|| {
            RuntimeError::exception("java.lang.NoSuchFieldError", field.0.to_string())
        })?;
        state.value_of(slot)
    }

    fn set_field(&self, obj: RawRef, field: MemberId, value: JValue) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let ty = field_type(&state, field, false)?;
        state.check_slot(&ty, value).map_err(RuntimeError::Fault)?;
        let slot = state.slot_of(value)?;
        let id = state.object_id(obj)?;
        match state.heap.get_mut(&id) {
            Some(HeapObject::Instance { fields, .. }) if fields.contains_key(&field.0) => {
                fields.insert(field.0, slot);
                Ok(())
            }
            _ => Err(RuntimeError::exception("java.lang.NoSuchFieldError", field.0.to_string())),
        }
    }

    fn get_static_field(
        &self,
        class: RawRef,
        field: MemberId,
        kind: ValueKind,
    ) -> RuntimeResult<JValue> {
        self.require_attached()?;
        let mut state = self.state.lock();
        state.class_ref_name(class)?;
        let ty = field_type(&state, field, true)?;
        if kind_of(&ty) != kind {
            return Err(RuntimeError::Fault(format!("field of type {ty} read as {}", kind.name())));
        }
        let slot = state.statics.get(&field.0).copied().unwrap_or(Slot::Ref(None));
        state.value_of(slot)
    }

    fn set_static_field(&self, class: RawRef, field: MemberId, value: JValue) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        state.class_ref_name(class)?;
        let ty = field_type(&state, field, true)?;
        state.check_slot(&ty, value).map_err(RuntimeError::Fault)?;
        let slot = state.slot_of(value)?;
        state.statics.insert(field.0, slot);
        Ok(())
    }

    // ========================================================================
    // Value Creation
    // ========================================================================

    fn new_string(&self, s: &str) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.alloc(HeapObject::Str(s.to_string()));
        state.local(id)
    }

    fn read_string(&self, s: RawRef) -> RuntimeResult<String> {
        self.require_attached()?;
        match self.state.lock().object(s)? {
            HeapObject::Str(text) => Ok(text.clone()),
            other => Err(class_cast(other.class_name(), STRING)),
        }
    }

    fn new_primitive_array(&self, kind: ValueKind, values: &[JValue]) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        if matches!(kind, ValueKind::Void | ValueKind::Object) {
            return Err(RuntimeError::Fault(format!("no primitive array of {}", kind.name())));
        }
        if let Some(bad) = values.iter().find(|v| v.kind() != kind) {
            return Err(RuntimeError::Fault(format!(
                "{} element in {} array",
                bad.kind().name(),
                kind.name()
            )));
        }
        let mut state = self.state.lock();
        let class = array_of(kind.name());
        state.ensure_class(&class)?;
        let id = state.alloc(HeapObject::PrimArray {
            class,
            values: values.to_vec(),
        });
        state.local(id)
    }

    fn new_object_array(
        &self,
        component: RawRef,
        elements: &[Option<RawRef>],
    ) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let component = state.class_ref_name(component)?;
        if is_primitive(&component) {
            return Err(RuntimeError::Fault(format!("object array of {component}")));
        }
        let mut ids = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Some(raw) => {
                    let actual = state.runtime_class(*raw)?;
                    if !state.assignable(&actual, &component) {
                        return Err(RuntimeError::exception(
                            "java.lang.ArrayStoreException",
                            actual,
                        ));
                    }
                    ids.push(Some(state.object_id(*raw)?));
                }
                None => ids.push(None),
            }
        }
        let class = array_of(&component);
        state.ensure_class(&class)?;
        let id = state.alloc(HeapObject::ObjArray { class, elements: ids });
        state.local(id)
    }

    fn box_value(&self, value: JValue) -> RuntimeResult<RawRef> {
        self.require_attached()?;
        let class = match value {
            JValue::Boolean(_) => "java.lang.Boolean",
            JValue::Byte(_) => "java.lang.Byte",
            JValue::Char(_) => "java.lang.Character",
            JValue::Short(_) => "java.lang.Short",
            JValue::Int(_) => "java.lang.Integer",
            JValue::Long(_) => "java.lang.Long",
            JValue::Float(_) => "java.lang.Float",
            JValue::Double(_) => "java.lang.Double",
            JValue::Void | JValue::Object(_) => {
                return Err(RuntimeError::Fault(format!("cannot box {}", value.kind().name())));
            }
        };
        let mut state = self.state.lock();
        let id = state.alloc(HeapObject::Boxed { class, value });
        state.local(id)
    }

    fn unbox_value(&self, obj: RawRef, kind: ValueKind) -> RuntimeResult<JValue> {
        self.require_attached()?;
        match self.state.lock().object(obj)? {
            HeapObject::Boxed { value, .. } if value.kind() == kind => Ok(*value),
            other => Err(class_cast(other.class_name(), kind.name())),
        }
    }

    // ========================================================================
    // Monitors
    // ========================================================================

    fn monitor_enter(&self, obj: RawRef) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.object_id(obj)?;
        *state.monitors.entry(id).or_default() += 1;
        Ok(())
    }

    fn monitor_exit(&self, obj: RawRef) -> RuntimeResult<()> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.object_id(obj)?;
        match state.monitors.get_mut(&id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    state.monitors.remove(&id);
                }
                Ok(())
            }
            _ => Err(RuntimeError::exception(
                "java.lang.IllegalMonitorStateException",
                "current thread is not owner",
            )),
        }
    }

    // ========================================================================
    // Thread Attachment
    // ========================================================================

    fn is_current_thread_attached(&self) -> bool {
        self.attached.lock().contains(&thread::current().id())
    }

    fn attach_current_thread(&self) -> RuntimeResult<()> {
        let id = thread::current().id();
        if self.attached.lock().insert(id) {
            self.state.lock().events.push(Event::Attached(id));
        }
        Ok(())
    }

    fn detach_current_thread(&self) -> RuntimeResult<()> {
        let id = thread::current().id();
        if self.attached.lock().remove(&id) {
            self.state.lock().events.push(Event::Detached(id));
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn raw_method(id: u64, method: &MethodBuilder) -> RawMethod {
    RawMethod {
        id: MemberId(id),
        name: method.name.clone(),
        modifiers: method.modifiers,
        parameter_types: method.params.clone(),
        return_type: method.ret.clone(),
        exception_types: method.exceptions.clone(),
        varargs: method.varargs,
    }
}

fn field_type(state: &State, field: MemberId, want_static: bool) -> RuntimeResult<String> {
    match state.members.get(&field.0) {
        Some(Member::Field { ty, is_static }) if *is_static == want_static => Ok(ty.clone()),
        Some(Member::Field { .. }) => Err(RuntimeError::exception(
            "java.lang.IncompatibleClassChangeError",
            format!("field {}", field.0),
        )),
        _ => Err(RuntimeError::InvalidReference(format!("field {}", field.0))),
    }
}

fn receiver(this: Option<RawRef>) -> RuntimeResult<RawRef> {
    this.ok_or_else(|| RuntimeError::exception("java.lang.NullPointerException", "receiver"))
}

fn invalid(raw: RawRef) -> RuntimeError {
    RuntimeError::InvalidReference(format!("{raw:?}"))
}

fn class_cast(from: &str, to: &str) -> RuntimeError {
    RuntimeError::exception(
        "java.lang.ClassCastException",
        format!("{from} cannot be cast to {to}"),
    )
}

fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

fn kind_of(ty: &str) -> ValueKind {
    match ty {
        "void" => ValueKind::Void,
        "boolean" => ValueKind::Boolean,
        "byte" => ValueKind::Byte,
        "char" => ValueKind::Char,
        "short" => ValueKind::Short,
        "int" => ValueKind::Int,
        "long" => ValueKind::Long,
        "float" => ValueKind::Float,
        "double" => ValueKind::Double,
        _ => ValueKind::Object,
    }
}

/// Component type of an array class name
fn array_component(name: &str) -> Option<String> {
    let rest = name.strip_prefix('[')?;
    let component = match rest {
        "Z" => "boolean",
        "B" => "byte",
        "C" => "char",
        "S" => "short",
        "I" => "int",
        "J" => "long",
        "F" => "float",
        "D" => "double",
        nested if nested.starts_with('[') => nested,
        object => object.strip_prefix('L')?.strip_suffix(';')?,
    };
    Some(component.to_string())
}

/// Array class name for a component type
fn array_of(component: &str) -> String {
    let code = match component {
        "boolean" => "Z",
        "byte" => "B",
        "char" => "C",
        "short" => "S",
        "int" => "I",
        "long" => "J",
        "float" => "F",
        "double" => "D",
        nested if nested.starts_with('[') => return format!("[{nested}"),
        object => return format!("[L{object};"),
    };
    format!("[{code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> TestRuntime {
        let rt = TestRuntime::new();
        rt.attach_current_thread().unwrap();
        rt
    }

    #[test]
    fn test_requires_attachment() {
        let rt = TestRuntime::new();
        assert_eq!(rt.find_class(OBJECT), Err(RuntimeError::NotAttached));
        rt.attach_current_thread().unwrap();
        assert!(rt.find_class(OBJECT).is_ok());
        rt.detach_current_thread().unwrap();
        assert!(!rt.is_current_thread_attached());
    }

    #[test]
    fn test_reference_accounting() {
        let rt = attached();
        let local = rt.new_string("hi").unwrap();
        let global = rt.new_global_ref(local).unwrap();
        assert_eq!(rt.live_local_refs(), 1);
        assert_eq!(rt.live_global_refs(), 1);

        rt.delete_local_ref(local).unwrap();
        assert!(rt.delete_local_ref(local).is_err());
        assert!(rt.delete_local_ref(global).is_err());
        assert_eq!(rt.read_string(global).unwrap(), "hi");

        rt.delete_global_ref(global).unwrap();
        assert_eq!(rt.deleted_globals(), vec![global]);
        assert!(matches!(rt.read_string(global), Err(RuntimeError::InvalidReference(_))));
    }

    #[test]
    fn test_array_classes_are_synthesized() {
        let rt = attached();
        let class = rt.find_class("[[Ljava.lang.String;").unwrap();
        assert_eq!(rt.class_name(class).unwrap(), "[[Ljava.lang.String;");
        assert_eq!(rt.component_type_name(class).unwrap().as_deref(), Some("[Ljava.lang.String;"));
        assert!(rt.class_flags(class).unwrap().is_array);
        assert!(matches!(rt.find_class("[V"), Err(RuntimeError::ClassNotFound(_))));
    }

    #[test]
    fn test_assignability() {
        let rt = attached();
        let state = rt.state.lock();
        assert!(state.assignable(STRING, "java.lang.CharSequence"));
        assert!(state.assignable("java.lang.Integer", "java.lang.Number"));
        assert!(state.assignable("[Ljava.lang.String;", "[Ljava.lang.Object;"));
        assert!(state.assignable("[I", OBJECT));
        assert!(!state.assignable("[I", "[Ljava.lang.Object;"));
        assert!(!state.assignable("int", OBJECT));
        assert!(!state.assignable(OBJECT, STRING));
    }

    #[test]
    fn test_virtual_dispatch_and_bodies() {
        let rt = attached();
        rt.define(
            ClassBuilder::new("demo.Base")
                .constructor(MethodBuilder::constructor(&[]))
                .method(MethodBuilder::new("name", &[], "int").returns(JValue::Int(1))),
        );
        rt.define(
            ClassBuilder::new("demo.Derived")
                .extends("demo.Base")
                .constructor(MethodBuilder::constructor(&[]))
                .method(MethodBuilder::new("name", &[], "int").returns(JValue::Int(2))),
        );
        let base = rt.find_class("demo.Base").unwrap();
        let derived = rt.find_class("demo.Derived").unwrap();
        let base_name = rt.declared_methods(base).unwrap()[0].id;
        let ctor = rt.declared_constructors(derived).unwrap()[0].id;

        let obj = rt.new_object(derived, ctor, &[]).unwrap();
        assert_eq!(rt.call_method(obj, base_name, ValueKind::Int, &[]).unwrap(), JValue::Int(2));
        assert_eq!(rt.invocations(), vec!["name()".to_string()]);
    }

    #[test]
    fn test_argument_slots_are_checked() {
        let rt = attached();
        let twice = MethodBuilder::new("twice", &["int"], "int")
            .statik()
            .body(|_, _, args| match args[0] {
                JValue::Int(v) => Ok(JValue::Int(v * 2)),
                _ => Err(RuntimeError::Fault("int expected".into())),
            });
        rt.define(ClassBuilder::new("demo.Calc").method(twice));
        let class = rt.find_class("demo.Calc").unwrap();
        let twice = rt.declared_methods(class).unwrap()[0].id;
        assert_eq!(
            rt.call_static_method(class, twice, ValueKind::Int, &[JValue::Int(21)]).unwrap(),
            JValue::Int(42)
        );
        assert!(rt.call_static_method(class, twice, ValueKind::Int, &[JValue::Long(21)]).is_err());
        assert!(rt.call_static_method(class, twice, ValueKind::Long, &[JValue::Int(21)]).is_err());
    }

    #[test]
    fn test_reflection_failure_injection() {
        let rt = attached();
        let class = rt.find_class(STRING).unwrap();
        rt.fail_reflection(STRING);
        assert!(matches!(rt.declared_methods(class), Err(RuntimeError::Exception { .. })));
        rt.heal_reflection(STRING);
        assert!(rt.declared_methods(class).is_ok());
        assert_eq!(rt.reflective_calls(STRING), 2);
    }

    #[test]
    fn test_boxing_and_monitors() {
        let rt = attached();
        let boxed = rt.box_value(JValue::Long(7)).unwrap();
        assert_eq!(rt.class_name_of(boxed).as_deref(), Some("java.lang.Long"));
        assert_eq!(rt.unbox_value(boxed, ValueKind::Long).unwrap(), JValue::Long(7));
        assert!(rt.unbox_value(boxed, ValueKind::Int).is_err());

        rt.monitor_enter(boxed).unwrap();
        rt.monitor_enter(boxed).unwrap();
        assert_eq!(rt.held_monitors(), 2);
        rt.monitor_exit(boxed).unwrap();
        rt.monitor_exit(boxed).unwrap();
        assert!(rt.monitor_exit(boxed).is_err());
    }
}
