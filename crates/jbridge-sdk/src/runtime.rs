//! JavaRuntime trait: the capability surface
//!
//! Defines the primitive operations the interop engine consumes from the
//! foreign-runtime binding layer. A JNI binding provides the production
//! implementation; the engine only ever sees this trait.
//!
//! Every method except the thread-attachment queries must be called from a
//! thread that is attached to the runtime. Implementations report
//! `RuntimeError::NotAttached` otherwise.

use crate::error::RuntimeResult;
use crate::value::{JValue, MemberId, RawRef, ValueKind};

/// Kind predicates of a class, answered in one reflective round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassFlags {
    /// `Class.isInterface()`
    pub is_interface: bool,
    /// `Class.isPrimitive()`
    pub is_primitive: bool,
    /// `Class.isArray()`
    pub is_array: bool,
    /// `Class.isEnum()`
    pub is_enum: bool,
    /// `Class.isAnonymousClass()`
    pub is_anonymous: bool,
    /// `Class.isLocalClass()`
    pub is_local: bool,
    /// `Class.isMemberClass()`
    pub is_member: bool,
}

/// Reflective snapshot of one declared method or constructor.
///
/// Types are given by binary name (`Class.getName()`), e.g. `int`,
/// `java.lang.String`, `[Ljava.lang.Object;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMethod {
    /// Resolved id used for invocation
    pub id: MemberId,
    /// Simple name (`<init>` for constructors)
    pub name: String,
    /// Raw `java.lang.reflect.Modifier` bits
    pub modifiers: u32,
    /// Parameter types in declaration order
    pub parameter_types: Vec<String>,
    /// Return type; `None` for constructors
    pub return_type: Option<String>,
    /// Declared exception types
    pub exception_types: Vec<String>,
    /// Whether the last parameter is variadic
    pub varargs: bool,
}

/// Reflective snapshot of one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    /// Resolved id used for access
    pub id: MemberId,
    /// Field name
    pub name: String,
    /// Raw `java.lang.reflect.Modifier` bits
    pub modifiers: u32,
    /// Field type by binary name
    pub field_type: String,
}

/// Capability surface of the foreign runtime.
///
/// Implementations must be usable from many threads at once. Calls block the
/// calling thread for the duration of the foreign call; no deadline applies.
pub trait JavaRuntime: Send + Sync {
    // ========================================================================
    // Reference Management
    // ========================================================================

    /// Create a local reference, valid until deleted or the frame ends
    fn new_local_ref(&self, obj: RawRef) -> RuntimeResult<RawRef>;

    /// Delete a local reference
    fn delete_local_ref(&self, obj: RawRef) -> RuntimeResult<()>;

    /// Create a global reference, valid until explicitly deleted
    fn new_global_ref(&self, obj: RawRef) -> RuntimeResult<RawRef>;

    /// Delete a global reference
    fn delete_global_ref(&self, obj: RawRef) -> RuntimeResult<()>;

    /// Unregister native callbacks bound to a class
    fn unregister_natives(&self, class: RawRef) -> RuntimeResult<()>;

    /// Whether two references denote the same runtime object
    fn is_same_object(&self, a: Option<RawRef>, b: Option<RawRef>) -> RuntimeResult<bool>;

    // ========================================================================
    // Class Reflection
    // ========================================================================

    /// Look up a class by binary name; returns a local reference
    fn find_class(&self, name: &str) -> RuntimeResult<RawRef>;

    /// Class of an object; returns a local reference
    fn get_object_class(&self, obj: RawRef) -> RuntimeResult<RawRef>;

    /// Binary name of a class (`Class.getName()`)
    fn class_name(&self, class: RawRef) -> RuntimeResult<String>;

    /// Raw modifier bits of a class
    fn class_modifiers(&self, class: RawRef) -> RuntimeResult<u32>;

    /// Kind predicates of a class
    fn class_flags(&self, class: RawRef) -> RuntimeResult<ClassFlags>;

    /// Binary name of the superclass, if any
    fn superclass_name(&self, class: RawRef) -> RuntimeResult<Option<String>>;

    /// Binary names of the directly implemented interfaces, in order
    fn interface_names(&self, class: RawRef) -> RuntimeResult<Vec<String>>;

    /// Binary name of the component type (arrays only)
    fn component_type_name(&self, class: RawRef) -> RuntimeResult<Option<String>>;

    /// Binary name of the declaring class (member classes only)
    fn declaring_class_name(&self, class: RawRef) -> RuntimeResult<Option<String>>;

    /// Binary name of the enclosing class (nested, local and anonymous classes)
    fn enclosing_class_name(&self, class: RawRef) -> RuntimeResult<Option<String>>;

    /// Binary names of the declared member classes
    fn declared_class_names(&self, class: RawRef) -> RuntimeResult<Vec<String>>;

    /// Declared constructors
    fn declared_constructors(&self, class: RawRef) -> RuntimeResult<Vec<RawMethod>>;

    /// Declared methods
    fn declared_methods(&self, class: RawRef) -> RuntimeResult<Vec<RawMethod>>;

    /// Declared fields
    fn declared_fields(&self, class: RawRef) -> RuntimeResult<Vec<RawField>>;

    /// Whether a value of class `from` can be assigned to a slot of class `to`
    fn is_assignable_from(&self, from: RawRef, to: RawRef) -> RuntimeResult<bool>;

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call an instance method (virtual dispatch)
    fn call_method(
        &self,
        obj: RawRef,
        method: MemberId,
        ret: ValueKind,
        args: &[JValue],
    ) -> RuntimeResult<JValue>;

    /// Call a static method
    fn call_static_method(
        &self,
        class: RawRef,
        method: MemberId,
        ret: ValueKind,
        args: &[JValue],
    ) -> RuntimeResult<JValue>;

    /// Allocate and construct an object; returns a local reference
    fn new_object(&self, class: RawRef, ctor: MemberId, args: &[JValue]) -> RuntimeResult<RawRef>;

    // ========================================================================
    // Field Access
    // ========================================================================

    /// Read an instance field
    fn get_field(&self, obj: RawRef, field: MemberId, kind: ValueKind) -> RuntimeResult<JValue>;

    /// Write an instance field
    fn set_field(&self, obj: RawRef, field: MemberId, value: JValue) -> RuntimeResult<()>;

    /// Read a static field
    fn get_static_field(
        &self,
        class: RawRef,
        field: MemberId,
        kind: ValueKind,
    ) -> RuntimeResult<JValue>;

    /// Write a static field
    fn set_static_field(&self, class: RawRef, field: MemberId, value: JValue) -> RuntimeResult<()>;

    // ========================================================================
    // Value Creation
    // ========================================================================

    /// Create a `java.lang.String`; returns a local reference
    fn new_string(&self, s: &str) -> RuntimeResult<RawRef>;

    /// Read a `java.lang.String`
    fn read_string(&self, s: RawRef) -> RuntimeResult<String>;

    /// Create a primitive array filled with `values`; returns a local reference
    fn new_primitive_array(&self, kind: ValueKind, values: &[JValue]) -> RuntimeResult<RawRef>;

    /// Create an object array of `component` filled with `elements`
    fn new_object_array(
        &self,
        component: RawRef,
        elements: &[Option<RawRef>],
    ) -> RuntimeResult<RawRef>;

    /// Box a primitive (`Integer.valueOf` and friends); returns a local reference
    fn box_value(&self, value: JValue) -> RuntimeResult<RawRef>;

    /// Unbox a boxed primitive into a slot of `kind`
    fn unbox_value(&self, obj: RawRef, kind: ValueKind) -> RuntimeResult<JValue>;

    // ========================================================================
    // Monitors
    // ========================================================================

    /// Enter the monitor of an object
    fn monitor_enter(&self, obj: RawRef) -> RuntimeResult<()>;

    /// Exit the monitor of an object
    fn monitor_exit(&self, obj: RawRef) -> RuntimeResult<()>;

    // ========================================================================
    // Thread Attachment
    // ========================================================================

    /// Whether the calling thread is attached
    fn is_current_thread_attached(&self) -> bool;

    /// Attach the calling thread
    fn attach_current_thread(&self) -> RuntimeResult<()>;

    /// Detach the calling thread
    fn detach_current_thread(&self) -> RuntimeResult<()>;
}
