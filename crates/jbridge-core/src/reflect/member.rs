//! Method, constructor and field descriptors

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use jbridge_sdk::{MemberId, RawField, RawMethod};

use super::ClassInfo;
use crate::modifiers::Modifiers;
use crate::types::TypeRef;

/// Descriptor of a method or constructor
pub struct MethodInfo {
    name: Arc<str>,
    modifiers: Modifiers,
    declaring: Weak<ClassInfo>,
    declaring_type: TypeRef,
    on_interface: bool,
    id: MemberId,
    parameters: Vec<TypeRef>,
    return_type: Option<TypeRef>,
    exceptions: Vec<TypeRef>,
    varargs: bool,
    order: usize,
}

/// A constructor is a method descriptor without a return type
pub type ConstructorInfo = MethodInfo;

impl MethodInfo {
    pub(crate) fn from_raw(
        raw: RawMethod,
        declaring: Weak<ClassInfo>,
        declaring_type: TypeRef,
        on_interface: bool,
        order: usize,
    ) -> Self {
        let parameters: Vec<TypeRef> = raw
            .parameter_types
            .iter()
            .map(|t| TypeRef::from(t.as_str()))
            .collect();
        let modifiers = Modifiers::from_raw(raw.modifiers);
        let varargs = (raw.varargs || modifiers.is_varargs())
            && parameters.last().is_some_and(TypeRef::is_array);
        Self {
            name: raw.name.into(),
            modifiers,
            declaring,
            declaring_type,
            on_interface,
            id: raw.id,
            parameters,
            return_type: raw.return_type.map(|t| TypeRef::from(t.as_str())),
            exceptions: raw.exception_types.iter().map(|t| TypeRef::from(t.as_str())).collect(),
            varargs,
            order,
        }
    }

    /// Simple name (`<init>` for constructors)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modifier flags
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Member id used for invocation
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Declaring class, if its descriptor is still alive
    pub fn declaring_class(&self) -> Option<Arc<ClassInfo>> {
        self.declaring.upgrade()
    }

    /// Declaring type by name
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Parameter types in declaration order
    pub fn parameters(&self) -> &[TypeRef] {
        &self.parameters
    }

    /// Return type; `None` for constructors
    pub fn return_type(&self) -> Option<&TypeRef> {
        self.return_type.as_ref()
    }

    /// Declared exception types
    pub fn exceptions(&self) -> &[TypeRef] {
        &self.exceptions
    }

    /// Whether the last parameter accepts a variable number of arguments
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Whether this is a constructor
    pub fn is_constructor(&self) -> bool {
        self.return_type.is_none()
    }

    /// Whether this is a static method
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }

    /// Public, non-abstract, non-static method declared on an interface
    pub fn is_default(&self) -> bool {
        self.on_interface
            && self.modifiers.is_public()
            && !self.modifiers.is_abstract()
            && !self.modifiers.is_static()
    }

    /// Declared parameter count
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Parameters before the variadic tail
    pub fn fixed_arity(&self) -> usize {
        if self.varargs {
            self.parameters.len() - 1
        } else {
            self.parameters.len()
        }
    }

    /// Position within the declaring class's member list
    pub fn declaration_order(&self) -> usize {
        self.order
    }

    /// `(int,java.lang.String)`
    pub fn param_signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(TypeRef::readable_name).collect();
        format!("({})", params.join(","))
    }

    /// `java.lang.String foo(int)`; constructors render as `com.example.Foo(int)`
    pub fn signature(&self) -> String {
        match &self.return_type {
            Some(ret) => format!("{} {}{}", ret.readable_name(), self.name, self.param_signature()),
            None => format!("{}{}", self.declaring_type.readable_name(), self.param_signature()),
        }
    }

    /// Name followed by the parameter list, as shown in resolution errors
    pub fn short_signature(&self) -> String {
        format!("{}{}", self.name, self.param_signature())
    }

    /// JNI method descriptor (`(ILjava/lang/String;)V`)
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.parameters {
            out.push_str(&p.descriptor());
        }
        out.push(')');
        match &self.return_type {
            Some(ret) => out.push_str(&ret.descriptor()),
            None => out.push('V'),
        }
        out
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("declaring", &self.declaring_type)
            .field("signature", &self.signature())
            .field("modifiers", &self.modifiers)
            .finish()
    }
}

/// Descriptor of a field
pub struct FieldInfo {
    name: Arc<str>,
    modifiers: Modifiers,
    declaring: Weak<ClassInfo>,
    declaring_type: TypeRef,
    id: MemberId,
    field_type: TypeRef,
}

impl FieldInfo {
    pub(crate) fn from_raw(
        raw: RawField,
        declaring: Weak<ClassInfo>,
        declaring_type: TypeRef,
    ) -> Self {
        Self {
            name: raw.name.into(),
            modifiers: Modifiers::from_raw(raw.modifiers),
            declaring,
            declaring_type,
            id: raw.id,
            field_type: TypeRef::from(raw.field_type.as_str()),
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modifier flags
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Member id used for access
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Declaring class, if its descriptor is still alive
    pub fn declaring_class(&self) -> Option<Arc<ClassInfo>> {
        self.declaring.upgrade()
    }

    /// Declaring type by name
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Field type
    pub fn field_type(&self) -> &TypeRef {
        &self.field_type
    }

    /// Whether this is a static field
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldInfo({} {}.{})", self.field_type, self.declaring_type, self.name)
    }
}

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

/// All candidates sharing one member name, in declaration order
pub struct OverloadSet {
    id: u64,
    name: Arc<str>,
    candidates: Vec<Arc<MethodInfo>>,
}

impl OverloadSet {
    /// Group candidates under a fresh process-unique id
    pub fn new(name: impl Into<Arc<str>>, candidates: Vec<Arc<MethodInfo>>) -> Self {
        Self {
            id: NEXT_SET_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            candidates,
        }
    }

    /// Process-unique id, used to key memoised resolutions
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Member name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidates in declaration order
    pub fn candidates(&self) -> &[Arc<MethodInfo>] {
        &self.candidates
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl fmt::Debug for OverloadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverloadSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(
        name: &str,
        params: &[&str],
        ret: Option<&str>,
        modifiers: u32,
        varargs: bool,
    ) -> RawMethod {
        RawMethod {
            id: MemberId(7),
            name: name.to_string(),
            modifiers,
            parameter_types: params.iter().map(|p| p.to_string()).collect(),
            return_type: ret.map(str::to_string),
            exception_types: vec![],
            varargs,
        }
    }

    fn method(r: RawMethod, on_interface: bool) -> MethodInfo {
        MethodInfo::from_raw(r, Weak::new(), TypeRef::from("com.example.Foo"), on_interface, 0)
    }

    #[test]
    fn test_signatures() {
        let foo = raw(
            "foo",
            &["int", "java.lang.String"],
            Some("java.lang.String"),
            0x1,
            false,
        );
        let m = method(foo, false);
        assert_eq!(m.param_signature(), "(int,java.lang.String)");
        assert_eq!(m.signature(), "java.lang.String foo(int,java.lang.String)");
        assert_eq!(m.descriptor(), "(ILjava/lang/String;)Ljava/lang/String;");
        assert_eq!(m.short_signature(), "foo(int,java.lang.String)");

        let ctor = method(raw("<init>", &["[I"], None, 0x1, false), false);
        assert!(ctor.is_constructor());
        assert_eq!(ctor.signature(), "com.example.Foo(int[])");
        assert_eq!(ctor.descriptor(), "([I)V");
    }

    #[test]
    fn test_varargs_requires_array_tail() {
        let m = method(raw("f", &["int", "[Ljava.lang.Object;"], Some("void"), 0x81, false), false);
        assert!(m.is_varargs());
        assert_eq!(m.fixed_arity(), 1);

        let not_array = method(raw("g", &["int"], Some("void"), 0x1, true), false);
        assert!(!not_array.is_varargs());
        assert_eq!(not_array.fixed_arity(), 1);
    }

    #[test]
    fn test_default_method() {
        assert!(method(raw("d", &[], Some("void"), 0x1, false), true).is_default());
        assert!(!method(raw("a", &[], Some("void"), 0x401, false), true).is_default());
        assert!(!method(raw("s", &[], Some("void"), 0x9, false), true).is_default());
        assert!(!method(raw("c", &[], Some("void"), 0x1, false), false).is_default());
    }

    #[test]
    fn test_overload_set_ids_are_unique() {
        let a = OverloadSet::new("a", vec![]);
        let b = OverloadSet::new("a", vec![]);
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }
}
