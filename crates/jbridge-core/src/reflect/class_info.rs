//! Class descriptors

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use jbridge_sdk::{RawField, RawMethod, RawRef};
use rustc_hash::{FxHashMap, FxHashSet};

use super::member::{ConstructorInfo, FieldInfo, MethodInfo, OverloadSet};
use crate::error::ReflectionError;
use crate::lifecycle::ObjectHandle;
use crate::modifiers::Modifiers;
use crate::types::{TypeRef, OBJECT};

/// Kind of a runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Interface or annotation type
    Interface,
    /// Primitive type (including `void`)
    Primitive,
    /// Array type
    Array,
    /// Enum type
    Enum,
    /// Any other class
    Ordinary,
}

/// How a type is nested in another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nesting {
    /// Top-level type
    None,
    /// Anonymous class
    Anonymous,
    /// Class declared inside a method body
    Local,
    /// Member of another type
    Member,
}

/// Everything gathered from the runtime for one class.
///
/// Assembling a descriptor from parts cannot fail.
pub(crate) struct ClassParts {
    pub handle: ObjectHandle,
    pub name: TypeRef,
    pub kind: ClassKind,
    pub nesting: Nesting,
    pub modifiers: Modifiers,
    pub declaring: Option<TypeRef>,
    pub enclosing: Option<TypeRef>,
    pub component: Option<Arc<ClassInfo>>,
    pub superclass: Option<Arc<ClassInfo>>,
    pub interfaces: Vec<Arc<ClassInfo>>,
    pub nested: Vec<TypeRef>,
    pub static_nested: Vec<TypeRef>,
    pub constructors: Vec<RawMethod>,
    pub methods: Vec<RawMethod>,
    pub fields: Vec<RawField>,
}

struct Members {
    nested: Vec<TypeRef>,
    static_nested: Vec<TypeRef>,
    constructors: Arc<OverloadSet>,
    methods: FxHashMap<Arc<str>, Arc<OverloadSet>>,
    static_methods: FxHashMap<Arc<str>, Arc<OverloadSet>>,
    fields: FxHashMap<Arc<str>, Arc<FieldInfo>>,
    static_fields: FxHashMap<Arc<str>, Arc<FieldInfo>>,
    /// Declared and inherited methods in index order, before grouping
    all_methods: Vec<Arc<MethodInfo>>,
}

/// Cached metadata snapshot of one runtime class.
///
/// Superclass, interface and component links are strong (they point at
/// ancestors or element types, never back). Every other type reference is a
/// [`TypeRef`] resolved through the descriptor cache.
pub struct ClassInfo {
    handle: ObjectHandle,
    name: TypeRef,
    readable_name: String,
    simple_name: String,
    package_name: String,
    kind: ClassKind,
    nesting: Nesting,
    modifiers: Modifiers,
    declaring: Option<TypeRef>,
    enclosing: Option<TypeRef>,
    component: Option<Arc<ClassInfo>>,
    superclass: Option<Arc<ClassInfo>>,
    interfaces: Vec<Arc<ClassInfo>>,
    members: Members,
    severed: AtomicBool,
}

impl ClassInfo {
    pub(crate) fn assemble(parts: ClassParts) -> Arc<ClassInfo> {
        Arc::new_cyclic(|weak| {
            let members = Members::build(weak, &parts);
            ClassInfo {
                readable_name: parts.name.readable_name(),
                simple_name: parts.name.simple_name(),
                package_name: parts.name.package_name(),
                handle: parts.handle,
                name: parts.name,
                kind: parts.kind,
                nesting: parts.nesting,
                modifiers: parts.modifiers,
                declaring: parts.declaring,
                enclosing: parts.enclosing,
                component: parts.component,
                superclass: parts.superclass,
                interfaces: parts.interfaces,
                members,
                severed: AtomicBool::new(false),
            }
        })
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Binary name (`java.util.Map$Entry`)
    pub fn name(&self) -> &str {
        self.name.name()
    }

    /// Type reference to this class
    pub fn type_ref(&self) -> &TypeRef {
        &self.name
    }

    /// Readable qualified name (`java.util.Map.Entry`, `int[]`)
    pub fn readable_name(&self) -> &str {
        &self.readable_name
    }

    /// Simple name (`Entry`)
    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    /// Package name (`java.util`)
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Global reference to the class object
    pub fn raw(&self) -> Result<RawRef, ReflectionError> {
        self.check_live()?;
        self.handle.raw().ok_or_else(|| self.invalidated())
    }

    /// Fails once the descriptor has been severed
    pub fn check_live(&self) -> Result<(), ReflectionError> {
        if self.is_severed() {
            return Err(self.invalidated());
        }
        Ok(())
    }

    fn invalidated(&self) -> ReflectionError {
        ReflectionError::Invalidated {
            name: self.name().to_string(),
        }
    }

    /// Whether the descriptor was invalidated
    pub fn is_severed(&self) -> bool {
        self.severed.load(Ordering::Acquire)
    }

    /// Invalidate the descriptor and release the class reference.
    ///
    /// Idempotent. Holders of the descriptor keep their `Arc` but every
    /// runtime-facing use reports [`ReflectionError::Invalidated`].
    pub(crate) fn sever(&self) {
        if !self.severed.swap(true, Ordering::AcqRel) {
            self.handle.release();
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Kind of type
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Nesting
    pub fn nesting(&self) -> Nesting {
        self.nesting
    }

    /// Modifier flags
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Whether this is a primitive type
    pub fn is_primitive(&self) -> bool {
        self.kind == ClassKind::Primitive
    }

    /// Whether this is an array type
    pub fn is_array(&self) -> bool {
        self.kind == ClassKind::Array
    }

    /// Declaring type of a member class
    pub fn declaring_type(&self) -> Option<&TypeRef> {
        self.declaring.as_ref()
    }

    /// Enclosing type of a nested, local or anonymous class
    pub fn enclosing_type(&self) -> Option<&TypeRef> {
        self.enclosing.as_ref()
    }

    /// Component type of an array
    pub fn component_type(&self) -> Option<&Arc<ClassInfo>> {
        self.component.as_ref()
    }

    /// Direct superclass
    pub fn superclass(&self) -> Option<&Arc<ClassInfo>> {
        self.superclass.as_ref()
    }

    /// Directly implemented interfaces, in declaration order
    pub fn interfaces(&self) -> &[Arc<ClassInfo>] {
        &self.interfaces
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Whether `name` appears on the superclass chain (reflexive)
    pub fn is_subclass_of(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name() == name {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    /// Whether a value of class `other` can be stored in a slot of this class
    pub fn is_assignable_from(&self, other: &ClassInfo) -> bool {
        if self.name == other.name {
            return true;
        }
        if self.is_primitive() || other.is_primitive() {
            return false;
        }
        if self.name.is_object() {
            return true;
        }
        match (&self.component, &other.component) {
            (Some(mine), Some(theirs)) => {
                !mine.is_primitive() && !theirs.is_primitive() && mine.is_assignable_from(theirs)
            }
            (Some(_), None) => false,
            (None, _) => other.distance_to(self.name()).is_some(),
        }
    }

    /// Inheritance hops from this class up to `ancestor`, counting superclass
    /// and interface edges alike. `None` when `ancestor` is not a supertype.
    pub fn distance_to(&self, ancestor: &str) -> Option<usize> {
        let mut queue: VecDeque<(&ClassInfo, usize)> = VecDeque::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        queue.push_back((self, 0));
        let mut deepest = 0;
        while let Some((class, hops)) = queue.pop_front() {
            if class.name() == ancestor {
                return Some(hops);
            }
            if !seen.insert(class.name()) {
                continue;
            }
            deepest = deepest.max(hops);
            if let Some(sup) = &class.superclass {
                queue.push_back((sup.as_ref(), hops + 1));
            }
            for iface in &class.interfaces {
                queue.push_back((iface.as_ref(), hops + 1));
            }
        }
        // Interfaces have no superclass edge but every reference type is an Object
        if ancestor == OBJECT && !self.is_primitive() {
            return Some(deepest + 1);
        }
        None
    }

    /// Whether `name` is this class, one of its supertypes, or (for arrays)
    /// related to the element type
    pub(crate) fn depends_on(&self, name: &str) -> bool {
        if self.distance_to(name).is_some() && name != OBJECT {
            return true;
        }
        self.component.as_ref().is_some_and(|c| c.depends_on(name))
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Constructors in declaration order
    pub fn constructors(&self) -> &Arc<OverloadSet> {
        &self.members.constructors
    }

    /// Overloads of a method, declared or inherited
    pub fn find_methods(&self, name: &str, is_static: bool) -> Option<&Arc<OverloadSet>> {
        if is_static {
            self.members.static_methods.get(name)
        } else {
            self.members.methods.get(name)
        }
    }

    /// Field by name, declared or inherited
    pub fn find_field(&self, name: &str, is_static: bool) -> Option<&Arc<FieldInfo>> {
        if is_static {
            self.members.static_fields.get(name)
        } else {
            self.members.fields.get(name)
        }
    }

    /// Every method in the index, declared first
    pub fn methods(&self) -> &[Arc<MethodInfo>] {
        &self.members.all_methods
    }

    /// Names of the indexed methods
    pub fn method_names(&self, is_static: bool) -> Vec<&str> {
        let map = if is_static {
            &self.members.static_methods
        } else {
            &self.members.methods
        };
        let mut names: Vec<&str> = map.keys().map(|k| &**k).collect();
        names.sort_unstable();
        names
    }

    /// Names of the indexed fields
    pub fn field_names(&self, is_static: bool) -> Vec<&str> {
        let map = if is_static {
            &self.members.static_fields
        } else {
            &self.members.fields
        };
        let mut names: Vec<&str> = map.keys().map(|k| &**k).collect();
        names.sort_unstable();
        names
    }

    /// Declared member classes (inner or static nested)
    pub fn nested_types(&self, is_static: bool) -> &[TypeRef] {
        if is_static {
            &self.members.static_nested
        } else {
            &self.members.nested
        }
    }
}

impl Members {
    fn build(weak: &Weak<ClassInfo>, parts: &ClassParts) -> Members {
        let on_interface = parts.kind == ClassKind::Interface;

        let constructors: Vec<Arc<ConstructorInfo>> = parts
            .constructors
            .iter()
            .enumerate()
            .map(|(order, raw)| {
                Arc::new(MethodInfo::from_raw(
                    raw.clone(),
                    weak.clone(),
                    parts.name.clone(),
                    on_interface,
                    order,
                ))
            })
            .collect();

        // Declared methods first; bridges duplicate a declared signature
        let mut all_methods: Vec<Arc<MethodInfo>> = Vec::new();
        let mut seen: FxHashSet<(Arc<str>, String, bool)> = FxHashSet::default();
        for (order, raw) in parts.methods.iter().enumerate() {
            let method = MethodInfo::from_raw(
                raw.clone(),
                weak.clone(),
                parts.name.clone(),
                on_interface,
                order,
            );
            if method.modifiers().is_bridge() && method.modifiers().is_synthetic() {
                continue;
            }
            if seen.insert(Self::method_key(&method)) {
                all_methods.push(Arc::new(method));
            }
        }

        // Inherited: superclass methods (static included), then interface
        // instance methods
        if let Some(sup) = &parts.superclass {
            for method in sup.methods() {
                if method.modifiers().is_private() {
                    continue;
                }
                if seen.insert(Self::method_key(method)) {
                    all_methods.push(Arc::clone(method));
                }
            }
        }
        for iface in &parts.interfaces {
            for method in iface.methods() {
                if method.is_static() || method.modifiers().is_private() {
                    continue;
                }
                if seen.insert(Self::method_key(method)) {
                    all_methods.push(Arc::clone(method));
                }
            }
        }

        let methods = Self::group(all_methods.iter().filter(|m| !m.is_static()));
        let static_methods = Self::group(all_methods.iter().filter(|m| m.is_static()));

        let mut fields: FxHashMap<Arc<str>, Arc<FieldInfo>> = FxHashMap::default();
        let mut static_fields: FxHashMap<Arc<str>, Arc<FieldInfo>> = FxHashMap::default();
        for raw in &parts.fields {
            let field = FieldInfo::from_raw(raw.clone(), weak.clone(), parts.name.clone());
            let field = Arc::new(field);
            let map = if field.is_static() {
                &mut static_fields
            } else {
                &mut fields
            };
            map.insert(field.name().into(), field);
        }
        let ancestors = parts.superclass.iter().chain(parts.interfaces.iter());
        for ancestor in ancestors {
            for (name, field) in &ancestor.members.fields {
                if !field.modifiers().is_private() {
                    fields.entry(Arc::clone(name)).or_insert_with(|| Arc::clone(field));
                }
            }
            for (name, field) in &ancestor.members.static_fields {
                if !field.modifiers().is_private() {
                    static_fields
                        .entry(Arc::clone(name))
                        .or_insert_with(|| Arc::clone(field));
                }
            }
        }

        Members {
            nested: parts.nested.clone(),
            static_nested: parts.static_nested.clone(),
            constructors: Arc::new(OverloadSet::new("<init>", constructors)),
            methods,
            static_methods,
            fields,
            static_fields,
            all_methods,
        }
    }

    fn method_key(method: &MethodInfo) -> (Arc<str>, String, bool) {
        (method.name().into(), method.param_signature(), method.is_static())
    }

    fn group<'a>(
        methods: impl Iterator<Item = &'a Arc<MethodInfo>>,
    ) -> FxHashMap<Arc<str>, Arc<OverloadSet>> {
        let mut grouped: FxHashMap<Arc<str>, Vec<Arc<MethodInfo>>> = FxHashMap::default();
        let mut order: Vec<Arc<str>> = Vec::new();
        for method in methods {
            let name: Arc<str> = method.name().into();
            grouped
                .entry(Arc::clone(&name))
                .or_insert_with(|| {
                    order.push(Arc::clone(&name));
                    Vec::new()
                })
                .push(Arc::clone(method));
        }
        order
            .into_iter()
            .filter_map(|name| {
                let candidates = grouped.remove(&name)?;
                Some((Arc::clone(&name), Arc::new(OverloadSet::new(name, candidates))))
            })
            .collect()
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name.name())
            .field("kind", &self.kind)
            .field("modifiers", &self.modifiers)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name().to_string()))
            .field("severed", &self.is_severed())
            .finish()
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.readable_name)
    }
}
