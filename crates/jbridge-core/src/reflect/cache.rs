//! Descriptor cache keyed by binary class name

use std::cell::RefCell;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jbridge_sdk::{JavaRuntime, RawRef, RuntimeError};
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use super::class_info::{ClassInfo, ClassKind, ClassParts, Nesting};
use crate::error::ReflectionError;
use crate::lifecycle::Lifecycle;
use crate::modifiers::Modifiers;
use crate::types::{TypeRef, OBJECT};

thread_local! {
    /// Builds in progress on this thread, per cache
    static IN_PROGRESS: RefCell<FxHashSet<(usize, String)>> = RefCell::new(FxHashSet::default());
}

/// Marks a class as being built on this thread until dropped
struct BuildGuard {
    key: (usize, String),
}

impl BuildGuard {
    fn enter(cache: &DescriptorCache, name: &str) -> Result<Self, ReflectionError> {
        let key = (cache as *const DescriptorCache as usize, name.to_string());
        let fresh = IN_PROGRESS.with(|set| set.borrow_mut().insert(key.clone()));
        if !fresh {
            return Err(ReflectionError::Cycle {
                name: name.to_string(),
            });
        }
        Ok(BuildGuard { key })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        IN_PROGRESS.with(|set| {
            set.borrow_mut().remove(&self.key);
        });
    }
}

/// Lazily built, shared descriptors for every class the engine has touched.
///
/// Reads are lock-free with respect to other readers. Two threads may build
/// the same class concurrently; the first to publish wins and the other
/// descriptor is severed.
pub struct DescriptorCache {
    // Dropped first so class handles still reach the lifecycle
    classes: DashMap<Arc<str>, Arc<ClassInfo>>,
    runtime: Arc<dyn JavaRuntime>,
    lifecycle: Arc<Lifecycle>,
}

impl DescriptorCache {
    /// Create an empty cache
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            classes: DashMap::new(),
            runtime: Arc::clone(lifecycle.runtime()),
            lifecycle,
        }
    }

    /// Descriptor for a class by binary name, building it on first use
    pub fn get_class(&self, name: &str) -> Result<Arc<ClassInfo>, ReflectionError> {
        if let Some(found) = self.classes.get(name) {
            return Ok(Arc::clone(found.value()));
        }

        let _guard = BuildGuard::enter(self, name)?;
        let built = self.build(name)?;

        let published = match self.classes.entry(Arc::from(name)) {
            Entry::Occupied(existing) => Err(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&built));
                Ok(())
            }
        };
        match published {
            Ok(()) => {
                debug!(target: "jbridge::reflect", class = name, "built class descriptor");
                Ok(built)
            }
            Err(winner) => {
                trace!(target: "jbridge::reflect", class = name, "lost descriptor build race");
                built.sever();
                Ok(winner)
            }
        }
    }

    /// Descriptor for the type named by a [`TypeRef`]
    pub fn for_type(&self, ty: &TypeRef) -> Result<Arc<ClassInfo>, ReflectionError> {
        self.get_class(ty.name())
    }

    /// Descriptor for a class object reference
    pub fn class_of(&self, class: RawRef) -> Result<Arc<ClassInfo>, ReflectionError> {
        let name = self
            .runtime
            .class_name(class)
            .map_err(|source| lookup_error(&format!("{class:?}"), source))?;
        self.get_class(&name)
    }

    /// Descriptor for the runtime class of an object
    pub fn class_of_object(&self, obj: RawRef) -> Result<Arc<ClassInfo>, ReflectionError> {
        let class = self
            .runtime
            .get_object_class(obj)
            .map_err(|source| lookup_error(&format!("class of {obj:?}"), source))?;
        let name = self.runtime.class_name(class);
        self.delete_local(class);
        let name = name.map_err(|source| lookup_error(&format!("class of {obj:?}"), source))?;
        self.get_class(&name)
    }

    /// Whether a descriptor is cached
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of cached descriptors
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Drop and sever a class and every cached descriptor derived from it
    /// (subclasses, implementors, arrays of it). Returns the number removed.
    pub fn invalidate(&self, name: &str) -> usize {
        let doomed: Vec<Arc<str>> = self
            .classes
            .iter()
            .filter(|entry| entry.key().as_ref() == name || entry.value().depends_on(name))
            .map(|entry| Arc::clone(entry.key()))
            .collect();
        let mut removed = 0;
        for key in doomed {
            if let Some((_, info)) = self.classes.remove(&key) {
                info.sever();
                removed += 1;
            }
        }
        debug!(target: "jbridge::reflect", class = name, removed, "invalidated class descriptors");
        removed
    }

    /// Sever every descriptor and empty the cache
    pub fn clear(&self) -> usize {
        let keys: Vec<Arc<str>> = self.classes.iter().map(|e| Arc::clone(e.key())).collect();
        let mut removed = 0;
        for key in keys {
            if let Some((_, info)) = self.classes.remove(&key) {
                info.sever();
                removed += 1;
            }
        }
        debug!(target: "jbridge::reflect", removed, "cleared descriptor cache");
        removed
    }

    // ========================================================================
    // Building
    // ========================================================================

    fn build(&self, name: &str) -> Result<Arc<ClassInfo>, ReflectionError> {
        let local = self
            .runtime
            .find_class(name)
            .map_err(|source| lookup_error(name, source))?;
        let result = self.build_from(name, local);
        self.delete_local(local);
        if let Err(err) = &result {
            debug!(
                target: "jbridge::reflect",
                class = name,
                error = %err,
                "class descriptor build failed"
            );
        }
        result
    }

    fn build_from(&self, name: &str, local: RawRef) -> Result<Arc<ClassInfo>, ReflectionError> {
        let rt = &*self.runtime;
        let lookup = |source: RuntimeError| lookup_error(name, source);

        // Owned from here on: dropped (and released) if any step fails
        let global = rt.new_global_ref(local).map_err(lookup)?;
        let handle = self.lifecycle.adopt_class_global(global);

        let reported = rt.class_name(global).map_err(lookup)?;
        if reported != name {
            return Err(malformed(name, format!("runtime reports name {reported}")));
        }
        let modifiers = Modifiers::from_raw(rt.class_modifiers(global).map_err(lookup)?);
        let flags = rt.class_flags(global).map_err(lookup)?;
        let superclass_name = rt.superclass_name(global).map_err(lookup)?;
        let interface_names = rt.interface_names(global).map_err(lookup)?;
        let component_name = rt.component_type_name(global).map_err(lookup)?;
        let declaring = rt.declaring_class_name(global).map_err(lookup)?;
        let enclosing = rt.enclosing_class_name(global).map_err(lookup)?;
        let nested_names = rt.declared_class_names(global).map_err(lookup)?;
        let constructors = rt.declared_constructors(global).map_err(lookup)?;
        let methods = rt.declared_methods(global).map_err(lookup)?;
        let fields = rt.declared_fields(global).map_err(lookup)?;

        let kind = if flags.is_primitive {
            ClassKind::Primitive
        } else if flags.is_array {
            ClassKind::Array
        } else if flags.is_interface {
            ClassKind::Interface
        } else if flags.is_enum {
            ClassKind::Enum
        } else {
            ClassKind::Ordinary
        };
        let nesting = if flags.is_anonymous {
            Nesting::Anonymous
        } else if flags.is_local {
            Nesting::Local
        } else if flags.is_member {
            Nesting::Member
        } else {
            Nesting::None
        };

        match kind {
            ClassKind::Interface | ClassKind::Primitive if superclass_name.is_some() => {
                return Err(malformed(name, "interfaces and primitives have no superclass"));
            }
            ClassKind::Ordinary | ClassKind::Enum | ClassKind::Array
                if superclass_name.is_none() && name != OBJECT =>
            {
                return Err(malformed(name, "missing superclass"));
            }
            ClassKind::Primitive if !interface_names.is_empty() => {
                return Err(malformed(name, "primitive with interfaces"));
            }
            ClassKind::Array if component_name.is_none() => {
                return Err(malformed(name, "array without component type"));
            }
            _ => {}
        }
        for method in constructors.iter().chain(methods.iter()) {
            let array_tail = method
                .parameter_types
                .last()
                .is_some_and(|t| t.starts_with('['));
            if method.varargs && !array_tail {
                return Err(malformed(
                    name,
                    format!("variadic {} without array parameter", method.name),
                ));
            }
        }

        // Ancestors and element types, built through the cache
        let superclass = superclass_name.map(|s| self.get_class(&s)).transpose()?;
        let interfaces = interface_names
            .iter()
            .map(|i| self.get_class(i))
            .collect::<Result<Vec<_>, _>>()?;
        let component = match (kind, component_name) {
            (ClassKind::Array, Some(c)) => Some(self.get_class(&c)?),
            _ => None,
        };

        let mut nested = Vec::new();
        let mut static_nested = Vec::new();
        for nested_name in nested_names {
            let nested_class = rt.find_class(&nested_name).map_err(lookup)?;
            let bits = rt.class_modifiers(nested_class);
            self.delete_local(nested_class);
            if Modifiers::from_raw(bits.map_err(lookup)?).is_static() {
                static_nested.push(TypeRef::from(nested_name.as_str()));
            } else {
                nested.push(TypeRef::from(nested_name.as_str()));
            }
        }

        Ok(ClassInfo::assemble(ClassParts {
            handle,
            name: TypeRef::from(name),
            kind,
            nesting,
            modifiers,
            declaring: declaring.map(|d| TypeRef::from(d.as_str())),
            enclosing: enclosing.map(|e| TypeRef::from(e.as_str())),
            component,
            superclass,
            interfaces,
            nested,
            static_nested,
            constructors,
            methods,
            fields,
        }))
    }

    fn delete_local(&self, local: RawRef) {
        if let Err(err) = self.runtime.delete_local_ref(local) {
            warn!(
                target: "jbridge::reflect",
                ?local,
                error = %err,
                "failed to delete local class reference"
            );
        }
    }
}

impl std::fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("classes", &self.classes.len())
            .finish()
    }
}

fn lookup_error(name: &str, source: RuntimeError) -> ReflectionError {
    ReflectionError::Lookup {
        name: name.to_string(),
        source,
    }
}

fn malformed(name: &str, reason: impl Into<String>) -> ReflectionError {
    ReflectionError::Malformed {
        name: name.to_string(),
        reason: reason.into(),
    }
}
