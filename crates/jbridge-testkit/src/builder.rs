//! Class and member definitions for the in-memory runtime

use std::sync::Arc;

use jbridge_sdk::{ClassFlags, JValue, RawRef, RuntimeResult};

use crate::runtime::TestRuntime;

/// Behaviour of a method or constructor.
///
/// Called with the receiver (`None` for statics) and the argument slots. The
/// runtime is not locked while a body runs, so bodies may call back into it.
pub type Body =
    Arc<dyn Fn(&TestRuntime, Option<RawRef>, &[JValue]) -> RuntimeResult<JValue> + Send + Sync>;

pub(crate) const PUBLIC: u32 = 0x0001;
pub(crate) const STATIC: u32 = 0x0008;
pub(crate) const FINAL: u32 = 0x0010;
pub(crate) const INTERFACE: u32 = 0x0200;
pub(crate) const ABSTRACT: u32 = 0x0400;
pub(crate) const VARARGS: u32 = 0x0080;
pub(crate) const ENUM: u32 = 0x4000;

/// A method or constructor under construction
#[derive(Clone)]
pub struct MethodBuilder {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) ret: Option<String>,
    pub(crate) modifiers: u32,
    pub(crate) varargs: bool,
    pub(crate) exceptions: Vec<String>,
    pub(crate) body: Option<Body>,
}

impl MethodBuilder {
    /// Public instance method
    pub fn new(name: &str, params: &[&str], ret: &str) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            ret: Some(ret.to_string()),
            modifiers: PUBLIC,
            varargs: false,
            exceptions: Vec::new(),
            body: None,
        }
    }

    /// Public constructor
    pub fn constructor(params: &[&str]) -> Self {
        Self {
            name: "<init>".to_string(),
            ret: None,
            ..Self::new("<init>", params, "void")
        }
    }

    /// Make the method static
    pub fn statik(mut self) -> Self {
        self.modifiers |= STATIC;
        self
    }

    /// Make the method abstract
    pub fn abstrakt(mut self) -> Self {
        self.modifiers |= ABSTRACT;
        self
    }

    /// Replace the modifier bits
    pub fn modifiers(mut self, bits: u32) -> Self {
        self.modifiers = bits;
        self
    }

    /// Mark the last parameter variadic
    pub fn varargs(mut self) -> Self {
        self.varargs = true;
        self.modifiers |= VARARGS;
        self
    }

    /// Declare a thrown exception type
    pub fn throws(mut self, ty: &str) -> Self {
        self.exceptions.push(ty.to_string());
        self
    }

    /// Behaviour when invoked; without a body the method returns the zero
    /// value of its return type
    pub fn body<F>(mut self, f: F) -> Self
    where
        F: Fn(&TestRuntime, Option<RawRef>, &[JValue]) -> RuntimeResult<JValue>
            + Send
            + Sync
            + 'static,
    {
        self.body = Some(Arc::new(f));
        self
    }

    /// Always return `value`
    pub fn returns(self, value: JValue) -> Self {
        self.body(move |_, _, _| Ok(value))
    }
}

#[derive(Clone)]
pub(crate) struct FieldDef {
    pub name: String,
    pub ty: String,
    pub modifiers: u32,
    pub initial: JValue,
}

/// A class under construction
#[derive(Clone)]
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) modifiers: u32,
    pub(crate) flags: ClassFlags,
    pub(crate) superclass: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) component: Option<String>,
    pub(crate) declaring: Option<String>,
    pub(crate) enclosing: Option<String>,
    pub(crate) nested: Vec<String>,
    pub(crate) constructors: Vec<MethodBuilder>,
    pub(crate) methods: Vec<MethodBuilder>,
    pub(crate) fields: Vec<FieldDef>,
}

impl ClassBuilder {
    /// Public class extending `java.lang.Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            modifiers: PUBLIC,
            flags: ClassFlags::default(),
            superclass: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            component: None,
            declaring: None,
            enclosing: None,
            nested: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Public interface
    pub fn interface(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.modifiers = PUBLIC | INTERFACE | ABSTRACT;
        builder.flags.is_interface = true;
        builder.superclass = None;
        builder
    }

    pub(crate) fn primitive(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.modifiers = PUBLIC | FINAL | ABSTRACT;
        builder.flags.is_primitive = true;
        builder.superclass = None;
        builder
    }

    pub(crate) fn array(name: &str, component: &str) -> Self {
        let mut builder = Self::new(name);
        builder.modifiers = PUBLIC | FINAL | ABSTRACT;
        builder.flags.is_array = true;
        builder.component = Some(component.to_string());
        builder.interfaces = vec![
            "java.lang.Cloneable".to_string(),
            "java.io.Serializable".to_string(),
        ];
        builder
    }

    /// Set the superclass (`None` only for the root object type)
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    /// Remove the superclass
    pub fn no_superclass(mut self) -> Self {
        self.superclass = None;
        self
    }

    /// Add an implemented interface (or super-interface for interfaces)
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Replace the modifier bits
    pub fn modifiers(mut self, bits: u32) -> Self {
        self.modifiers = bits;
        self
    }

    /// Make the class an enum extending `java.lang.Enum`
    pub fn enumeration(mut self) -> Self {
        self.modifiers |= ENUM | FINAL;
        self.flags.is_enum = true;
        self
    }

    /// Make the class a static member of `outer`
    pub fn member_of(mut self, outer: &str) -> Self {
        self.declaring = Some(outer.to_string());
        self.enclosing = Some(outer.to_string());
        self.flags.is_member = true;
        self
    }

    /// Make the class anonymous inside `outer`
    pub fn anonymous_in(mut self, outer: &str) -> Self {
        self.enclosing = Some(outer.to_string());
        self.flags.is_anonymous = true;
        self
    }

    /// Declare a member class by name
    pub fn nested(mut self, name: &str) -> Self {
        self.nested.push(name.to_string());
        self
    }

    /// Add a constructor
    pub fn constructor(mut self, ctor: MethodBuilder) -> Self {
        self.constructors.push(ctor);
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a public instance field
    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty: ty.to_string(),
            modifiers: PUBLIC,
            initial: zero_of(ty),
        });
        self
    }

    /// Add a public static field with an initial value
    pub fn static_field(mut self, name: &str, ty: &str, initial: JValue) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty: ty.to_string(),
            modifiers: PUBLIC | STATIC,
            initial,
        });
        self
    }
}

/// Zero value of a type
pub(crate) fn zero_of(ty: &str) -> JValue {
    match ty {
        "void" => JValue::Void,
        "boolean" => JValue::Boolean(false),
        "byte" => JValue::Byte(0),
        "char" => JValue::Char(0),
        "short" => JValue::Short(0),
        "int" => JValue::Int(0),
        "long" => JValue::Long(0),
        "float" => JValue::Float(0.0),
        "double" => JValue::Double(0.0),
        _ => JValue::NULL,
    }
}
