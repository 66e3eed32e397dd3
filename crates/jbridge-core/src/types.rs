//! Runtime type names
//!
//! A runtime type is identified by its binary name as the runtime reports it
//! (`Class.getName()`): `int`, `java.lang.String`, `java.util.Map$Entry`,
//! `[I`, `[[Ljava.lang.String;`. `TypeRef` wraps that name and answers the
//! structural questions the engine needs without touching the runtime.

use std::fmt;
use std::sync::Arc;

use jbridge_sdk::ValueKind;

/// Binary name of the root object type
pub const OBJECT: &str = "java.lang.Object";
/// Binary name of the string type
pub const STRING: &str = "java.lang.String";

/// Primitive types of the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `void`
    Void,
}

/// Limits of the primitive numeric types
pub mod limits {
    /// Smallest `byte`
    pub const BYTE_MIN: i64 = -0x80;
    /// Largest `byte`
    pub const BYTE_MAX: i64 = 0x7F;
    /// Smallest `short`
    pub const SHORT_MIN: i64 = -0x8000;
    /// Largest `short`
    pub const SHORT_MAX: i64 = 0x7FFF;
    /// Smallest `int`
    pub const INT_MIN: i64 = -0x8000_0000;
    /// Largest `int`
    pub const INT_MAX: i64 = 0x7FFF_FFFF;
    /// Largest `char` code unit
    pub const CHAR_MAX: i64 = 0xFFFF;
    /// Largest finite `float`
    pub const FLOAT_MAX: f64 = 3.402_823_47e38;
}

impl PrimitiveType {
    /// All primitive types, `void` last
    pub const ALL: [PrimitiveType; 9] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Char,
        PrimitiveType::Short,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
        PrimitiveType::Void,
    ];

    /// Look up a primitive by its binary name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => PrimitiveType::Boolean,
            "byte" => PrimitiveType::Byte,
            "char" => PrimitiveType::Char,
            "short" => PrimitiveType::Short,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "void" => PrimitiveType::Void,
            _ => return None,
        })
    }

    /// Look up a primitive by its descriptor character
    pub fn from_descriptor(c: char) -> Option<Self> {
        Some(match c {
            'Z' => PrimitiveType::Boolean,
            'B' => PrimitiveType::Byte,
            'C' => PrimitiveType::Char,
            'S' => PrimitiveType::Short,
            'I' => PrimitiveType::Int,
            'J' => PrimitiveType::Long,
            'F' => PrimitiveType::Float,
            'D' => PrimitiveType::Double,
            'V' => PrimitiveType::Void,
            _ => return None,
        })
    }

    /// Binary name (`int`)
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Void => "void",
        }
    }

    /// Descriptor character (`I`)
    pub const fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
            PrimitiveType::Void => 'V',
        }
    }

    /// Binary name of the box class (`java.lang.Integer`)
    pub const fn box_class(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "java.lang.Boolean",
            PrimitiveType::Byte => "java.lang.Byte",
            PrimitiveType::Char => "java.lang.Character",
            PrimitiveType::Short => "java.lang.Short",
            PrimitiveType::Int => "java.lang.Integer",
            PrimitiveType::Long => "java.lang.Long",
            PrimitiveType::Float => "java.lang.Float",
            PrimitiveType::Double => "java.lang.Double",
            PrimitiveType::Void => "java.lang.Void",
        }
    }

    /// Primitive unboxed from a box class name
    pub fn from_box_class(name: &str) -> Option<Self> {
        PrimitiveType::ALL
            .into_iter()
            .find(|p| *p != PrimitiveType::Void && p.box_class() == name)
    }

    /// Native slot kind
    pub const fn kind(self) -> ValueKind {
        match self {
            PrimitiveType::Boolean => ValueKind::Boolean,
            PrimitiveType::Byte => ValueKind::Byte,
            PrimitiveType::Char => ValueKind::Char,
            PrimitiveType::Short => ValueKind::Short,
            PrimitiveType::Int => ValueKind::Int,
            PrimitiveType::Long => ValueKind::Long,
            PrimitiveType::Float => ValueKind::Float,
            PrimitiveType::Double => ValueKind::Double,
            PrimitiveType::Void => ValueKind::Void,
        }
    }

    /// Integral range of this primitive, if it is an integral type
    pub const fn integral_range(self) -> Option<(i64, i64)> {
        match self {
            PrimitiveType::Byte => Some((limits::BYTE_MIN, limits::BYTE_MAX)),
            PrimitiveType::Short => Some((limits::SHORT_MIN, limits::SHORT_MAX)),
            PrimitiveType::Char => Some((0, limits::CHAR_MAX)),
            PrimitiveType::Int => Some((limits::INT_MIN, limits::INT_MAX)),
            PrimitiveType::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Whether a widening primitive conversion leads from `self` to `other`
    pub fn widens_to(self, other: PrimitiveType) -> bool {
        use PrimitiveType::*;
        matches!(
            (self, other),
            (Byte, Short | Int | Long | Float | Double)
                | (Short | Char, Int | Long | Float | Double)
                | (Int, Long | Float | Double)
                | (Long, Float | Double)
                | (Float, Double)
        )
    }

    /// Whether an integer fits this primitive without loss
    pub fn fits(self, value: i64) -> bool {
        match self.integral_range() {
            Some((lo, hi)) => lo <= value && value <= hi,
            None => false,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-owning reference to a runtime type by binary name.
///
/// Resolved to a `ClassInfo` through the descriptor cache on demand.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Reference a type by binary name
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        TypeRef(name.into())
    }

    /// Reference a primitive type
    pub fn primitive_type(p: PrimitiveType) -> Self {
        TypeRef::new(p.name())
    }

    /// Reference the array type whose component is `component`
    pub fn array_of(component: &TypeRef) -> Self {
        let name = match component.primitive() {
            Some(p) => format!("[{}", p.descriptor()),
            None if component.is_array() => format!("[{}", component.name()),
            None => format!("[L{};", component.name()),
        };
        TypeRef::new(name)
    }

    /// Binary name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Shared binary name
    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }

    /// Primitive type, if this is one
    pub fn primitive(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_name(&self.0)
    }

    /// Whether this names a primitive type (including `void`)
    pub fn is_primitive(&self) -> bool {
        self.primitive().is_some()
    }

    /// Whether this names `void`
    pub fn is_void(&self) -> bool {
        self.primitive() == Some(PrimitiveType::Void)
    }

    /// Whether this names an array type
    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    /// Whether this names the root object type
    pub fn is_object(&self) -> bool {
        &*self.0 == OBJECT
    }

    /// Native slot kind used to carry a value of this type
    pub fn kind(&self) -> ValueKind {
        match self.primitive() {
            Some(p) => p.kind(),
            None => ValueKind::Object,
        }
    }

    /// Component type of an array type
    pub fn component(&self) -> Option<TypeRef> {
        let rest = self.0.strip_prefix('[')?;
        if rest.starts_with('[') {
            return Some(TypeRef::new(rest));
        }
        if let Some(class) = rest.strip_prefix('L').and_then(|r| r.strip_suffix(';')) {
            return Some(TypeRef::new(class));
        }
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => PrimitiveType::from_descriptor(c).map(TypeRef::primitive_type),
            _ => None,
        }
    }

    /// Innermost non-array element type and the array depth
    pub fn element(&self) -> (TypeRef, usize) {
        let mut current = self.clone();
        let mut depth = 0;
        while let Some(component) = current.component() {
            current = component;
            depth += 1;
        }
        (current, depth)
    }

    /// Human-readable qualified name (`int[]`, `java.util.Map.Entry`)
    pub fn readable_name(&self) -> String {
        let (element, depth) = self.element();
        let mut name = element.name().replace('$', ".");
        for _ in 0..depth {
            name.push_str("[]");
        }
        name
    }

    /// Simple name (`String`, `Entry`, `int[]`); empty for anonymous classes
    pub fn simple_name(&self) -> String {
        let (element, depth) = self.element();
        let name = element.name();
        let tail = name.rsplit('.').next().unwrap_or(name);
        let mut simple = match tail.rsplit_once('$') {
            Some((_, inner)) if inner.chars().all(|c| c.is_ascii_digit()) => String::new(),
            Some((_, inner)) => inner.trim_start_matches(|c: char| c.is_ascii_digit()).to_string(),
            None => tail.to_string(),
        };
        for _ in 0..depth {
            simple.push_str("[]");
        }
        simple
    }

    /// Package name (`java.lang`); empty for primitives, arrays and the
    /// unnamed package
    pub fn package_name(&self) -> String {
        if self.is_primitive() || self.is_array() {
            return String::new();
        }
        match self.0.rsplit_once('.') {
            Some((package, _)) => package.to_string(),
            None => String::new(),
        }
    }

    /// Field descriptor (`I`, `Ljava/lang/String;`, `[I`)
    pub fn descriptor(&self) -> String {
        match self.primitive() {
            Some(p) => p.descriptor().to_string(),
            None if self.is_array() => self.0.replace('.', "/"),
            None => format!("L{};", self.0.replace('.', "/")),
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.readable_name())
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::new(name)
    }
}

impl From<PrimitiveType> for TypeRef {
    fn from(p: PrimitiveType) -> Self {
        TypeRef::primitive_type(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_lookup() {
        assert_eq!(PrimitiveType::from_name("int"), Some(PrimitiveType::Int));
        assert_eq!(PrimitiveType::from_name("Integer"), None);
        assert_eq!(PrimitiveType::from_descriptor('J'), Some(PrimitiveType::Long));
        assert_eq!(
            PrimitiveType::from_box_class("java.lang.Character"),
            Some(PrimitiveType::Char)
        );
        assert_eq!(PrimitiveType::from_box_class("java.lang.Void"), None);
    }

    #[test]
    fn test_primitive_ranges() {
        assert!(PrimitiveType::Byte.fits(127));
        assert!(!PrimitiveType::Byte.fits(128));
        assert!(PrimitiveType::Short.fits(-0x8000));
        assert!(!PrimitiveType::Char.fits(-1));
        assert!(PrimitiveType::Char.fits(0xFFFF));
        assert!(PrimitiveType::Int.fits(i32::MAX as i64));
        assert!(!PrimitiveType::Int.fits(i32::MAX as i64 + 1));
        assert!(PrimitiveType::Long.fits(i64::MIN));
        assert!(!PrimitiveType::Double.fits(0));
    }

    #[test]
    fn test_widening() {
        assert!(PrimitiveType::Byte.widens_to(PrimitiveType::Short));
        assert!(PrimitiveType::Char.widens_to(PrimitiveType::Int));
        assert!(PrimitiveType::Long.widens_to(PrimitiveType::Float));
        assert!(!PrimitiveType::Char.widens_to(PrimitiveType::Short));
        assert!(!PrimitiveType::Int.widens_to(PrimitiveType::Int));
        assert!(!PrimitiveType::Boolean.widens_to(PrimitiveType::Int));
    }

    #[test]
    fn test_array_components() {
        assert_eq!(TypeRef::from("[I").component(), Some(TypeRef::from("int")));
        assert_eq!(
            TypeRef::from("[[Ljava.lang.String;").component(),
            Some(TypeRef::from("[Ljava.lang.String;"))
        );
        assert_eq!(
            TypeRef::from("[Ljava.lang.String;").component(),
            Some(TypeRef::from("java.lang.String"))
        );
        assert_eq!(TypeRef::from("java.lang.String").component(), None);
        assert_eq!(TypeRef::from("[Q").component(), None);
    }

    #[test]
    fn test_array_of_round_trips_component() {
        for name in ["int", "java.lang.String", "[J"] {
            let t = TypeRef::from(name);
            assert_eq!(TypeRef::array_of(&t).component(), Some(t));
        }
    }

    #[test]
    fn test_names() {
        let entry = TypeRef::from("java.util.Map$Entry");
        assert_eq!(entry.readable_name(), "java.util.Map.Entry");
        assert_eq!(entry.simple_name(), "Entry");
        assert_eq!(entry.package_name(), "java.util");

        let matrix = TypeRef::from("[[D");
        assert_eq!(matrix.readable_name(), "double[][]");
        assert_eq!(matrix.simple_name(), "double[][]");
        assert_eq!(matrix.package_name(), "");

        assert_eq!(TypeRef::from("com.example.Foo$1").simple_name(), "");
        assert_eq!(TypeRef::from("com.example.Foo$1Local").simple_name(), "Local");
        assert_eq!(TypeRef::from("Bare").package_name(), "");
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(TypeRef::from("int").descriptor(), "I");
        assert_eq!(TypeRef::from("java.lang.String").descriptor(), "Ljava/lang/String;");
        assert_eq!(TypeRef::from("[Ljava.lang.String;").descriptor(), "[Ljava/lang/String;");
        assert_eq!(TypeRef::from("void").kind(), ValueKind::Void);
        assert_eq!(TypeRef::from("[I").kind(), ValueKind::Object);
    }
}
