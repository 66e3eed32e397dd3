//! Modifier bitset shared by classes, methods, constructors and fields
//!
//! The runtime reports `java.lang.reflect.Modifier` bits. Several bits are
//! overloaded by construct: `0x0040` is `volatile` on fields and `bridge` on
//! methods, `0x0080` is `transient` on fields and `varargs` on methods. The
//! accessors below name the meaning for the construct they document; calling
//! a field accessor on a method descriptor is meaningless but harmless.

use std::fmt;

/// Packed modifier flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    /// `public`
    pub const PUBLIC: u16 = 0x0001;
    /// `private`
    pub const PRIVATE: u16 = 0x0002;
    /// `protected`
    pub const PROTECTED: u16 = 0x0004;
    /// `static`
    pub const STATIC: u16 = 0x0008;
    /// `final`
    pub const FINAL: u16 = 0x0010;
    /// `synchronized` (methods)
    pub const SYNCHRONIZED: u16 = 0x0020;
    /// `volatile` (fields) / bridge (methods)
    pub const VOLATILE: u16 = 0x0040;
    /// `transient` (fields) / varargs (methods, constructors)
    pub const TRANSIENT: u16 = 0x0080;
    /// `native` (methods)
    pub const NATIVE: u16 = 0x0100;
    /// `interface` (classes)
    pub const INTERFACE: u16 = 0x0200;
    /// `abstract`
    pub const ABSTRACT: u16 = 0x0400;
    /// `strictfp`
    pub const STRICT: u16 = 0x0800;
    /// Compiler-generated
    pub const SYNTHETIC: u16 = 0x1000;
    /// Annotation type (classes)
    pub const ANNOTATION: u16 = 0x2000;
    /// Enum type or enum constant
    pub const ENUM: u16 = 0x4000;

    /// Varargs shares the `transient` bit
    pub const VARARGS: u16 = Self::TRANSIENT;
    /// Bridge shares the `volatile` bit
    pub const BRIDGE: u16 = Self::VOLATILE;
    /// Visibility mask
    pub const ACCESS_MASK: u16 = Self::PUBLIC | Self::PRIVATE | Self::PROTECTED;

    /// Empty set
    pub const fn empty() -> Self {
        Modifiers(0)
    }

    /// Build from raw runtime bits, dropping bits outside the known set
    pub const fn from_raw(raw: u32) -> Self {
        Modifiers((raw & 0x7FFF) as u16)
    }

    /// Build from packed bits
    pub const fn from_bits(bits: u16) -> Self {
        Modifiers(bits)
    }

    /// Packed bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every bit of `mask` is set
    pub const fn contains(self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    /// Whether any bit of `mask` is set
    pub const fn intersects(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    /// Copy with `mask` set
    pub const fn with(self, mask: u16) -> Self {
        Modifiers(self.0 | mask)
    }

    /// Copy with `mask` cleared
    pub const fn without(self, mask: u16) -> Self {
        Modifiers(self.0 & !mask)
    }

    /// Visibility bits only
    pub const fn access(self) -> u16 {
        self.0 & Self::ACCESS_MASK
    }

    /// Public
    pub const fn is_public(self) -> bool {
        self.intersects(Self::PUBLIC)
    }

    /// Private
    pub const fn is_private(self) -> bool {
        self.intersects(Self::PRIVATE)
    }

    /// Protected
    pub const fn is_protected(self) -> bool {
        self.intersects(Self::PROTECTED)
    }

    /// Package-private (no visibility bit)
    pub const fn is_package_private(self) -> bool {
        self.access() == 0
    }

    /// Static
    pub const fn is_static(self) -> bool {
        self.intersects(Self::STATIC)
    }

    /// Final
    pub const fn is_final(self) -> bool {
        self.intersects(Self::FINAL)
    }

    /// Abstract
    pub const fn is_abstract(self) -> bool {
        self.intersects(Self::ABSTRACT)
    }

    /// Synchronized. Methods only.
    pub const fn is_synchronized(self) -> bool {
        self.intersects(Self::SYNCHRONIZED)
    }

    /// Native. Methods only.
    pub const fn is_native(self) -> bool {
        self.intersects(Self::NATIVE)
    }

    /// Volatile. Fields only.
    pub const fn is_volatile(self) -> bool {
        self.intersects(Self::VOLATILE)
    }

    /// Transient. Fields only.
    pub const fn is_transient(self) -> bool {
        self.intersects(Self::TRANSIENT)
    }

    /// Variadic. Methods and constructors only.
    pub const fn is_varargs(self) -> bool {
        self.intersects(Self::VARARGS)
    }

    /// Bridge method. Methods only.
    pub const fn is_bridge(self) -> bool {
        self.intersects(Self::BRIDGE)
    }

    /// Interface. Classes only.
    pub const fn is_interface(self) -> bool {
        self.intersects(Self::INTERFACE)
    }

    /// Annotation type. Classes only.
    pub const fn is_annotation(self) -> bool {
        self.intersects(Self::ANNOTATION)
    }

    /// Enum type (classes) or enum constant (fields)
    pub const fn is_enum(self) -> bool {
        self.intersects(Self::ENUM)
    }

    /// Strictfp
    pub const fn is_strict(self) -> bool {
        self.intersects(Self::STRICT)
    }

    /// Synthetic
    pub const fn is_synthetic(self) -> bool {
        self.intersects(Self::SYNTHETIC)
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifiers({:#06x} {})", self.0, self)
    }
}

impl fmt::Display for Modifiers {
    /// Source-order keywords for the general-purpose bits
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WORDS: [(u16, &str); 8] = [
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PROTECTED, "protected"),
            (Modifiers::PRIVATE, "private"),
            (Modifiers::ABSTRACT, "abstract"),
            (Modifiers::STATIC, "static"),
            (Modifiers::FINAL, "final"),
            (Modifiers::SYNCHRONIZED, "synchronized"),
            (Modifiers::NATIVE, "native"),
        ];
        let mut first = true;
        for (bit, word) in WORDS {
            if self.intersects(bit) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(word)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_default() {
        let mods = Modifiers::default();
        assert!(!mods.is_public());
        assert!(!mods.is_static());
        assert!(mods.is_package_private());
    }

    #[test]
    fn test_overloaded_bits() {
        let m = Modifiers::from_raw(0x0080 | 0x0001);
        assert!(m.is_varargs());
        assert!(m.is_transient());
        assert!(m.is_public());
        assert_eq!(m.access(), Modifiers::PUBLIC);
    }

    #[test]
    fn test_masks() {
        let m = Modifiers::empty().with(Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL);
        assert!(m.contains(Modifiers::STATIC | Modifiers::FINAL));
        assert!(!m.contains(Modifiers::STATIC | Modifiers::ABSTRACT));
        assert!(m.intersects(Modifiers::STATIC | Modifiers::ABSTRACT));
        assert!(!m.without(Modifiers::STATIC).is_static());
        assert_eq!(m.to_string(), "public static final");
    }

    #[test]
    fn test_from_raw_drops_unknown_bits() {
        assert_eq!(Modifiers::from_raw(0x0001_0001).bits(), 0x0001);
    }
}
