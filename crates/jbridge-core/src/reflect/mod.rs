//! Reflection descriptors
//!
//! Turns raw runtime class, method and field handles into reusable,
//! immutable descriptors:
//! - `ClassInfo`: identity, kind, hierarchy and member indexes of one class
//! - `MethodInfo` / `FieldInfo`: one member, with a weak link back to its class
//! - `OverloadSet`: every method sharing a name, the unit of overload resolution
//! - `DescriptorCache`: builds descriptors on first use and shares them

mod cache;
mod class_info;
mod member;

pub use cache::DescriptorCache;
pub use class_info::{ClassInfo, ClassKind, Nesting};
pub use member::{ConstructorInfo, FieldInfo, MethodInfo, OverloadSet};
