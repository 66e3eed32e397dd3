//! Integration tests for class descriptors and the descriptor cache

use std::sync::Arc;
use std::thread;

use jbridge_core::sdk::{JValue, RuntimeError};
use jbridge_core::{ClassKind, Interop, InteropError, Modifiers, Nesting, ReflectionError};
use jbridge_testkit::{ClassBuilder, MethodBuilder, TestRuntime};

const PUBLIC_STATIC: u32 = (Modifiers::PUBLIC | Modifiers::STATIC) as u32;

fn setup(classes: Vec<ClassBuilder>) -> (Arc<TestRuntime>, Interop) {
    let rt = TestRuntime::shared();
    for class in classes {
        rt.define(class);
    }
    let interop = Interop::new(rt.clone());
    (rt, interop)
}

fn outer_classes() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::new("demo.Outer")
            .nested("demo.Outer$Inner")
            .nested("demo.Outer$Nested")
            .constructor(MethodBuilder::constructor(&[]))
            .constructor(MethodBuilder::constructor(&["int"]))
            .method(MethodBuilder::new("size", &[], "int"))
            .method(MethodBuilder::new("of", &["int"], "demo.Outer").statik())
            .field("count", "int")
            .static_field("LIMIT", "int", JValue::Int(10)),
        ClassBuilder::new("demo.Outer$Inner").member_of("demo.Outer"),
        ClassBuilder::new("demo.Outer$Nested")
            .member_of("demo.Outer")
            .modifiers(PUBLIC_STATIC),
        ClassBuilder::new("demo.Outer$1").anonymous_in("demo.Outer"),
    ]
}

#[test]
fn test_descriptor_shape() {
    let (_rt, interop) = setup(outer_classes());
    let outer = interop.get_class("demo.Outer").unwrap();

    assert_eq!(outer.kind(), ClassKind::Ordinary);
    assert_eq!(outer.nesting(), Nesting::None);
    assert_eq!(outer.simple_name(), "Outer");
    assert_eq!(outer.package_name(), "demo");
    assert_eq!(outer.superclass().unwrap().name(), "java.lang.Object");
    assert_eq!(outer.constructors().len(), 2);

    // Inherited from java.lang.Object alongside the declared ones
    let names = outer.method_names(false);
    assert!(names.contains(&"size"));
    assert!(names.contains(&"toString"));
    assert!(names.contains(&"hashCode"));
    assert_eq!(outer.method_names(true), vec!["of"]);
    let to_string = outer.find_methods("toString", false).unwrap();
    assert_eq!(to_string.candidates()[0].declaring_type().name(), "java.lang.Object");

    assert_eq!(outer.field_names(false), vec!["count"]);
    assert_eq!(outer.field_names(true), vec!["LIMIT"]);
    assert_eq!(outer.find_field("count", false).unwrap().field_type().name(), "int");
    assert!(outer.find_field("count", true).is_none());

    let inner: Vec<&str> = outer.nested_types(false).iter().map(|t| t.name()).collect();
    let nested: Vec<&str> = outer.nested_types(true).iter().map(|t| t.name()).collect();
    assert_eq!(inner, vec!["demo.Outer$Inner"]);
    assert_eq!(nested, vec!["demo.Outer$Nested"]);
}

#[test]
fn test_nested_names() {
    let (_rt, interop) = setup(outer_classes());

    let nested = interop.get_class("demo.Outer$Nested").unwrap();
    assert_eq!(nested.nesting(), Nesting::Member);
    assert_eq!(nested.readable_name(), "demo.Outer.Nested");
    assert_eq!(nested.simple_name(), "Nested");
    assert_eq!(nested.declaring_type().unwrap().name(), "demo.Outer");
    assert!(nested.modifiers().is_static());

    let anonymous = interop.get_class("demo.Outer$1").unwrap();
    assert_eq!(anonymous.nesting(), Nesting::Anonymous);
    assert_eq!(anonymous.simple_name(), "");
    assert_eq!(anonymous.enclosing_type().unwrap().name(), "demo.Outer");
}

#[test]
fn test_descriptors_are_cached() {
    let (rt, interop) = setup(outer_classes());
    let first = interop.get_class("demo.Outer").unwrap();
    let queries = rt.reflective_calls("demo.Outer");
    assert!(queries > 0);

    let second = interop.get_class("demo.Outer").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(rt.reflective_calls("demo.Outer"), queries);

    // Ancestors are cached as a side effect
    assert!(interop.classes().contains("java.lang.Object"));
    assert!(Arc::ptr_eq(
        first.superclass().unwrap(),
        &interop.get_class("java.lang.Object").unwrap()
    ));
    assert_eq!(rt.live_local_refs(), 0);
}

#[test]
fn test_concurrent_lookups_publish_one_descriptor() {
    let (_rt, interop) = setup(outer_classes());
    let interop = Arc::new(interop);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let interop = Arc::clone(&interop);
            thread::spawn(move || interop.get_class("demo.Outer").unwrap())
        })
        .collect();
    let found: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let published = interop.get_class("demo.Outer").unwrap();
    for info in &found {
        assert!(Arc::ptr_eq(info, &published));
        assert!(!info.is_severed());
    }
}

#[test]
fn test_failed_build_leaves_cache_clean() {
    let (rt, interop) = setup(outer_classes());
    interop.get_class("java.lang.Object").unwrap();
    let globals = rt.live_global_refs();

    rt.fail_reflection("demo.Outer");
    let err = interop.get_class("demo.Outer").unwrap_err();
    match err {
        InteropError::Reflection(ReflectionError::Lookup { name, source }) => {
            assert_eq!(name, "demo.Outer");
            assert!(matches!(source, RuntimeError::Exception { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!interop.classes().contains("demo.Outer"));
    assert_eq!(rt.live_global_refs(), globals);
    assert_eq!(rt.live_local_refs(), 0);

    rt.heal_reflection("demo.Outer");
    assert!(interop.get_class("demo.Outer").is_ok());
}

#[test]
fn test_failing_ancestor_fails_the_subclass() {
    let (rt, interop) = setup(vec![
        ClassBuilder::new("demo.Base"),
        ClassBuilder::new("demo.Derived").extends("demo.Base"),
    ]);
    rt.fail_reflection("demo.Base");

    let err = interop.get_class("demo.Derived").unwrap_err();
    assert!(matches!(
        err,
        InteropError::Reflection(ReflectionError::Lookup { ref name, .. }) if name == "demo.Base"
    ));
    assert!(!interop.classes().contains("demo.Derived"));
    assert!(!interop.classes().contains("demo.Base"));
}

#[test]
fn test_missing_class() {
    let (_rt, interop) = setup(vec![]);
    let err = interop.get_class("demo.Missing").unwrap_err();
    assert!(matches!(
        err,
        InteropError::Reflection(ReflectionError::Lookup {
            source: RuntimeError::ClassNotFound(_),
            ..
        })
    ));
    assert!(err.to_string().starts_with("Cannot load class demo.Missing"), "{err}");
}

#[test]
fn test_variadic_without_array_is_malformed() {
    let (_rt, interop) = setup(vec![
        ClassBuilder::new("demo.Bad").method(MethodBuilder::new("f", &["int"], "void").varargs())
    ]);
    let err = interop.get_class("demo.Bad").unwrap_err();
    assert!(matches!(err, InteropError::Reflection(ReflectionError::Malformed { .. })));
    assert!(!interop.classes().contains("demo.Bad"));
}

#[test]
fn test_self_extending_class_is_a_cycle() {
    let (_rt, interop) = setup(vec![ClassBuilder::new("demo.Loop").extends("demo.Loop")]);
    let err = interop.get_class("demo.Loop").unwrap_err();
    assert_eq!(
        err,
        InteropError::Reflection(ReflectionError::Cycle {
            name: "demo.Loop".to_string()
        })
    );
}

#[test]
fn test_array_descriptors() {
    let (_rt, interop) = setup(vec![]);
    let strings = interop.get_class("[Ljava.lang.String;").unwrap();
    let objects = interop.get_class("[Ljava.lang.Object;").unwrap();
    let ints = interop.get_class("[I").unwrap();
    let object = interop.get_class("java.lang.Object").unwrap();

    assert_eq!(strings.kind(), ClassKind::Array);
    assert_eq!(strings.component_type().unwrap().name(), "java.lang.String");
    assert_eq!(strings.readable_name(), "java.lang.String[]");
    assert_eq!(ints.readable_name(), "int[]");
    assert_eq!(ints.component_type().unwrap().kind(), ClassKind::Primitive);

    assert!(objects.is_assignable_from(&strings));
    assert!(!strings.is_assignable_from(&objects));
    assert!(!objects.is_assignable_from(&ints));
    assert!(object.is_assignable_from(&ints));
}

#[test]
fn test_hierarchy_distances() {
    let (_rt, interop) = setup(vec![
        ClassBuilder::interface("demo.Shape"),
        ClassBuilder::new("demo.Base").implements("demo.Shape"),
        ClassBuilder::new("demo.Derived").extends("demo.Base"),
        ClassBuilder::new("demo.Color").enumeration(),
    ]);
    let derived = interop.get_class("demo.Derived").unwrap();
    let shape = interop.get_class("demo.Shape").unwrap();

    assert_eq!(derived.distance_to("demo.Derived"), Some(0));
    assert_eq!(derived.distance_to("demo.Base"), Some(1));
    assert_eq!(derived.distance_to("demo.Shape"), Some(2));
    assert_eq!(derived.distance_to("java.lang.String"), None);
    assert!(shape.is_assignable_from(&derived));
    assert!(!derived.is_assignable_from(&shape));
    assert_eq!(shape.kind(), ClassKind::Interface);
    assert!(shape.superclass().is_none());

    let color = interop.get_class("demo.Color").unwrap();
    assert_eq!(color.kind(), ClassKind::Enum);
}
