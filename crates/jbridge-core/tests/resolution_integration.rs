//! Integration tests for overload selection through an interop context

use std::sync::Arc;

use jbridge_core::sdk::{JValue, JavaRuntime};
use jbridge_core::{
    HostAdapter, HostValue, Interop, InteropError, InteropOptions, Quality, ResolutionError,
};
use jbridge_testkit::{ClassBuilder, MethodBuilder, TestRuntime};

fn setup(classes: Vec<ClassBuilder>) -> (Arc<TestRuntime>, Interop) {
    let rt = TestRuntime::shared();
    for class in classes {
        rt.define(class);
    }
    let interop = Interop::new(rt.clone());
    (rt, interop)
}

fn last_call(rt: &TestRuntime) -> String {
    rt.invocations().pop().unwrap_or_default()
}

fn calls_class() -> ClassBuilder {
    ClassBuilder::new("demo.Calls")
        .method(MethodBuilder::new("bar", &["long"], "void").statik())
        .method(MethodBuilder::new("bar", &["int"], "void").statik())
        .method(MethodBuilder::new("bar", &["java.lang.String"], "void").statik())
        .method(MethodBuilder::new("pair", &["int", "int"], "void").statik())
}

#[test]
fn test_int_prefers_int_over_long() {
    let (rt, interop) = setup(vec![calls_class()]);
    let calls = interop.get_class("demo.Calls").unwrap();

    interop.call_static(&calls, "bar", &[HostValue::Int(5)]).unwrap();
    assert_eq!(last_call(&rt), "bar(int)");

    // Does not fit an int: only the long overload applies
    interop.call_static(&calls, "bar", &[HostValue::Int(1 << 40)]).unwrap();
    assert_eq!(last_call(&rt), "bar(long)");

    interop.call_static(&calls, "bar", &[HostValue::from("x")]).unwrap();
    assert_eq!(last_call(&rt), "bar(java.lang.String)");
}

#[test]
fn test_no_applicable_overload_lists_every_candidate() {
    let (rt, interop) = setup(vec![calls_class()]);
    let calls = interop.get_class("demo.Calls").unwrap();

    let err = interop
        .call_static(&calls, "bar", &[HostValue::Bytes(vec![1, 2, 3])])
        .unwrap_err();
    assert!(matches!(
        err,
        InteropError::Resolution(ResolutionError::NoApplicableOverload { .. })
    ));
    let msg = err.to_string();
    assert!(msg.starts_with("No applicable overload of bar(bytes)"), "{msg}");
    assert!(msg.contains("bar(java.lang.String): FAIL on argument 0 (java.lang.String)"), "{msg}");
    assert!(msg.contains("bar(int): FAIL on argument 0 (int)"), "{msg}");
    assert!(rt.invocations().is_empty());
}

#[test]
fn test_arity_mismatch_is_reported() {
    let (_rt, interop) = setup(vec![calls_class()]);
    let calls = interop.get_class("demo.Calls").unwrap();

    let msg = interop
        .call_static(&calls, "pair", &[HostValue::Int(1)])
        .unwrap_err()
        .to_string();
    assert!(msg.contains("pair(int,int): takes 2 argument(s), 1 given"), "{msg}");
}

#[test]
fn test_unknown_member() {
    let (_rt, interop) = setup(vec![calls_class()]);
    let calls = interop.get_class("demo.Calls").unwrap();

    let err = interop.call_static(&calls, "missing", &[]).unwrap_err();
    assert_eq!(err.to_string(), "demo.Calls has no static method named missing");
    // Methods and fields live in separate namespaces
    let err = interop.get_static_field(&calls, "bar").unwrap_err();
    assert!(matches!(
        err,
        InteropError::Resolution(ResolutionError::NoSuchMember { kind: "static field", .. })
    ));
}

#[test]
fn test_string_prefers_exact_type() {
    let (rt, interop) = setup(vec![ClassBuilder::new("demo.Sink")
        .constructor(MethodBuilder::constructor(&[]))
        .method(MethodBuilder::new("m", &["java.lang.Object"], "void"))
        .method(MethodBuilder::new("m", &["java.lang.String"], "void"))]);
    let sink = interop.get_class("demo.Sink").unwrap();
    let obj = interop.new_instance(&sink, &[]).unwrap();

    interop.call_method(&obj, "m", &[HostValue::from("hello")]).unwrap();
    assert_eq!(last_call(&rt), "m(java.lang.String)");

    interop.call_method(&obj, "m", &[HostValue::Int(3)]).unwrap();
    assert_eq!(last_call(&rt), "m(java.lang.Object)");

    // null fits both; the narrower parameter type wins
    interop.call_method(&obj, "m", &[HostValue::None]).unwrap();
    assert_eq!(last_call(&rt), "m(java.lang.String)");
}

#[test]
fn test_most_specific_parameter_wins_ties() {
    let (rt, interop) = setup(vec![
        ClassBuilder::interface("demo.Iface"),
        ClassBuilder::new("demo.Impl")
            .implements("demo.Iface")
            .constructor(MethodBuilder::constructor(&[])),
        ClassBuilder::new("demo.Dispatch")
            .method(MethodBuilder::new("m", &["java.lang.Object"], "void").statik())
            .method(MethodBuilder::new("m", &["demo.Iface"], "void").statik()),
    ]);
    let imp = interop.get_class("demo.Impl").unwrap();
    let dispatch = interop.get_class("demo.Dispatch").unwrap();
    let obj = interop.new_instance(&imp, &[]).unwrap();

    // Both score GREAT for an Impl; Iface is assignable to Object, not the reverse
    interop.call_static(&dispatch, "m", &[HostValue::Object(obj)]).unwrap();
    assert_eq!(last_call(&rt), "m(demo.Iface)");
}

#[test]
fn test_narrower_primitive_wins_ties() {
    let (rt, interop) = setup(vec![ClassBuilder::new("demo.Narrow")
        .method(MethodBuilder::new("f", &["short"], "void").statik())
        .method(MethodBuilder::new("f", &["byte"], "void").statik())]);
    let narrow = interop.get_class("demo.Narrow").unwrap();

    interop.call_static(&narrow, "f", &[HostValue::Int(7)]).unwrap();
    assert_eq!(last_call(&rt), "f(byte)");

    // Only short can hold 1000
    interop.call_static(&narrow, "f", &[HostValue::Int(1000)]).unwrap();
    assert_eq!(last_call(&rt), "f(short)");
}

#[test]
fn test_declaration_order_breaks_remaining_ties() {
    let (rt, interop) = setup(vec![ClassBuilder::new("demo.Unrelated")
        .method(MethodBuilder::new("f", &["java.lang.Comparable"], "void").statik())
        .method(MethodBuilder::new("f", &["java.io.Serializable"], "void").statik())]);
    let unrelated = interop.get_class("demo.Unrelated").unwrap();

    // Neither interface extends the other
    interop.call_static(&unrelated, "f", &["x".into()]).unwrap();
    assert_eq!(last_call(&rt), "f(java.lang.Comparable)");
}

#[test]
fn test_degrading_an_argument_never_improves_a_candidate() {
    let (_rt, interop) = setup(vec![ClassBuilder::new("demo.Mixed")
        .method(MethodBuilder::new("f", &["int", "java.lang.String"], "void").statik())
        .method(MethodBuilder::new("g", &["char"], "void").statik())]);
    let mixed = interop.get_class("demo.Mixed").unwrap();
    let f = Arc::clone(&mixed.find_methods("f", true).unwrap().candidates()[0]);
    let g = Arc::clone(&mixed.find_methods("g", true).unwrap().candidates()[0]);

    let base = interop.score_candidate(&f, &[HostValue::Int(1), "x".into()]).unwrap();
    assert_eq!(base, Quality::Perfect);
    let degraded = [
        (vec![HostValue::Int(1), HostValue::None], Quality::Good),
        (vec![HostValue::Float(1.5), "x".into()], Quality::Fail),
        (vec![HostValue::Int(1 << 40), "x".into()], Quality::Fail),
        (vec![HostValue::Int(1), HostValue::Int(2)], Quality::Fail),
        (vec![HostValue::Int(1)], Quality::Fail),
    ];
    for (args, expected) in degraded {
        let quality = interop.score_candidate(&f, &args).unwrap();
        assert_eq!(quality, expected, "{args:?}");
        assert!(quality <= base);
    }

    let base = interop.score_candidate(&g, &["c".into()]).unwrap();
    assert_eq!(base, Quality::Perfect);
    let quality = interop.score_candidate(&g, &[HostValue::Int(65)]).unwrap();
    assert_eq!(quality, Quality::Bad);
}

fn text_class() -> ClassBuilder {
    ClassBuilder::new("demo.Text").method(
        MethodBuilder::new("join", &["java.lang.String", "[Ljava.lang.String;"], "java.lang.String")
            .statik()
            .varargs()
            .body(|rt, _, args| {
                let sep = rt.read_string(args[0].as_object().ok_or("null separator")?)?;
                let parts = rt
                    .string_elements(args[1].as_object().ok_or("null array")?)
                    .ok_or("not an array")?;
                let joined = parts
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect::<Vec<_>>()
                    .join(sep.as_str());
                Ok(JValue::Object(Some(rt.new_string(&joined)?)))
            }),
    )
}

#[test]
fn test_varargs_packs_trailing_arguments() {
    let (rt, interop) = setup(vec![text_class()]);
    let text = interop.get_class("demo.Text").unwrap();

    let joined = interop
        .call_static(&text, "join", &["-".into(), "a".into(), "b".into(), "c".into()])
        .unwrap();
    assert_eq!(joined, HostValue::from("a-b-c"));

    let empty = interop.call_static(&text, "join", &["-".into()]).unwrap();
    assert_eq!(empty, HostValue::from(""));

    // A sequence in the variadic position is passed as the array itself
    let direct = interop
        .call_static(
            &text,
            "join",
            &["+".into(), HostValue::List(vec!["x".into(), "y".into()])],
        )
        .unwrap();
    assert_eq!(direct, HostValue::from("x+y"));

    let err = interop
        .call_static(&text, "join", &["-".into(), "a".into(), HostValue::Int(1)])
        .unwrap_err();
    assert!(err.to_string().contains("FAIL on argument 2"), "{err}");

    assert_eq!(rt.live_local_refs(), 0);
}

#[test]
fn test_fixed_arity_beats_varargs_on_equal_quality() {
    let (rt, interop) = setup(vec![ClassBuilder::new("demo.Either")
        .method(MethodBuilder::new("f", &["[Ljava.lang.String;"], "void").statik().varargs())
        .method(MethodBuilder::new("f", &["java.lang.Object"], "void").statik())]);
    let either = interop.get_class("demo.Either").unwrap();

    interop.call_static(&either, "f", &["x".into()]).unwrap();
    assert_eq!(last_call(&rt), "f(java.lang.Object)");

    interop.call_static(&either, "f", &["x".into(), "y".into()]).unwrap();
    assert_eq!(last_call(&rt), "f([Ljava.lang.String;)");
}

#[test]
fn test_nearest_declaring_class_wins_ties() {
    let (rt, interop) = setup(vec![
        ClassBuilder::new("demo.Root").method(MethodBuilder::new("f", &["long"], "void")),
        ClassBuilder::new("demo.Middle").extends("demo.Root"),
        ClassBuilder::interface("demo.Boxing")
            .method(MethodBuilder::new("f", &["java.lang.Long"], "void")),
        ClassBuilder::new("demo.Leaf")
            .extends("demo.Middle")
            .implements("demo.Boxing")
            .constructor(MethodBuilder::constructor(&[])),
    ]);
    let leaf = interop.get_class("demo.Leaf").unwrap();
    let overloads = leaf.find_methods("f", false).unwrap();
    assert_eq!(overloads.len(), 2);
    // Inherited from the superclass chain first, interface defaults after
    assert_eq!(overloads.candidates()[0].declaring_type().name(), "demo.Root");

    // Both score GREAT for an int; the interface is one hop away, Root two
    let obj = interop.new_instance(&leaf, &[]).unwrap();
    interop.call_method(&obj, "f", &[HostValue::Int(1)]).unwrap();
    assert_eq!(last_call(&rt), "f(java.lang.Long)");
}

#[test]
fn test_resolution_cache_hits_per_call_shape() {
    let (_rt, interop) = setup(vec![calls_class()]);
    let calls = interop.get_class("demo.Calls").unwrap();

    interop.call_static(&calls, "bar", &[HostValue::Int(1)]).unwrap();
    interop.call_static(&calls, "bar", &[HostValue::Int(2)]).unwrap();
    let stats = interop.resolver_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));

    // Different shape, different entry
    interop.call_static(&calls, "bar", &[HostValue::Int(1 << 40)]).unwrap();
    assert_eq!(interop.resolver_stats().entries, 2);

    // New adapters can change scores, so memoised selections are dropped
    interop.register_adapter(HostAdapter::new(
        "bytes",
        "java.lang.String",
        |_, _| Quality::Good,
        |_, _, _| Ok(JValue::NULL),
    ));
    assert_eq!(interop.resolver_stats().entries, 0);
}

#[test]
fn test_resolution_cache_can_be_disabled() {
    let rt = TestRuntime::shared();
    rt.define(calls_class());
    let interop = Interop::with_options(
        rt.clone(),
        InteropOptions {
            resolution_cache: false,
            ..InteropOptions::default()
        },
    );
    let calls = interop.get_class("demo.Calls").unwrap();
    for _ in 0..3 {
        interop.call_static(&calls, "bar", &[HostValue::Int(1)]).unwrap();
    }
    let stats = interop.resolver_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (0, 3, 0));
    assert_eq!(rt.invocations().len(), 3);
}

#[test]
fn test_full_resolution_cache_is_cleared() {
    let rt = TestRuntime::shared();
    rt.define(calls_class());
    let interop = Interop::with_options(
        rt.clone(),
        InteropOptions {
            resolution_cache_capacity: 2,
            ..InteropOptions::default()
        },
    );
    let calls = interop.get_class("demo.Calls").unwrap();
    interop.call_static(&calls, "bar", &[HostValue::Int(1)]).unwrap();
    interop.call_static(&calls, "bar", &[HostValue::Int(1 << 40)]).unwrap();
    assert_eq!(interop.resolver_stats().entries, 2);

    // A third shape starts over rather than being dropped
    interop.call_static(&calls, "bar", &["s".into()]).unwrap();
    assert_eq!(interop.resolver_stats().entries, 1);
    interop.call_static(&calls, "bar", &["t".into()]).unwrap();
    let stats = interop.resolver_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 3, 1));
}
