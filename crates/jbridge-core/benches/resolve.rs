use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jbridge_core::{HostValue, Interop, InteropOptions, TypeRef};
use jbridge_testkit::{ClassBuilder, MethodBuilder, TestRuntime};

fn overloaded() -> ClassBuilder {
    let mut class = ClassBuilder::new("bench.Calls");
    for ty in ["int", "long", "short", "double", "java.lang.String", "java.lang.Object", "[I"] {
        class = class.method(MethodBuilder::new("f", &[ty], "void").statik());
        class = class.method(MethodBuilder::new("f", &[ty, ty], "void").statik());
    }
    class.method(
        MethodBuilder::new("f", &["java.lang.String", "[Ljava.lang.Object;"], "void")
            .statik()
            .varargs(),
    )
}

fn context(resolution_cache: bool) -> Interop {
    let rt = TestRuntime::shared();
    rt.define(overloaded());
    Interop::with_options(
        rt,
        InteropOptions {
            resolution_cache,
            ..InteropOptions::default()
        },
    )
}

fn bench_scoring(c: &mut Criterion) {
    let interop = context(true);
    interop.attach().unwrap();
    let string = TypeRef::from("java.lang.String");
    let ints = TypeRef::from("[I");
    let list = HostValue::List((0..64).map(HostValue::Int).collect());

    c.bench_function("score_str_to_string", |b| {
        b.iter(|| interop.score(black_box(&HostValue::from("text")), &string).unwrap());
    });
    c.bench_function("score_list_to_int_array", |b| {
        b.iter(|| interop.score(black_box(&list), &ints).unwrap());
    });
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    let shapes: [(&str, Vec<HostValue>); 4] = [
        ("int", vec![HostValue::Int(1)]),
        ("str", vec!["a".into()]),
        ("pair", vec![HostValue::Int(1), HostValue::Int(2)]),
        ("varargs", vec!["a".into(), HostValue::Int(1), HostValue::Bool(true), HostValue::None]),
    ];

    for cached in [true, false] {
        let interop = context(cached);
        let class = interop.get_class("bench.Calls").unwrap();
        let set = Arc::clone(class.find_methods("f", true).unwrap());
        let label = if cached { "cached" } else { "uncached" };

        for (name, args) in &shapes {
            group.bench_with_input(BenchmarkId::new(label, name), args, |b, args| {
                b.iter(|| interop.select(&set, black_box(args), Some(&*class)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_call(c: &mut Criterion) {
    let interop = context(true);
    let class = interop.get_class("bench.Calls").unwrap();
    let args = [HostValue::from("text")];

    c.bench_function("call_static_string", |b| {
        b.iter(|| interop.call_static(&class, "f", black_box(&args)).unwrap());
    });
}

criterion_group!(benches, bench_scoring, bench_select, bench_call);
criterion_main!(benches);
