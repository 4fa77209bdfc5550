//! Dispatch microbenchmarks: single-write notification and batched method
//! invocation over a small record.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vigil_core::watch::{watch, Listener, Record, Value};

fn single_write_dispatch(c: &mut Criterion) {
    let record = Record::new();
    record.insert("count", 0);
    let wrapper = watch(&record).expect("wraps");
    wrapper.attach(&Listener::new(|summary| {
        black_box(summary.len());
    }));

    c.bench_function("single_write_dispatch", |b| {
        b.iter(|| {
            wrapper.set("count", black_box(1)).expect("write");
        })
    });
}

fn batched_method_dispatch(c: &mut Criterion) {
    let record = Record::new();
    for key in ["a", "b", "c", "d"] {
        record.insert(key, 0);
    }
    record.insert(
        "bump",
        Value::method(|receiver, _args| {
            for key in ["a", "b", "c", "d"] {
                receiver.set(key, 1).expect("write");
            }
            Value::Null
        }),
    );
    let wrapper = watch(&record).expect("wraps");
    wrapper.attach(&Listener::new(|summary| {
        black_box(summary.len());
    }));

    c.bench_function("batched_method_dispatch", |b| {
        b.iter(|| {
            wrapper.call("bump", black_box(&[])).expect("invoke");
        })
    });
}

criterion_group!(benches, single_write_dispatch, batched_method_dispatch);
criterion_main!(benches);
