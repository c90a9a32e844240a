//! Propagation benchmarks: cost of a write reaching its dependents.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_core::reactive::{create_ref, run_effect, wrap, Record};

fn ref_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("ref_fan_out");

    for subscribers in [1usize, 16, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let source = create_ref(0u64);
                let total = Rc::new(Cell::new(0u64));
                let effects: Vec<_> = (0..subscribers)
                    .map(|_| {
                        let (source, total) = (source.clone(), total.clone());
                        run_effect(move || total.set(total.get().wrapping_add(source.get())))
                    })
                    .collect();

                let mut next = 0u64;
                b.iter(|| {
                    next += 1;
                    source.set(black_box(next));
                });

                for effect in effects {
                    effect.dispose();
                }
            },
        );
    }

    group.finish();
}

fn record_field_write(c: &mut Criterion) {
    let data = wrap(&Record::from_iter([("hot", 0i64), ("cold", 0i64)]));
    let seen = Rc::new(Cell::new(0i64));

    let effect = run_effect({
        let (data, seen) = (data.clone(), seen.clone());
        move || seen.set(data.get("hot").and_then(|v| v.as_int()).unwrap_or(0))
    });

    let mut next = 0i64;
    c.bench_function("record_field_write", |b| {
        b.iter(|| {
            next += 1;
            data.set("hot", black_box(next));
        })
    });

    c.bench_function("record_untracked_field_write", |b| {
        b.iter(|| {
            next += 1;
            data.set("cold", black_box(next));
        })
    });

    effect.dispose();
}

fn effect_rerun(c: &mut Criterion) {
    let refs: Vec<_> = (0..8).map(create_ref).collect();
    let effect = run_effect({
        let refs = refs.clone();
        move || {
            black_box(refs.iter().map(|r| r.get()).sum::<i32>());
        }
    });

    c.bench_function("effect_rerun_8_deps", |b| b.iter(|| effect.rerun()));

    effect.dispose();
}

criterion_group!(benches, ref_fan_out, record_field_write, effect_rerun);
criterion_main!(benches);
