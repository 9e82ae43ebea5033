//! Benchmarks for the allocation-elision pipeline.
//!
//! Measures the full four-stage run on representative graph shapes:
//! - A small rest-parameter function (the common case)
//! - A wide function with many independent candidates
//! - A function whose candidates all escape (analysis-only cost)

extern crate argelide;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use argelide::prelude::*;

/// One inlined rest-parameter function reading length and one element.
fn small_rest_graph() -> Graph {
    let mut b = GraphBuilder::new(1, 32);
    let frame = b
        .inline_frame(VirtualRegister::new(8), false, 4)
        .expect("frame fits");
    let entry = b.block();
    b.set_frame(Some(frame));
    let rest = b.add(entry, Op::CreateRest { skip: 0 }, vec![]).expect("add");
    let length = b
        .add(
            entry,
            Op::GetArrayLength {
                mode: ArrayMode::contiguous_in_bounds(),
            },
            vec![rest],
        )
        .expect("add");
    let index = b.int32(entry, 0).expect("add");
    let first = b
        .add(
            entry,
            Op::GetIndex {
                mode: ArrayMode::contiguous_in_bounds(),
            },
            vec![rest, index],
        )
        .expect("add");
    let _ = length;
    b.ret(entry, Some(first)).expect("terminate");
    b.finish().expect("valid graph")
}

/// Many candidates across a chain of blocks, each read locally.
fn wide_graph(candidates: usize) -> Graph {
    let slots = 16 + candidates * 8;
    let mut b = GraphBuilder::new(1, slots);
    let mut blocks = Vec::new();
    for _ in 0..=candidates {
        blocks.push(b.block());
    }
    for i in 0..candidates {
        let frame = b
            .inline_frame(VirtualRegister::new((16 + i * 8) as u32), false, 3)
            .expect("frame fits");
        let block = blocks[i];
        b.set_frame(Some(frame));
        let rest = b.add(block, Op::CreateRest { skip: 0 }, vec![]).expect("add");
        b.add(
            block,
            Op::GetArrayLength {
                mode: ArrayMode::contiguous_in_bounds(),
            },
            vec![rest],
        )
        .expect("add");
        b.set_frame(None);
        b.jump(block, blocks[i + 1]).expect("terminate");
    }
    b.ret(blocks[candidates], None).expect("terminate");
    b.finish().expect("valid graph")
}

/// Candidates that all escape through returns-into-calls.
fn escaping_graph(candidates: usize) -> Graph {
    let slots = 16 + candidates * 8;
    let mut b = GraphBuilder::new(1, slots);
    let entry = b.block();
    let mut last = None;
    for i in 0..candidates {
        let frame = b
            .inline_frame(VirtualRegister::new((16 + i * 8) as u32), false, 3)
            .expect("frame fits");
        b.set_frame(Some(frame));
        let rest = b.add(entry, Op::CreateRest { skip: 0 }, vec![]).expect("add");
        b.set_frame(None);
        // A fixed-arity call consuming the object escapes it.
        let callee = b.constant(entry, ConstValue::Undefined).expect("add");
        let this = b.constant(entry, ConstValue::Undefined).expect("add");
        last = Some(
            b.add(entry, Op::Call, vec![callee, this, rest]).expect("add"),
        );
    }
    b.ret(entry, last).expect("terminate");
    b.finish().expect("valid graph")
}

fn bench_small_rest(c: &mut Criterion) {
    let graph = small_rest_graph();
    c.bench_function("elide_small_rest", |b| {
        b.iter(|| {
            let mut graph = black_box(graph.clone());
            let ctx = RuntimeContext::new();
            let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx).unwrap();
            black_box(outcome.changed)
        });
    });
}

fn bench_wide_64(c: &mut Criterion) {
    let graph = wide_graph(64);
    c.bench_function("elide_wide_64", |b| {
        b.iter(|| {
            let mut graph = black_box(graph.clone());
            let ctx = RuntimeContext::new();
            let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx).unwrap();
            black_box(outcome.changed)
        });
    });
}

fn bench_escaping_64(c: &mut Criterion) {
    let graph = escaping_graph(64);
    c.bench_function("elide_escaping_64", |b| {
        b.iter(|| {
            let mut graph = black_box(graph.clone());
            let ctx = RuntimeContext::new();
            let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx).unwrap();
            black_box(outcome.changed)
        });
    });
}

criterion_group!(
    benches,
    bench_small_rest,
    bench_wide_64,
    bench_escaping_64
);
criterion_main!(benches);
