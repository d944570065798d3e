//! Benchmarks the full analyze-and-transform pipeline over a synthetic
//! corpus of small methods.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::hint::black_box;

use dexprop::prelude::*;

const METHODS: usize = 256;

struct Corpus {
    pool: DexPool,
    assertions: NullAssertionSet,
    wps: WholeProgramState,
    stores: StoreRefs,
    templates: Vec<(MethodRef, ControlFlowGraph)>,
}

/// A method with a provably dead branch, a trivial forwarding block and a
/// null-assertion call: every major rule fires at least once.
fn template_cfg(seed: i32, check: MethodRef) -> ControlFlowGraph {
    let mut cfg = ControlFlowGraph::new();
    let b0 = cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: seed,
        },
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: check,
            args: vec![Reg::new(0)],
        },
        Instruction::If {
            op: IfOp::Gt,
            src1: Reg::new(0),
            src2: None,
        },
    ]);
    let b1 = cfg.add_block(vec![Instruction::Goto]);
    let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
    let b3 = cfg.add_block(vec![
        Instruction::Move {
            dest: Reg::new(1),
            src: Reg::new(0),
            kind: MoveKind::Value,
        },
        Instruction::Return {
            src: Some(Reg::new(1)),
        },
    ]);
    cfg.add_edge(b0, b1, EdgeKind::Branch(true));
    cfg.add_edge(b0, b2, EdgeKind::Branch(false));
    cfg.add_edge(b1, b3, EdgeKind::Goto);
    cfg
}

fn build_corpus() -> Corpus {
    let mut pool = DexPool::new();
    let intrinsics = pool.intern_type("Lkotlin/jvm/internal/Intrinsics;", true);
    let check = pool.add_method(intrinsics, "checkNotNullParameter", RetType::Void);
    let assertions = NullAssertionSet::from_pool(&mut pool);
    let owner = pool.intern_type("Lcom/bench/Workload;", false);

    let templates = (0..METHODS)
        .map(|i| {
            let method = pool.add_method(owner, &format!("m{i}"), RetType::Primitive);
            (method, template_cfg(i as i32 + 1, check))
        })
        .collect();

    Corpus {
        pool,
        assertions,
        wps: WholeProgramState::empty(),
        stores: StoreRefs::single_store(),
        templates,
    }
}

fn bench_transform_corpus(c: &mut Criterion) {
    let corpus = build_corpus();
    let instructions: usize = corpus
        .templates
        .iter()
        .map(|(_, cfg)| cfg.instruction_count())
        .sum();

    let mut group = c.benchmark_group("transform");
    group.throughput(Throughput::Elements(instructions as u64));
    group.bench_function("run_transforms", |b| {
        b.iter_batched(
            || {
                corpus
                    .templates
                    .iter()
                    .map(|(method, cfg)| MethodBody {
                        method: *method,
                        cfg: cfg.clone(),
                    })
                    .collect::<Vec<_>>()
            },
            |mut bodies| {
                let stats = run_transforms(
                    &corpus.pool,
                    &corpus.wps,
                    &corpus.stores,
                    &Config::default(),
                    &corpus.assertions,
                    &mut bodies,
                );
                black_box(stats)
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_fixpoint_only(c: &mut Criterion) {
    let corpus = build_corpus();

    c.bench_function("fixpoint_analysis", |b| {
        let fixpoint = FixpointIterator::new(&corpus.pool, &corpus.wps, None);
        b.iter(|| {
            for (method, cfg) in &corpus.templates {
                let seed = entry_seed(cfg, &corpus.wps, *method);
                black_box(fixpoint.analyze(cfg, seed));
            }
        });
    });
}

criterion_group!(benches, bench_transform_corpus, bench_fixpoint_only);
criterion_main!(benches);
