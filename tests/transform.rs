//! End-to-end transform scenarios through the public API:
//! 1. Intern a small pool (including the Kotlin null-assertion helpers)
//! 2. Build a method body as a control flow graph
//! 3. Run the fixpoint analysis and apply the transform
//! 4. Verify the rewritten body and the reported stats

use dexprop::prelude::*;

/// Shared pool, assertion set and declaring class for one test.
struct Harness {
    pool: DexPool,
    assertions: NullAssertionSet,
    check: MethodRef,
    owner: TypeId,
}

impl Harness {
    fn new() -> Self {
        let mut pool = DexPool::new();
        let intrinsics = pool.intern_type("Lkotlin/jvm/internal/Intrinsics;", true);
        let check = pool.add_method(intrinsics, "checkNotNullParameter", RetType::Void);
        let assertions = NullAssertionSet::from_pool(&mut pool);
        let owner = pool.intern_type("Lcom/example/Main;", false);
        Harness {
            pool,
            assertions,
            check,
            owner,
        }
    }

    fn method(&mut self, name: &str) -> MethodRef {
        self.pool.add_method(self.owner, name, RetType::Primitive)
    }

    /// One analysis pass plus one transform application.
    fn apply(
        &self,
        method: MethodRef,
        wps: &WholeProgramState,
        stores: &StoreRefs,
        config: &Config,
        cfg: &mut ControlFlowGraph,
    ) -> Stats {
        let fixpoint = FixpointIterator::new(&self.pool, wps, config.class_under_init);
        let seed = entry_seed(cfg, wps, method);
        let analysis = fixpoint.analyze(cfg, seed);
        let transform = Transform::new(config.clone(), &self.assertions);
        transform.apply(&fixpoint, &analysis, wps, cfg, &self.pool, method, stores)
    }

    fn apply_default(&self, method: MethodRef, cfg: &mut ControlFlowGraph) -> Stats {
        self.apply(
            method,
            &WholeProgramState::empty(),
            &StoreRefs::single_store(),
            &Config::default(),
            cfg,
        )
    }
}

fn dead_branch_cfg() -> ControlFlowGraph {
    // b0: const v0, #5; if-gtz v0 -> b1 | b2
    // b1: return v0
    // b2: return (dead: v0 = 5 makes the branch always taken)
    let mut cfg = ControlFlowGraph::new();
    let b0 = cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: 5,
        },
        Instruction::If {
            op: IfOp::Gt,
            src1: Reg::new(0),
            src2: None,
        },
    ]);
    let b1 = cfg.add_block(vec![Instruction::Return {
        src: Some(Reg::new(0)),
    }]);
    let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
    cfg.add_edge(b0, b1, EdgeKind::Branch(true));
    cfg.add_edge(b0, b2, EdgeKind::Branch(false));
    cfg
}

#[test]
fn test_dead_branch_becomes_goto_and_prunes() {
    let mut harness = Harness::new();
    let method = harness.method("dead_branch");
    let mut cfg = dead_branch_cfg();

    let stats = harness.apply_default(method, &mut cfg);

    assert_eq!(stats.branches_removed, 1);
    assert_eq!(cfg.block(0).terminator(), Some(&Instruction::Goto));
    assert_eq!(cfg.goto_target(0), Some(1));
    assert!(cfg.block(2).is_dead());
    assert!(!cfg.block(1).is_dead());
}

#[test]
fn test_transform_is_idempotent() {
    let mut harness = Harness::new();
    let method = harness.method("idempotent");
    let mut cfg = dead_branch_cfg();

    let first = harness.apply_default(method, &mut cfg);
    assert!(!first.is_empty());

    let before_second = cfg.clone();
    let second = harness.apply_default(method, &mut cfg);
    assert!(second.is_empty(), "second pass changed: {second}");
    assert_eq!(cfg, before_second);
}

#[test]
fn test_proven_non_null_assertion_is_deleted() {
    let mut harness = Harness::new();
    let method = harness.method("non_null_check");
    let check = harness.check;

    let mut cfg = ControlFlowGraph::new();
    cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: 1,
        },
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: check,
            args: vec![Reg::new(0)],
        },
        Instruction::Return {
            src: Some(Reg::new(0)),
        },
    ]);

    let stats = harness.apply_default(method, &mut cfg);

    assert_eq!(stats.null_checks, 1);
    assert_eq!(stats.null_checks_method_calls, 1);
    assert_eq!(stats.throws, 0);
    // Only the call disappears.
    assert_eq!(cfg.block(0).instructions(), &[
        Instruction::Const {
            dest: Reg::new(0),
            value: 1
        },
        Instruction::Return {
            src: Some(Reg::new(0))
        },
    ]);
}

#[test]
fn test_proven_null_assertion_becomes_throw() {
    let mut harness = Harness::new();
    let method = harness.method("null_check_throws");
    let check = harness.check;

    let mut cfg = ControlFlowGraph::new();
    let b0 = cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: 0,
        },
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: check,
            args: vec![Reg::new(0)],
        },
        Instruction::Goto,
    ]);
    let b1 = cfg.add_block(vec![Instruction::Return {
        src: Some(Reg::new(0)),
    }]);
    cfg.add_edge(b0, b1, EdgeKind::Goto);

    let stats = harness.apply_default(method, &mut cfg);

    assert_eq!(stats.null_checks, 1);
    assert_eq!(stats.throws, 1);
    assert_eq!(stats.null_checks_method_calls, 0);
    assert!(matches!(
        cfg.block(b0).terminator(),
        Some(Instruction::Throw { .. })
    ));
    assert!(cfg.successors(b0).is_empty());
    // The block that followed the assertion is unreachable now.
    assert!(cfg.block(b1).is_dead());
}

#[test]
fn test_redundant_field_write_is_deleted() {
    let mut harness = Harness::new();
    let method = harness.method("redundant_put");
    let a = harness.pool.intern_string("a");
    let field = harness.pool.add_field(harness.owner, "tag", false);

    // Every write site in the program stores "a" to the field.
    let builder = WholeProgramStateBuilder::new();
    builder.record_field_write(field, ConstantValue::String(a));
    let wps = builder.freeze();

    let mut cfg = ControlFlowGraph::new();
    cfg.add_block(vec![
        Instruction::ConstString { string: a },
        Instruction::MoveResultPseudo { dest: Reg::new(0) },
        Instruction::SPut {
            src: Reg::new(0),
            field,
        },
        Instruction::Return { src: None },
    ]);

    let stats = harness.apply(
        method,
        &wps,
        &StoreRefs::single_store(),
        &Config::default(),
        &mut cfg,
    );

    assert_eq!(stats.redundant_puts_removed, 1);
    assert_eq!(cfg.block(0).instructions(), &[
        Instruction::ConstString { string: a },
        Instruction::MoveResultPseudo { dest: Reg::new(0) },
        Instruction::Return { src: None },
    ]);
}

#[test]
fn test_move_substitution_respects_store_partitions() {
    let mut harness = Harness::new();
    let method = harness.method("partitioned");
    let s = harness.pool.intern_string("secret");

    let build = |s: StringId| {
        let mut cfg = ControlFlowGraph::new();
        cfg.add_block(vec![
            Instruction::ConstString { string: s },
            Instruction::MoveResultPseudo { dest: Reg::new(0) },
            Instruction::Move {
                dest: Reg::new(1),
                src: Reg::new(0),
                kind: MoveKind::Object,
            },
            Instruction::Return {
                src: Some(Reg::new(1)),
            },
        ]);
        cfg
    };

    // Legal layout: the move is replaced by a fresh const-string pair.
    let mut cfg = build(s);
    let stats = harness.apply_default(method, &mut cfg);
    assert_eq!(stats.materialized_consts, 1);
    assert_eq!(cfg.block(0).instructions()[2..], [
        Instruction::ConstString { string: s },
        Instruction::MoveResultPseudo { dest: Reg::new(1) },
        Instruction::Return {
            src: Some(Reg::new(1))
        },
    ]);

    // Illegal layout: the declaring class may not reference the string's
    // store, so the rule abstains and the move survives.
    let mut stores = StoreRefs::single_store();
    stores.assign_type(harness.owner, 1);
    stores.assign_string(s, 2);
    let mut cfg = build(s);
    let stats = harness.apply(
        method,
        &WholeProgramState::empty(),
        &stores,
        &Config::default(),
        &mut cfg,
    );
    assert_eq!(stats.materialized_consts, 0);
    assert!(matches!(
        cfg.block(0).instructions()[2],
        Instruction::Move { .. }
    ));
}

#[test]
fn test_dead_switch_becomes_goto() {
    let mut harness = Harness::new();
    let method = harness.method("dead_switch");

    let build = || {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.add_block(vec![
            Instruction::Const {
                dest: Reg::new(0),
                value: 2,
            },
            Instruction::Switch { src: Reg::new(0) },
        ]);
        let b1 = cfg.add_block(vec![Instruction::Return { src: None }]);
        let b2 = cfg.add_block(vec![Instruction::Return {
            src: Some(Reg::new(0)),
        }]);
        let b3 = cfg.add_block(vec![Instruction::Return { src: None }]);
        cfg.add_edge(b0, b1, EdgeKind::Case(1));
        cfg.add_edge(b0, b2, EdgeKind::Case(2));
        cfg.add_edge(b0, b3, EdgeKind::Default);
        cfg
    };

    let mut cfg = build();
    let stats = harness.apply_default(method, &mut cfg);
    assert_eq!(stats.branches_removed, 1);
    assert_eq!(cfg.block(0).terminator(), Some(&Instruction::Goto));
    assert_eq!(cfg.goto_target(0), Some(2));
    assert!(cfg.block(1).is_dead());
    assert!(cfg.block(3).is_dead());

    // And the rule is config-gated.
    let mut cfg = build();
    let config = Config {
        remove_dead_switch: false,
        ..Config::default()
    };
    let stats = harness.apply(
        method,
        &WholeProgramState::empty(),
        &StoreRefs::single_store(),
        &config,
        &mut cfg,
    );
    assert_eq!(stats.branches_removed, 0);
    assert!(matches!(
        cfg.block(0).terminator(),
        Some(Instruction::Switch { .. })
    ));
}

#[test]
fn test_branch_forwarding_skips_trivial_block() {
    let mut harness = Harness::new();
    let method = harness.method("forwarding");

    // b0: if-eqz v0 -> b1 | b2 ; b1 is only a goto to b3.
    let mut cfg = ControlFlowGraph::new();
    let b0 = cfg.add_block(vec![Instruction::If {
        op: IfOp::Eq,
        src1: Reg::new(0),
        src2: None,
    }]);
    let b1 = cfg.add_block(vec![Instruction::Goto]);
    let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
    let b3 = cfg.add_block(vec![Instruction::Return {
        src: Some(Reg::new(0)),
    }]);
    cfg.add_edge(b0, b1, EdgeKind::Branch(true));
    cfg.add_edge(b0, b2, EdgeKind::Branch(false));
    cfg.add_edge(b1, b3, EdgeKind::Goto);

    let stats = harness.apply_default(method, &mut cfg);

    assert_eq!(stats.branches_forwarded, 1);
    assert_eq!(cfg.branch_target(b0, true), Some(b3));
    assert!(cfg.block(b1).is_dead());
}

#[test]
fn test_forwarding_refused_when_skipped_defs_are_live() {
    let mut harness = Harness::new();
    let method = harness.method("forwarding_refused");

    // b1 defines v1, and b3 reads it: skipping b1 would break b3.
    let mut cfg = ControlFlowGraph::new();
    let b0 = cfg.add_block(vec![Instruction::If {
        op: IfOp::Eq,
        src1: Reg::new(0),
        src2: None,
    }]);
    let b1 = cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(1),
            value: 7,
        },
        Instruction::Goto,
    ]);
    let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
    let b3 = cfg.add_block(vec![Instruction::Return {
        src: Some(Reg::new(1)),
    }]);
    cfg.add_edge(b0, b1, EdgeKind::Branch(true));
    cfg.add_edge(b0, b2, EdgeKind::Branch(false));
    cfg.add_edge(b1, b3, EdgeKind::Goto);

    let stats = harness.apply_default(method, &mut cfg);

    assert_eq!(stats.branches_forwarded, 0);
    assert_eq!(cfg.branch_target(b0, true), Some(b1));
    assert!(!cfg.block(b1).is_dead());
}

#[test]
fn test_parameter_constant_injection() {
    let mut harness = Harness::new();
    let method = harness.method("param_const");

    let builder = WholeProgramStateBuilder::new();
    builder.record_param(method, 0, ConstantValue::Signed(9));
    let wps = builder.freeze();

    let mut cfg = ControlFlowGraph::new();
    cfg.add_block(vec![
        Instruction::LoadParam {
            dest: Reg::new(0),
            wide: false,
        },
        Instruction::Return {
            src: Some(Reg::new(0)),
        },
    ]);

    let stores = StoreRefs::single_store();
    let config = Config::default();
    let stats = harness.apply(method, &wps, &stores, &config, &mut cfg);
    assert_eq!(stats.added_param_consts, 1);
    assert_eq!(cfg.block(0).instructions(), &[
        Instruction::LoadParam {
            dest: Reg::new(0),
            wide: false
        },
        Instruction::Const {
            dest: Reg::new(0),
            value: 9
        },
        Instruction::Return {
            src: Some(Reg::new(0))
        },
    ]);

    // The rule adds exactly once; a second pass finds the const in place.
    let stats = harness.apply(method, &wps, &stores, &config, &mut cfg);
    assert_eq!(stats.added_param_consts, 0);
    assert_eq!(cfg.block(0).instructions().len(), 3);
}

#[test]
fn test_pure_getter_result_is_materialized() {
    let mut harness = Harness::new();
    let method = harness.method("getter_caller");
    let getter = harness.pool.add_method(harness.owner, "getFlags", RetType::Primitive);

    let builder = WholeProgramStateBuilder::new();
    builder.record_pure_getter(getter);
    builder.record_return(getter, ConstantValue::Signed(7));
    let wps = builder.freeze();

    let mut cfg = ControlFlowGraph::new();
    cfg.add_block(vec![
        Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: getter,
            args: vec![Reg::new(0)],
        },
        Instruction::MoveResult {
            dest: Reg::new(1),
            kind: MoveKind::Value,
        },
        Instruction::Return {
            src: Some(Reg::new(1)),
        },
    ]);

    // Default config leaves move-result alone, but the pure-getter summary
    // licenses the substitution; the call itself stays.
    let stats = harness.apply(
        method,
        &wps,
        &StoreRefs::single_store(),
        &Config::default(),
        &mut cfg,
    );
    assert_eq!(stats.materialized_consts, 1);
    assert_eq!(cfg.block(0).instructions(), &[
        Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: getter,
            args: vec![Reg::new(0)],
        },
        Instruction::Const {
            dest: Reg::new(1),
            value: 7
        },
        Instruction::Return {
            src: Some(Reg::new(1))
        },
    ]);
}

#[test]
fn test_class_under_init_uses_local_field_facts() {
    let mut harness = Harness::new();
    let method = harness.method("clinit");
    let field = harness.pool.add_field(harness.owner, "state", false);

    // The whole-program summary says every write stores 1, but during the
    // initializer the field still holds its default before the first write:
    // only the second, locally-redundant write may go.
    let builder = WholeProgramStateBuilder::new();
    builder.record_field_write(field, ConstantValue::Signed(1));
    let wps = builder.freeze();

    let mut cfg = ControlFlowGraph::new();
    cfg.add_block(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: 1,
        },
        Instruction::SPut {
            src: Reg::new(0),
            field,
        },
        Instruction::Const {
            dest: Reg::new(1),
            value: 1,
        },
        Instruction::SPut {
            src: Reg::new(1),
            field,
        },
        Instruction::Return { src: None },
    ]);

    let config = Config {
        class_under_init: Some(harness.owner),
        ..Config::default()
    };
    let stats = harness.apply(
        method,
        &wps,
        &StoreRefs::single_store(),
        &config,
        &mut cfg,
    );

    assert_eq!(stats.redundant_puts_removed, 1);
    let insns = cfg.block(0).instructions();
    assert_eq!(insns.len(), 4);
    // The first write survives, the duplicate is gone.
    assert!(matches!(insns[1], Instruction::SPut { src, .. } if src == Reg::new(0)));
    assert!(!insns.iter().any(
        |i| matches!(i, Instruction::SPut { src, .. } if *src == Reg::new(1))
    ));
}

#[test]
fn test_flat_entry_point_agrees_on_null_checks() {
    let mut harness = Harness::new();
    let method = harness.method("flat_null_check");
    let check = harness.check;

    let mut code = IrCode::new(vec![
        Instruction::Const {
            dest: Reg::new(0),
            value: 1,
        },
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: check,
            args: vec![Reg::new(0)],
        },
        Instruction::Return {
            src: Some(Reg::new(0)),
        },
    ]);
    assert!(code.validate().is_ok());

    let wps = WholeProgramState::empty();
    let fixpoint = FixpointIterator::new(&harness.pool, &wps, None);
    let mut envs = Vec::with_capacity(code.len());
    let mut env = ConstantEnvironment::top();
    for insn in code.insns() {
        envs.push(env.clone());
        fixpoint.eval_instruction(insn, &mut env);
    }

    let transform = Transform::new(Config::default(), &harness.assertions);
    let stats = transform.apply_on_code(
        &envs,
        &wps,
        &mut code,
        &harness.pool,
        method,
        &StoreRefs::single_store(),
    );

    assert_eq!(stats.null_checks, 1);
    assert_eq!(stats.null_checks_method_calls, 1);
    assert_eq!(code.insns(), &[
        Instruction::Const {
            dest: Reg::new(0),
            value: 1
        },
        Instruction::Return {
            src: Some(Reg::new(0))
        },
    ]);
}
