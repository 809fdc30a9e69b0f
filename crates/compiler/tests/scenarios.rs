//! Boundary scenarios S1-S6 (section 8)
//!
//! Each test builds the literal CFG the scenario describes and asserts on
//! both CFG structure and interpreted behavior where the scenario calls
//! for it.

use nodec_compiler::analysis::analyze_liveness;
use nodec_compiler::compile;
use nodec_compiler::config::CompileOptions;
use nodec_compiler::ir::{Cfg, Expr};
use nodec_compiler::pass::Pass;
use nodec_compiler::passes::sccp::sccp;
use nodec_compiler::passes::{
    copy_coalesce::copy_coalesce, dce::advanced_dce, if_to_switch::if_to_switch, unreachable_elim::unreachable_elim,
};
use nodec_compiler::passes::AllocateStandard;
use nodec_compiler::pipeline::PipelineKind;
use nodec_core::{BlockPlace, Op, Place, SsaPlace, TempPlace};
use nodec_runtime::Interpreter;

fn temp(name: &str) -> Place {
    Place::Temp(TempPlace::new(name, 1))
}

fn ssa(name: &str, v: u32) -> Place {
    Place::Ssa(SsaPlace::new(name, v))
}

fn block(block_id: u32, index: u32) -> Place {
    Place::Block(BlockPlace::new(block_id, index, 0))
}

#[test]
fn s1_single_block_arithmetic_into_scratch() {
    let mut cfg = Cfg::new();
    cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("t_x"), Expr::Const(3.0)));
    cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("t_y"), Expr::Const(4.0)));
    cfg.block_mut(cfg.entry).stmts.push(Expr::set(
        temp("t_r"),
        Expr::pure_op(Op::Add, vec![Expr::get(temp("t_x")), Expr::get(temp("t_y"))]),
    ));
    cfg.block_mut(cfg.entry)
        .stmts
        .push(Expr::set(block(1, 0), Expr::get(temp("t_r"))));
    cfg.block_mut(cfg.entry).test = Expr::Const(1.0);

    let tree = compile(&mut cfg, &CompileOptions::new(PipelineKind::Standard)).unwrap();

    let mut interp = Interpreter::new();
    interp.run(&tree);
    assert_eq!(interp.cell(1, 0), 7.0);
}

#[test]
fn s2_constant_if_prunes_false_arm() {
    let mut cfg = Cfg::new();
    let true_arm = cfg.new_block();
    let false_arm = cfg.new_block();
    cfg.block_mut(cfg.entry).test = Expr::Const(1.0);
    cfg.add_edge(cfg.entry, true_arm, None);
    cfg.add_edge(cfg.entry, false_arm, Some(0.0));

    cfg.block_mut(true_arm)
        .stmts
        .push(Expr::set(block(1, 0), Expr::Const(42.0)));
    cfg.block_mut(true_arm).test = Expr::Const(1.0);

    cfg.block_mut(false_arm)
        .stmts
        .push(Expr::set(block(1, 0), Expr::Const(-1.0)));
    cfg.block_mut(false_arm).test = Expr::Const(1.0);

    unreachable_elim(&mut cfg);
    assert!(cfg.is_deleted(false_arm));
    assert!(!cfg.is_deleted(true_arm));

    let tree = compile(&mut cfg, &CompileOptions::new(PipelineKind::Minimal)).unwrap();
    let mut interp = Interpreter::new();
    interp.run(&tree);
    assert_eq!(interp.cell(1, 0), 42.0);
}

#[test]
fn s3_sccp_folds_test_through_phi_and_unreachable_elim_prunes_the_dead_arm() {
    let mut cfg = Cfg::new();
    let a = cfg.new_block();
    let b = cfg.new_block();
    let join = cfg.new_block();
    let t_arm = cfg.new_block();
    let f_arm = cfg.new_block();

    cfg.block_mut(cfg.entry).test = Expr::Const(1.0);
    cfg.add_edge(cfg.entry, a, None);
    cfg.add_edge(cfg.entry, b, Some(0.0));
    cfg.add_edge(a, join, None);
    cfg.add_edge(b, join, None);

    cfg.block_mut(a).stmts.push(Expr::set(ssa("x", 0), Expr::Const(5.0)));
    cfg.block_mut(b).stmts.push(Expr::set(ssa("x", 1), Expr::Const(5.0)));

    cfg.block_mut(join)
        .phis
        .insert(ssa("x", 2), [(a, ssa("x", 0)), (b, ssa("x", 1))].into_iter().collect());
    cfg.block_mut(join)
        .stmts
        .push(Expr::set(ssa("y", 0), Expr::get(ssa("x", 2))));
    cfg.block_mut(join).test = Expr::pure_op(Op::Equal, vec![Expr::get(ssa("y", 0)), Expr::Const(5.0)]);
    cfg.add_edge(join, t_arm, None);
    cfg.add_edge(join, f_arm, Some(0.0));
    cfg.block_mut(t_arm).test = Expr::Const(1.0);
    cfg.block_mut(f_arm).test = Expr::Const(1.0);

    sccp(&mut cfg);

    assert!(matches!(cfg.block(join).test, Expr::Const(v) if v == 1.0));

    unreachable_elim(&mut cfg);
    assert!(cfg.is_deleted(f_arm));
    assert!(!cfg.is_deleted(t_arm));
}

#[test]
fn s4_copy_coalescing_shares_one_cell_for_disjoint_non_interfering_copy() {
    let mut cfg = Cfg::new();
    cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("t_b"), Expr::Const(9.0)));
    cfg.block_mut(cfg.entry)
        .stmts
        .push(Expr::set(temp("t_a"), Expr::get(temp("t_b"))));
    cfg.block_mut(cfg.entry)
        .stmts
        .push(Expr::set(block(1, 0), Expr::get(temp("t_a"))));
    cfg.block_mut(cfg.entry).test = Expr::Const(1.0);

    let liveness = analyze_liveness(&cfg).unwrap();
    copy_coalesce(&mut cfg, &liveness);

    let names: std::collections::HashSet<String> = cfg
        .block(cfg.entry)
        .stmts
        .iter()
        .filter_map(Expr::defined_place)
        .filter_map(|p| match p {
            Place::Temp(t) => Some(t.name.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(names.len(), 1, "t_a and t_b should have coalesced to one name: {names:?}");

    AllocateStandard.run(&mut cfg).unwrap();
    assert_eq!(cfg.block(cfg.entry).stmts.len(), 2, "the now-redundant self-copy should have been swept");
}

#[test]
fn s5_if_chain_fuses_into_one_multiway_switch() {
    let mut cfg = Cfg::new();
    let mid1 = cfg.new_block();
    let mid2 = cfg.new_block();
    let arm1 = cfg.new_block();
    let arm2 = cfg.new_block();
    let arm3 = cfg.new_block();
    let fallback = cfg.new_block();

    let x = ssa("x", 0);
    cfg.block_mut(cfg.entry).test = Expr::pure_op(Op::Equal, vec![Expr::get(x.clone()), Expr::Const(1.0)]);
    cfg.add_edge(cfg.entry, arm1, Some(0.0));
    cfg.add_edge(cfg.entry, mid1, None);

    cfg.block_mut(mid1).test = Expr::pure_op(Op::Equal, vec![Expr::get(x.clone()), Expr::Const(2.0)]);
    cfg.add_edge(mid1, arm2, Some(0.0));
    cfg.add_edge(mid1, mid2, None);

    cfg.block_mut(mid2).test = Expr::pure_op(Op::Equal, vec![Expr::get(x), Expr::Const(3.0)]);
    cfg.add_edge(mid2, arm3, Some(0.0));
    cfg.add_edge(mid2, fallback, None);

    if_to_switch(&mut cfg);

    let entry = cfg.block(cfg.entry);
    assert_eq!(entry.edge_for_cond(1.0).unwrap().dst, arm1);
    assert_eq!(entry.edge_for_cond(2.0).unwrap().dst, arm2);
    assert_eq!(entry.edge_for_cond(3.0).unwrap().dst, arm3);
    assert_eq!(entry.none_edge().unwrap().dst, fallback);
}

#[test]
fn s6_repeated_overwrite_of_a_temp_eliminates_all_but_the_last_store() {
    // `TempPlace` addresses its whole region, not an individual element
    // (see DESIGN.md), so "index 0 of a 4-slot array never read" has no
    // literal analog here. A scalar temp overwritten four times before its
    // one read is the faithful equivalent: ordinary backward liveness kills
    // each store as soon as the next one lands, leaving only the last write
    // live-after. (A non-scalar `TempPlace` would instead hit the
    // array-init refinement in `liveness.rs`, which prunes only the first
    // redundant store in-block, not the whole chain; scalar is what
    // exercises "all but the last" exactly.)
    let t = || temp("t_x");
    let mut cfg = Cfg::new();
    for v in [111.0, 1.0, 2.0, 3.0] {
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(t(), Expr::Const(v)));
    }
    cfg.block_mut(cfg.entry).stmts.push(Expr::set(block(1, 0), Expr::get(t())));
    cfg.block_mut(cfg.entry).test = Expr::Const(1.0);

    let liveness = analyze_liveness(&cfg).unwrap();
    advanced_dce(&mut cfg, &liveness);

    // Only the last write to t_x and the final block store survive.
    assert_eq!(cfg.block(cfg.entry).stmts.len(), 2);
    assert!(matches!(&cfg.block(cfg.entry).stmts[0], Expr::Set(_, rhs) if matches!(rhs.as_ref(), Expr::Const(v) if *v == 3.0)));
}
