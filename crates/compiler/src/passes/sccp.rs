//! Sparse conditional constant propagation (section 4.9)
//!
//! Two worklists: a flow worklist of edges just proven executable, and an
//! SSA worklist of places whose lattice value just moved. Lattice merges
//! use bit-pattern equality so a NaN constant can be compared for meet
//! purposes without tripping IEEE's `NaN != NaN`. A block's test gets its
//! own lattice slot, separate from the per-place table, since it isn't a
//! definition; when it settles on a constant, the test expression is
//! rewritten to that literal `Const` so `UnreachableElim` can act on it
//! (section 8 S3); leaf SSA reads elsewhere are substituted individually,
//! leaving compound folding to arithmetic simplification.

use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg, Expr};
use crate::pass::{Pass, PassId};
use nodec_core::{Op, Place};
use std::collections::{HashMap, HashSet, VecDeque};

pub struct Sccp;

impl Pass for Sccp {
    fn id(&self) -> PassId {
        PassId::Sccp
    }

    fn requires(&self) -> &[PassId] {
        &[PassId::ToSsa]
    }

    fn preserves(&self) -> Option<&[PassId]> {
        Some(&[PassId::ToSsa])
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        sccp(cfg);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Lattice {
    Undefined,
    Const(f64),
    NotAConstant,
}

fn lattice_eq(a: Lattice, b: Lattice) -> bool {
    match (a, b) {
        (Lattice::Undefined, Lattice::Undefined) => true,
        (Lattice::NotAConstant, Lattice::NotAConstant) => true,
        (Lattice::Const(x), Lattice::Const(y)) => x.to_bits() == y.to_bits(),
        _ => false,
    }
}

/// Monotone meet: never regresses from a constant back to `Undefined`.
fn meet(old: Lattice, new: Lattice) -> Lattice {
    match (old, new) {
        (Lattice::NotAConstant, _) | (_, Lattice::NotAConstant) => Lattice::NotAConstant,
        (Lattice::Undefined, x) => x,
        (x, Lattice::Undefined) => x,
        (Lattice::Const(a), Lattice::Const(b)) => {
            if a.to_bits() == b.to_bits() {
                Lattice::Const(a)
            } else {
                Lattice::NotAConstant
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Use {
    Stmt(BlockId, usize),
    Test(BlockId),
    PhiTarget(BlockId, Place),
}

struct SccpState {
    lattice: HashMap<Place, Lattice>,
    test_lattice: HashMap<BlockId, Lattice>,
    block_executable: HashSet<BlockId>,
    executable_edges: HashSet<(BlockId, BlockId)>,
    uses_index: HashMap<Place, Vec<Use>>,
    flow_worklist: VecDeque<(BlockId, BlockId)>,
    ssa_worklist: VecDeque<Place>,
}

pub fn sccp(cfg: &mut Cfg) {
    let mut st = SccpState {
        lattice: HashMap::new(),
        test_lattice: HashMap::new(),
        block_executable: HashSet::new(),
        executable_edges: HashSet::new(),
        uses_index: HashMap::new(),
        flow_worklist: VecDeque::new(),
        ssa_worklist: VecDeque::new(),
    };

    build_uses_index(cfg, &mut st.uses_index);

    st.block_executable.insert(cfg.entry);
    visit_block_first_time(cfg, &mut st, cfg.entry);

    loop {
        if let Some((src, dst)) = st.flow_worklist.pop_front() {
            if st.executable_edges.insert((src, dst)) {
                let first_time = st.block_executable.insert(dst);
                reevaluate_phis(cfg, &mut st, dst);
                if first_time {
                    visit_block_first_time(cfg, &mut st, dst);
                }
            }
            continue;
        }
        if let Some(place) = st.ssa_worklist.pop_front() {
            let uses = st.uses_index.get(&place).cloned().unwrap_or_default();
            for u in uses {
                match u {
                    Use::Stmt(b, i) => {
                        if st.block_executable.contains(&b) {
                            reevaluate_stmt(cfg, &mut st, b, i);
                        }
                    }
                    Use::Test(b) => {
                        if st.block_executable.contains(&b) {
                            reevaluate_test(cfg, &mut st, b);
                        }
                    }
                    Use::PhiTarget(b, _) => {
                        if st.block_executable.contains(&b) {
                            reevaluate_phis(cfg, &mut st, b);
                        }
                    }
                }
            }
            continue;
        }
        break;
    }

    substitute(cfg, &st);
}

fn build_uses_index(cfg: &Cfg, index: &mut HashMap<Place, Vec<Use>>) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        let bb = cfg.block(b);
        for (i, stmt) in bb.stmts.iter().enumerate() {
            stmt.for_each_use(&mut |p| {
                index.entry(p.clone()).or_default().push(Use::Stmt(b, i));
            });
        }
        bb.test.for_each_use(&mut |p| {
            index.entry(p.clone()).or_default().push(Use::Test(b));
        });
        for (target, arms) in &bb.phis {
            for src in arms.values() {
                index
                    .entry(src.clone())
                    .or_default()
                    .push(Use::PhiTarget(b, target.clone()));
            }
        }
    }
}

fn set_lattice(st: &mut SccpState, p: &Place, computed: Lattice) {
    let old = st.lattice.get(p).copied().unwrap_or(Lattice::Undefined);
    let merged = meet(old, computed);
    if !lattice_eq(old, merged) {
        st.lattice.insert(p.clone(), merged);
        st.ssa_worklist.push_back(p.clone());
    }
}

fn lattice_of(st: &SccpState, p: &Place) -> Lattice {
    match p {
        Place::Ssa(_) => st.lattice.get(p).copied().unwrap_or(Lattice::Undefined),
        // Temp blocks and fixed memory are never tracked by this lattice.
        Place::Temp(_) | Place::Block(_) => Lattice::NotAConstant,
    }
}

fn eval_expr(st: &SccpState, e: &Expr) -> Lattice {
    match e {
        Expr::Const(v) => Lattice::Const(*v),
        Expr::Get(p) => lattice_of(st, p),
        Expr::PureOp(op, args) => {
            let arg_lattices: Vec<Lattice> = args.iter().map(|a| eval_expr(st, a)).collect();
            combine(*op, &arg_lattices)
        }
        Expr::Op(op, args) => {
            if op.is_pure() {
                let arg_lattices: Vec<Lattice> = args.iter().map(|a| eval_expr(st, a)).collect();
                combine(*op, &arg_lattices)
            } else {
                Lattice::NotAConstant
            }
        }
        Expr::Set(_, _) => Lattice::NotAConstant,
    }
}

fn combine(op: Op, args: &[Lattice]) -> Lattice {
    match op {
        Op::And if args.iter().any(|a| matches!(a, Lattice::Const(v) if *v == 0.0)) => {
            return Lattice::Const(0.0)
        }
        Op::Or if args.iter().any(|a| matches!(a, Lattice::Const(v) if *v == 1.0)) => {
            return Lattice::Const(1.0)
        }
        Op::Multiply if args.iter().any(|a| matches!(a, Lattice::Const(v) if *v == 0.0)) => {
            return Lattice::Const(0.0)
        }
        _ => {}
    }
    if args.iter().any(|a| matches!(a, Lattice::NotAConstant)) {
        return Lattice::NotAConstant;
    }
    if args.iter().any(|a| matches!(a, Lattice::Undefined)) {
        return Lattice::Undefined;
    }
    let vals: Vec<f64> = args
        .iter()
        .map(|a| match a {
            Lattice::Const(v) => *v,
            _ => unreachable!("filtered above"),
        })
        .collect();
    match op.eval(&vals) {
        Some(v) => Lattice::Const(v),
        None => Lattice::NotAConstant,
    }
}

fn visit_block_first_time(cfg: &Cfg, st: &mut SccpState, b: BlockId) {
    for i in 0..cfg.block(b).stmts.len() {
        reevaluate_stmt(cfg, st, b, i);
    }
    reevaluate_test(cfg, st, b);
}

fn reevaluate_stmt(cfg: &Cfg, st: &mut SccpState, b: BlockId, i: usize) {
    let stmt = &cfg.block(b).stmts[i];
    if let Some(target @ Place::Ssa(_)) = stmt.defined_place() {
        let Expr::Set(_, rhs) = stmt else { return };
        let computed = eval_expr(st, rhs);
        set_lattice(st, target, computed);
    }
}

fn reevaluate_test(cfg: &Cfg, st: &mut SccpState, b: BlockId) {
    let bb = cfg.block(b);
    if bb.succs.len() <= 1 {
        if let Some(e) = bb.succs.first() {
            st.flow_worklist.push_back((b, e.dst));
        }
        return;
    }

    let computed = eval_expr(st, &bb.test);
    let old = st.test_lattice.get(&b).copied().unwrap_or(Lattice::Undefined);
    let merged = meet(old, computed);
    if lattice_eq(old, merged) {
        return;
    }
    st.test_lattice.insert(b, merged);
    match merged {
        Lattice::Const(v) => {
            let dst = bb
                .edge_for_cond(v)
                .or_else(|| bb.none_edge())
                .map(|e| e.dst);
            if let Some(dst) = dst {
                st.flow_worklist.push_back((b, dst));
            }
        }
        Lattice::NotAConstant => {
            for e in &bb.succs {
                st.flow_worklist.push_back((b, e.dst));
            }
        }
        Lattice::Undefined => {}
    }
}

fn reevaluate_phis(cfg: &Cfg, st: &mut SccpState, b: BlockId) {
    let phis: Vec<(Place, crate::ir::cfg::PhiArms)> = cfg
        .block(b)
        .phis
        .iter()
        .map(|(t, a)| (t.clone(), a.clone()))
        .collect();
    for (target, arms) in phis {
        let mut candidate: Option<f64> = None;
        let mut any_nac = false;
        for (pred, src) in &arms {
            if !st.executable_edges.contains(&(*pred, b)) {
                continue;
            }
            match lattice_of(st, src) {
                Lattice::NotAConstant => any_nac = true,
                Lattice::Const(c) => match candidate {
                    None => candidate = Some(c),
                    Some(c0) if c0.to_bits() == c.to_bits() => {}
                    Some(_) => any_nac = true,
                },
                Lattice::Undefined => {}
            }
        }
        let computed = if any_nac {
            Lattice::NotAConstant
        } else if let Some(c) = candidate {
            Lattice::Const(c)
        } else {
            Lattice::Undefined
        };
        set_lattice(st, &target, computed);
    }
}

fn substitute(cfg: &mut Cfg, st: &SccpState) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        if let Some(Lattice::Const(v)) = st.test_lattice.get(&b) {
            cfg.block_mut(b).test = Expr::Const(*v);
        } else {
            let mut test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
            substitute_expr(&mut test, &st.lattice);
            cfg.block_mut(b).test = test;
        }
        for i in 0..cfg.block(b).stmts.len() {
            let mut stmt = std::mem::replace(&mut cfg.block_mut(b).stmts[i], Expr::Const(0.0));
            substitute_expr(&mut stmt, &st.lattice);
            cfg.block_mut(b).stmts[i] = stmt;
        }
    }
}

fn substitute_expr(e: &mut Expr, lattice: &HashMap<Place, Lattice>) {
    if let Expr::Get(Place::Ssa(s)) = e {
        if let Some(Lattice::Const(v)) = lattice.get(&Place::Ssa(s.clone())) {
            *e = Expr::Const(*v);
            return;
        }
    }
    match e {
        Expr::Const(_) | Expr::Get(_) => {}
        Expr::PureOp(_, args) | Expr::Op(_, args) => {
            for a in args.iter_mut() {
                substitute_expr(a, lattice);
            }
        }
        Expr::Set(_, rhs) => substitute_expr(rhs, lattice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodec_core::SsaPlace;

    fn ssa(name: &str, v: u32) -> Place {
        Place::Ssa(SsaPlace::new(name, v))
    }

    #[test]
    fn constant_propagates_through_a_phi() {
        // S3: two predecessors each defining x=5 (as SSA values), a phi
        // merging them, a test `Equal(y, 5)` after copying the phi target.
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        let join = cfg.new_block();
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
        let j2 = cfg.new_block();
        let j3 = cfg.new_block();
        cfg.add_edge(join, j2, None);
        cfg.add_edge(join, j3, Some(0.0));
        cfg.block_mut(join).test = Expr::pure_op(Op::Equal, vec![Expr::get(ssa("y", 0)), Expr::Const(5.0)]);

        sccp(&mut cfg);

        assert!(matches!(cfg.block(join).test, Expr::Const(v) if v == 1.0));
    }

    #[test]
    fn and_short_circuits_on_zero_argument() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("a", 0), Expr::Const(0.0)));
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(
            ssa("b", 0),
            Expr::pure_op(Op::And, vec![Expr::get(ssa("a", 0)), Expr::Op(Op::Random, vec![])]),
        ));

        sccp(&mut cfg);

        let Expr::Set(_, rhs) = &cfg.block(cfg.entry).stmts[1] else {
            panic!()
        };
        assert!(matches!(rhs.as_ref(), Expr::Const(v) if *v == 0.0));
    }

    #[test]
    fn non_constant_test_marks_all_edges_executable() {
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        cfg.add_edge(cfg.entry, a, None);
        cfg.add_edge(cfg.entry, b, Some(0.0));
        cfg.block_mut(cfg.entry).test = Expr::Op(Op::Random, vec![]);

        sccp(&mut cfg);
        // both a and b must have become reachable, i.e. both survive a
        // subsequent unreachable-elim pass.
        crate::passes::unreachable_elim::unreachable_elim(&mut cfg);
        assert!(!cfg.is_deleted(a));
        assert!(!cfg.is_deleted(b));
    }
}
