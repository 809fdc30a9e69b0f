//! Variable inlining (section 4.11)
//!
//! Per round: collect each SSA place's single definition and its use count
//! across the whole CFG, mark a definition inlinable when it is a plain
//! rename (`Get` of another SSA place, regardless of use count) or when it
//! is side-effect-free and used at most once, then substitute every
//! matching use with a clone of the definition's RHS. Phi arms only accept
//! rename-kind substitutions, since an arm must stay a `Place`. Runs
//! [`arith_simplify`] after each round (section 4.10, "applied as part of
//! the inlining/simplification phase") and repeats until a round produces no
//! substitutions; the original (now probably dead) definitions are left
//! for `Dce` to remove.

use crate::error::CompileResult;
use crate::ir::{Cfg, Expr};
use crate::pass::{Pass, PassId};
use crate::passes::arith_simplify::arith_simplify;
use nodec_core::Place;
use std::collections::HashMap;

pub struct InlineVars;

impl Pass for InlineVars {
    fn id(&self) -> PassId {
        PassId::InlineVars
    }

    fn requires(&self) -> &[PassId] {
        &[PassId::ToSsa]
    }

    fn preserves(&self) -> Option<&[PassId]> {
        Some(&[PassId::ToSsa])
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        inline_vars(cfg);
        Ok(())
    }
}

pub fn inline_vars(cfg: &mut Cfg) {
    loop {
        let defs = collect_defs(cfg);
        let use_counts = collect_use_counts(cfg);

        let inlinable: HashMap<Place, Expr> = defs
            .into_iter()
            .filter(|(p, e)| {
                let is_rename = matches!(e, Expr::Get(Place::Ssa(_)));
                let is_value_inline =
                    !e.has_side_effects() && use_counts.get(p).copied().unwrap_or(0) <= 1;
                is_rename || is_value_inline
            })
            .collect();

        if inlinable.is_empty() {
            break;
        }

        let mut changed = false;
        for b in cfg.live_ids().collect::<Vec<_>>() {
            for i in 0..cfg.block(b).stmts.len() {
                let mut stmt = std::mem::replace(&mut cfg.block_mut(b).stmts[i], Expr::Const(0.0));
                substitute(&mut stmt, &inlinable, &mut changed);
                cfg.block_mut(b).stmts[i] = stmt;
            }
            let mut test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
            substitute(&mut test, &inlinable, &mut changed);
            cfg.block_mut(b).test = test;

            for arms in cfg.block_mut(b).phis.values_mut() {
                for v in arms.values_mut() {
                    if let Some(Expr::Get(p2)) = inlinable.get(v) {
                        *v = p2.clone();
                        changed = true;
                    }
                }
            }
        }

        arith_simplify(cfg);
        if !changed {
            break;
        }
    }
}

fn collect_defs(cfg: &Cfg) -> HashMap<Place, Expr> {
    let mut defs = HashMap::new();
    for b in cfg.live_ids() {
        for stmt in &cfg.block(b).stmts {
            if let Expr::Set(p @ Place::Ssa(_), rhs) = stmt {
                defs.insert(p.clone(), (**rhs).clone());
            }
        }
    }
    defs
}

fn collect_use_counts(cfg: &Cfg) -> HashMap<Place, usize> {
    let mut counts: HashMap<Place, usize> = HashMap::new();
    let mut bump = |p: &Place| {
        if matches!(p, Place::Ssa(_)) {
            *counts.entry(p.clone()).or_insert(0) += 1;
        }
    };
    for b in cfg.live_ids() {
        let bb = cfg.block(b);
        for stmt in &bb.stmts {
            stmt.for_each_use(&mut bump);
        }
        bb.test.for_each_use(&mut bump);
        for arms in bb.phis.values() {
            for src in arms.values() {
                bump(src);
            }
        }
    }
    counts
}

fn substitute(e: &mut Expr, inlinable: &HashMap<Place, Expr>, changed: &mut bool) {
    match e {
        Expr::Const(_) => {}
        Expr::Get(p) => {
            if let Some(repl) = inlinable.get(p) {
                *e = repl.clone();
                *changed = true;
            }
        }
        Expr::PureOp(_, args) | Expr::Op(_, args) => {
            for a in args.iter_mut() {
                substitute(a, inlinable, changed);
            }
        }
        Expr::Set(_, rhs) => substitute(rhs, inlinable, changed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodec_core::{Op, SsaPlace};

    fn ssa(name: &str, v: u32) -> Place {
        Place::Ssa(SsaPlace::new(name, v))
    }

    #[test]
    fn single_use_pure_definition_inlines() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("x", 0), Expr::Const(3.0)));
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(
            ssa("y", 0),
            Expr::pure_op(Op::Add, vec![Expr::get(ssa("x", 0)), Expr::Const(1.0)]),
        ));

        inline_vars(&mut cfg);

        let Expr::Set(_, rhs) = &cfg.block(cfg.entry).stmts[1] else {
            panic!()
        };
        assert_eq!(rhs.as_ref(), &Expr::Const(4.0));
    }

    #[test]
    fn multi_use_definition_is_not_value_inlined() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("x", 0), Expr::pure_op(Op::Add, vec![Expr::Const(1.0), Expr::Const(2.0)])));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("a", 0), Expr::get(ssa("x", 0))));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("b", 0), Expr::get(ssa("x", 0))));

        inline_vars(&mut cfg);

        // x is folded to Const(3.0) by arith_simplify regardless (constant
        // fold doesn't depend on use count), but it must still exist as its
        // own definition since two uses remain after one inlining round:
        // both a and b read the now-constant value.
        let Expr::Set(_, rhs_a) = &cfg.block(cfg.entry).stmts[1] else {
            panic!()
        };
        let Expr::Set(_, rhs_b) = &cfg.block(cfg.entry).stmts[2] else {
            panic!()
        };
        assert_eq!(rhs_a.as_ref(), &Expr::Const(3.0));
        assert_eq!(rhs_b.as_ref(), &Expr::Const(3.0));
    }

    #[test]
    fn plain_rename_inlines_regardless_of_use_count() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(
            ssa("x", 0),
            Expr::pure_op(Op::Add, vec![Expr::Const(1.0), Expr::Const(2.0)]),
        ));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("y", 0), Expr::get(ssa("x", 0))));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("a", 0), Expr::get(ssa("y", 0))));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("b", 0), Expr::get(ssa("y", 0))));

        inline_vars(&mut cfg);

        let Expr::Set(_, rhs_a) = &cfg.block(cfg.entry).stmts[2] else {
            panic!()
        };
        let Expr::Set(_, rhs_b) = &cfg.block(cfg.entry).stmts[3] else {
            panic!()
        };
        assert_eq!(rhs_a.as_ref(), &Expr::Const(3.0));
        assert_eq!(rhs_b.as_ref(), &Expr::Const(3.0));
    }
}
