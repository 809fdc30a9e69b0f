//! SSA destruction (section 4.7)
//!
//! Every incoming edge of a block with phis gets a fresh edge-splitting
//! block carrying the phi's lowering as plain copies; phis are then
//! cleared. Every remaining SSA place in the program, not just the
//! phi targets and arms, retires to its own size-1 temp block named
//! `"{name}.{version}"`; copy-coalescing is what later merges the
//! copies this introduces back down.

use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg, Expr};
use crate::pass::{Pass, PassId};
use nodec_core::{Place, TempPlace};

pub struct FromSsa;

impl Pass for FromSsa {
    fn id(&self) -> PassId {
        PassId::FromSsa
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        from_ssa(cfg);
        Ok(())
    }
}

pub fn from_ssa(cfg: &mut Cfg) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        if cfg.block(b).phis.is_empty() {
            continue;
        }
        let phis = std::mem::take(&mut cfg.block_mut(b).phis);
        let preds: Vec<BlockId> = cfg.block(b).preds.clone();

        for pred in preds {
            let Some(cond) = cfg
                .block(pred)
                .succs
                .iter()
                .find(|e| e.dst == b)
                .map(|e| e.cond)
            else {
                continue;
            };

            let m = cfg.new_block();
            cfg.remove_edge(pred, b);
            cfg.add_edge(pred, m, cond);
            cfg.add_edge(m, b, None);

            for (target, arms) in &phis {
                let Place::Ssa(target_ssa) = target else {
                    continue;
                };
                if let Some(src) = arms.get(&pred) {
                    let Place::Ssa(src_ssa) = src else { continue };
                    cfg.block_mut(m).stmts.push(Expr::Set(
                        retired_place(target_ssa),
                        Box::new(Expr::Get(retired_place(src_ssa))),
                    ));
                }
            }
        }
    }

    for b in cfg.live_ids().collect::<Vec<_>>() {
        for i in 0..cfg.block(b).stmts.len() {
            retire_defined(&mut cfg.block_mut(b).stmts[i]);
            cfg.block_mut(b).stmts[i].for_each_use_mut(&mut retire_use);
        }
        let mut test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
        test.for_each_use_mut(&mut retire_use);
        cfg.block_mut(b).test = test;
    }
}

fn retired_place(s: &nodec_core::SsaPlace) -> Place {
    Place::Temp(TempPlace::new(s.retired_temp_name(), 1))
}

fn retire_use(p: &mut Place) {
    if let Place::Ssa(s) = p {
        *p = retired_place(s);
    }
}

fn retire_defined(stmt: &mut Expr) {
    if let Some(p @ Place::Ssa(_)) = stmt.defined_place_mut() {
        let Place::Ssa(s) = p else { unreachable!() };
        let retired = retired_place(s);
        *p = retired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;
    use nodec_core::SsaPlace;

    fn ssa(name: &str, v: u32) -> Place {
        Place::Ssa(SsaPlace::new(name, v))
    }

    #[test]
    fn phi_lowers_to_copies_on_split_blocks() {
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        let join = cfg.new_block();
        cfg.add_edge(cfg.entry, a, None);
        cfg.add_edge(cfg.entry, b, Some(0.0));
        cfg.add_edge(a, join, None);
        cfg.add_edge(b, join, None);
        cfg.block_mut(join).phis.insert(
            ssa("x", 2),
            [(a, ssa("x", 0)), (b, ssa("x", 1))].into_iter().collect(),
        );

        from_ssa(&mut cfg);

        assert!(cfg.block(join).phis.is_empty());
        // two new split blocks were inserted between a/b and join.
        assert_eq!(cfg.live_ids().count(), 5);
        for pred in [a, b] {
            let edge = cfg.block(pred).succs[0];
            let m = edge.dst;
            assert_ne!(m, join);
            assert_eq!(cfg.block(m).stmts.len(), 1);
            assert!(matches!(&cfg.block(m).stmts[0], Expr::Set(p, _) if *p == Place::Temp(TempPlace::new("x.2", 1))));
        }
    }

    #[test]
    fn no_ssa_places_survive() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("y", 0), Expr::Const(1.0)));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(ssa("z", 0), Expr::get(ssa("y", 0))));

        from_ssa(&mut cfg);

        for stmt in &cfg.block(cfg.entry).stmts {
            assert!(!matches!(stmt.defined_place(), Some(Place::Ssa(_))));
            let mut has_ssa_use = false;
            stmt.for_each_use(&mut |p| has_ssa_use |= matches!(p, Place::Ssa(_)));
            assert!(!has_ssa_use);
        }
    }
}
