//! Flow coalescing (section 4.3)
//!
//! Repeatedly merges any block `A` whose sole outgoing edge leads to a
//! block `B` with `A` as its sole predecessor. Terminates because each
//! iteration strictly reduces block or edge count (section 4.3, last
//! sentence), so the outer loop is a plain fixed-point `while changed`.

use crate::error::CompileResult;
use crate::ir::{Cfg, Expr};
use crate::pass::{Pass, PassId};

pub struct CoalesceFlow;

impl Pass for CoalesceFlow {
    fn id(&self) -> PassId {
        PassId::CoalesceFlow
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        coalesce_flow(cfg);
        Ok(())
    }
}

pub fn coalesce_flow(cfg: &mut Cfg) {
    loop {
        let mut changed = false;
        for a in cfg.live_ids().collect::<Vec<_>>() {
            if cfg.is_deleted(a) {
                continue;
            }
            let Some(only_succ) = sole_successor(cfg, a) else {
                continue;
            };
            let b = only_succ;
            if b == a {
                // Self-loop: A's only successor is itself. Not mergeable.
                continue;
            }
            if sole_predecessor(cfg, b) != Some(a) {
                continue;
            }
            if a != cfg.entry
                && cfg.block(a).stmts.is_empty()
                && cfg.block(a).phis.is_empty()
                && cfg.block(b).phis.is_empty()
            {
                elide(cfg, a, b);
            } else {
                merge_into(cfg, a, b);
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

fn sole_successor(cfg: &Cfg, id: crate::ir::BlockId) -> Option<crate::ir::BlockId> {
    let bb = cfg.block(id);
    if bb.succs.len() == 1 {
        Some(bb.succs[0].dst)
    } else {
        None
    }
}

fn sole_predecessor(cfg: &Cfg, id: crate::ir::BlockId) -> Option<crate::ir::BlockId> {
    let bb = cfg.block(id);
    if bb.preds.len() == 1 {
        Some(bb.preds[0])
    } else {
        None
    }
}

/// Merge `b`'s body into `a` and delete `b`.
fn merge_into(cfg: &mut Cfg, a: crate::ir::BlockId, b: crate::ir::BlockId) {
    // Any phi in B that names A as an incoming block becomes a plain Set
    // appended to A's body (the phi had exactly one arm, since A is B's
    // only predecessor).
    let b_phis = std::mem::take(&mut cfg.block_mut(b).phis);
    for (target, arms) in b_phis {
        if let Some(src) = arms.get(&a) {
            cfg.block_mut(a)
                .stmts
                .push(Expr::Set(target, Box::new(Expr::Get(src.clone()))));
        }
    }

    // Splice B's statements, test, and outgoing edges into A.
    let b_stmts = std::mem::take(&mut cfg.block_mut(b).stmts);
    let b_test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
    let b_succs = std::mem::take(&mut cfg.block_mut(b).succs);

    cfg.block_mut(a).stmts.extend(b_stmts);
    cfg.block_mut(a).test = b_test;
    cfg.block_mut(a).succs.clear();

    for e in b_succs {
        cfg.block_mut(e.dst).preds.retain(|&p| p != b);
        cfg.add_edge(a, e.dst, e.cond);
        // Downstream phis that keyed on B now arrive via A.
        rekey_phi_preds(cfg, e.dst, b, a);
    }

    cfg.delete_block(b);
}

/// `A` is empty and has no phis, and `B` has no phis either: skip `A`
/// entirely by pointing its predecessors straight at `B`.
fn elide(cfg: &mut Cfg, a: crate::ir::BlockId, b: crate::ir::BlockId) {
    cfg.redirect_preds(a, b);
    cfg.remove_edge(a, b);
    cfg.delete_block(a);
}

fn rekey_phi_preds(cfg: &mut Cfg, block: crate::ir::BlockId, from: crate::ir::BlockId, to: crate::ir::BlockId) {
    for arms in cfg.block_mut(block).phis.values_mut() {
        if let Some(src) = arms.remove(&from) {
            arms.insert(to, src);
        }
    }
}
