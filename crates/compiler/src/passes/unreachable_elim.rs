//! Unreachable-code elimination (section 4.4)
//!
//! Walks reachable blocks from entry. When a block's test is a constant,
//! collapse its outgoing edges to the one surviving arm; after the walk,
//! delete every block the walk never reached and strip their phi arms from
//! the survivors.

use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg, Expr};
use crate::pass::{Pass, PassId};

pub struct UnreachableElim;

impl Pass for UnreachableElim {
    fn id(&self) -> PassId {
        PassId::UnreachableElim
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        unreachable_elim(cfg);
        Ok(())
    }
}

pub fn unreachable_elim(cfg: &mut Cfg) {
    // Fold constant-tested branches first, so reachability reflects the
    // pruned edge set rather than the original one.
    let mut worklist: Vec<BlockId> = vec![cfg.entry];
    let mut folded: std::collections::HashSet<BlockId> = std::collections::HashSet::new();
    while let Some(id) = worklist.pop() {
        if !folded.insert(id) {
            continue;
        }
        fold_constant_branch(cfg, id);
        for e in &cfg.block(id).succs {
            worklist.push(e.dst);
        }
    }

    let reachable: std::collections::HashSet<BlockId> = cfg.reachable().into_iter().collect();

    for id in cfg.live_ids().collect::<Vec<_>>() {
        if !reachable.contains(&id) {
            // Remove this block as a predecessor of anything it still
            // points to, and strip its phi arms from survivors.
            let succs: Vec<_> = cfg.block(id).succs.iter().map(|e| e.dst).collect();
            for dst in succs {
                strip_phi_arm(cfg, dst, id);
            }
            cfg.delete_block(id);
        }
    }
}

fn fold_constant_branch(cfg: &mut Cfg, id: BlockId) {
    let const_value = match &cfg.block(id).test {
        Expr::Const(v) => Some(*v),
        _ => None,
    };
    let Some(v) = const_value else { return };

    let bb = cfg.block(id);
    let keep = bb
        .edge_for_cond(v)
        .copied()
        .or_else(|| bb.none_edge().copied());
    let Some(keep) = keep else { return };

    let all_dsts: Vec<BlockId> = bb.succs.iter().map(|e| e.dst).collect();
    let keep_dst = keep.dst;

    // Remove every outgoing edge (including the one we're about to keep;
    // it gets re-added below with its cond normalized to None) so that
    // each target's `preds` stays in sync; `remove_edge` updates both
    // endpoints, unlike mutating `succs` directly.
    for dst in &all_dsts {
        cfg.remove_edge(id, *dst);
    }
    for dst in all_dsts {
        if dst != keep_dst && !cfg.block(dst).preds.contains(&id) {
            strip_phi_arm(cfg, dst, id);
        }
    }

    cfg.block_mut(id).test = Expr::Const(0.0);
    cfg.add_edge(id, keep_dst, None);
}

fn strip_phi_arm(cfg: &mut Cfg, at: BlockId, pred: BlockId) {
    if let Some(bb) = cfg.try_block(at) {
        if bb.phis.is_empty() {
            return;
        }
    } else {
        return;
    }
    for arms in cfg.block_mut(at).phis.values_mut() {
        arms.remove(&pred);
    }
}
