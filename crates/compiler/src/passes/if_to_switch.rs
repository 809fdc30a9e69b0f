//! If-to-switch rewriting (section 4.13)
//!
//! First scan: a block with exactly two outgoing edges, one `None` and one
//! `Some(0.0)`, whose test is `Equal(const, other)` or `Equal(other, const)`,
//! gets its test rewritten to `other` and its edges relabeled, `None`
//! becomes `Some(const.value)`, `Some(0.0)` becomes `None`, turning the pair
//! into a one-arm switch with a default. Second scan: fuses a block into its
//! default-target block when they share the same test expression, absorbing
//! the target's non-default edges (and its own default) directly into the
//! current block; a cond value already present on the current block keeps
//! its original edge. Runs while the CFG is still in SSA form, so absorbed
//! edges into a phi-bearing block gain a duplicate arm keyed on the new
//! predecessor rather than losing the old one.

use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg, Expr};
use crate::pass::{Pass, PassId};
use nodec_core::Op;

pub struct IfToSwitch;

impl Pass for IfToSwitch {
    fn id(&self) -> PassId {
        PassId::IfToSwitch
    }

    fn requires(&self) -> &[PassId] {
        &[PassId::ToSsa]
    }

    fn preserves(&self) -> Option<&[PassId]> {
        Some(&[PassId::ToSsa])
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        if_to_switch(cfg);
        Ok(())
    }
}

pub fn if_to_switch(cfg: &mut Cfg) {
    rewrite_equality_tests(cfg);
    fuse_default_chains(cfg);
}

/// If `test` is `Equal(const, other)` or `Equal(other, const)`, returns
/// `(const.value, other)`.
fn equality_split(test: &Expr) -> Option<(f64, Expr)> {
    let args = match test {
        Expr::PureOp(Op::Equal, args) | Expr::Op(Op::Equal, args) => args,
        _ => return None,
    };
    if args.len() != 2 {
        return None;
    }
    match (&args[0], &args[1]) {
        (Expr::Const(c), other) => Some((*c, other.clone())),
        (other, Expr::Const(c)) => Some((*c, other.clone())),
        _ => None,
    }
}

fn rewrite_equality_tests(cfg: &mut Cfg) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        let bb = cfg.block(b);
        if bb.succs.len() != 2 {
            continue;
        }
        let has_none = bb.none_edge().is_some();
        let has_zero = bb.edge_for_cond(0.0).is_some();
        if !has_none || !has_zero {
            continue;
        }
        let Some((c, other)) = equality_split(&bb.test) else {
            continue;
        };

        let bb = cfg.block_mut(b);
        bb.test = other;
        for e in bb.succs.iter_mut() {
            match e.cond {
                None => e.cond = Some(c),
                Some(v) if v.to_bits() == 0.0_f64.to_bits() => e.cond = None,
                _ => {}
            }
        }
    }
}

fn add_phi_arm_for_new_pred(cfg: &mut Cfg, dst: BlockId, from: BlockId, to: BlockId) {
    let bb = cfg.block_mut(dst);
    for arms in bb.phis.values_mut() {
        if let Some(src) = arms.get(&from).cloned() {
            arms.insert(to, src);
        }
    }
}

fn fuse_default_chains(cfg: &mut Cfg) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        loop {
            let Some(default_dst) = cfg.block(b).none_edge().map(|e| e.dst) else {
                break;
            };
            if default_dst == b {
                break;
            }
            if cfg.block(b).test != cfg.block(default_dst).test {
                break;
            }

            let d_edges = cfg.block(default_dst).succs.clone();

            for e in d_edges.iter().filter(|e| e.cond.is_some()) {
                let conflict = cfg
                    .block(b)
                    .succs
                    .iter()
                    .any(|be| be.cond.map(|c| c.to_bits()) == e.cond.map(|c| c.to_bits()));
                if conflict {
                    continue;
                }
                cfg.add_edge(b, e.dst, e.cond);
                add_phi_arm_for_new_pred(cfg, e.dst, default_dst, b);
            }

            cfg.remove_edge(b, default_dst);
            if let Some(new_default) = d_edges.iter().find(|e| e.cond.is_none()) {
                cfg.add_edge(b, new_default.dst, None);
                add_phi_arm_for_new_pred(cfg, new_default.dst, default_dst, b);
            }
        }
    }
}
