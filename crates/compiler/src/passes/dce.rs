//! Dead-code elimination (section 4.12)
//!
//! Two variants share one deletion rule, drop a `Set` whose target is
//! unused/not live, keep its RHS alone as a bare statement when that RHS is
//! side-effecting, drop it outright otherwise, and differ only in how
//! "unused" is decided. Forward DCE seeds a use set from test expressions
//! and side-effecting statements and closes it transitively through defs
//! and phi arms, with no liveness analysis required. Advanced DCE instead
//! asks the already-computed [`Liveness`] whether the target is live
//! immediately after the store; `Place::Block` targets sit outside what
//! liveness tracks (section 4.8 scopes it to temps/SSA places), so advanced
//! DCE never touches them. Both variants drop the `Set(p, Get(p))`
//! self-copy unconditionally.

use crate::analysis::{analyze_liveness, Liveness, StmtId};
use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg, Expr};
use crate::pass::{Pass, PassId};
use nodec_core::Place;
use std::collections::{HashMap, HashSet, VecDeque};

pub struct Dce;

impl Pass for Dce {
    fn id(&self) -> PassId {
        PassId::Dce
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        forward_dce(cfg);
        Ok(())
    }
}

pub struct AdvancedDce;

impl Pass for AdvancedDce {
    fn id(&self) -> PassId {
        PassId::AdvancedDce
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        let liveness = analyze_liveness(cfg)?;
        advanced_dce(cfg, &liveness);
        Ok(())
    }
}

/// Whether `stmt`'s own value-producing part is side-effecting, i.e.
/// whether it must survive even with its target unused. For a `Set` this is
/// the RHS alone, not the assignment itself: an assignment is only as
/// observable as what it computes and where it lands.
fn rhs_has_side_effects(stmt: &Expr) -> bool {
    match stmt {
        Expr::Set(_, rhs) => rhs.has_side_effects(),
        other => other.has_side_effects(),
    }
}

fn seed(p: &Place, used: &mut HashSet<Place>, worklist: &mut VecDeque<Place>) {
    if used.insert(p.clone()) {
        worklist.push_back(p.clone());
    }
}

pub fn forward_dce(cfg: &mut Cfg) {
    let mut used: HashSet<Place> = HashSet::new();
    let mut worklist: VecDeque<Place> = VecDeque::new();

    let mut def_sites: HashMap<Place, Vec<(BlockId, usize)>> = HashMap::new();
    let mut phi_sources: HashMap<Place, Vec<Place>> = HashMap::new();

    for b in cfg.live_ids().collect::<Vec<_>>() {
        let bb = cfg.block(b);
        bb.test.for_each_use(&mut |p| seed(p, &mut used, &mut worklist));
        for (i, stmt) in bb.stmts.iter().enumerate() {
            if rhs_has_side_effects(stmt) {
                stmt.for_each_use(&mut |p| seed(p, &mut used, &mut worklist));
            }
            if let Some(p) = stmt.defined_place() {
                def_sites.entry(p.clone()).or_default().push((b, i));
            }
        }
        for (target, arms) in &bb.phis {
            phi_sources
                .entry(target.clone())
                .or_default()
                .extend(arms.values().cloned());
        }
    }

    while let Some(p) = worklist.pop_front() {
        if let Some(sites) = def_sites.get(&p) {
            for &(b, i) in sites {
                if let Expr::Set(_, rhs) = &cfg.block(b).stmts[i] {
                    rhs.for_each_use(&mut |u| seed(u, &mut used, &mut worklist));
                }
            }
        }
        if let Some(srcs) = phi_sources.get(&p).cloned() {
            for s in srcs {
                seed(&s, &mut used, &mut worklist);
            }
        }
    }

    for b in cfg.live_ids().collect::<Vec<_>>() {
        let stmts = std::mem::take(&mut cfg.block_mut(b).stmts);
        let mut new_stmts = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if stmt.is_self_copy() {
                continue;
            }
            match stmt {
                Expr::Set(p, rhs) => {
                    if used.contains(&p) {
                        new_stmts.push(Expr::Set(p, rhs));
                    } else if rhs.has_side_effects() {
                        new_stmts.push(*rhs);
                    }
                }
                other => new_stmts.push(other),
            }
        }
        cfg.block_mut(b).stmts = new_stmts;
    }
}

pub fn advanced_dce(cfg: &mut Cfg, liveness: &Liveness) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        let stmts = std::mem::take(&mut cfg.block_mut(b).stmts);
        let mut new_stmts = Vec::with_capacity(stmts.len());
        for (i, stmt) in stmts.into_iter().enumerate() {
            if stmt.is_self_copy() {
                continue;
            }
            match stmt {
                Expr::Set(p, rhs) => {
                    let alive = match &p {
                        Place::Block(_) => true,
                        _ => liveness.is_live_after(StmtId(b, i), &p),
                    };
                    if alive {
                        new_stmts.push(Expr::Set(p, rhs));
                    } else if rhs.has_side_effects() {
                        new_stmts.push(*rhs);
                    }
                }
                other => new_stmts.push(other),
            }
        }
        cfg.block_mut(b).stmts = new_stmts;
    }
}
