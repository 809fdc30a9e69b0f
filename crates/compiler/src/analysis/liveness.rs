//! Liveness analysis (section 4.8)
//!
//! A backward dataflow pass over temp blocks and SSA places. Annotations
//! live in a side-table keyed by [`StmtId`] rather than on the statement
//! itself (section 9 "Per-statement annotations"), since SSA and DCE both
//! rewrite statements in place and would otherwise lose them.
//!
//! Array stores do not fully kill the array they write, section 4.8's
//! array-init refinement recovers precision for the common "overwritten
//! before any read" pattern (the literal scenario in section 8, S6) via a
//! local, in-block must-supersede check: an array store is prunable when
//! it is the first contribution to its temp on this path (`is_array_init`)
//! and a later store to the same temp, with no intervening read, already
//! occupies the slot. This is intentionally scoped to within one block;
//! cross-block array liveness stays conservative (non-killing).

use crate::error::{CompileError, CompileResult};
use crate::ir::{BlockId, Cfg};
use nodec_core::Place;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A statement's identity for annotation purposes only: valid for exactly
/// one compute-then-consume window, never a long-lived handle (section 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub BlockId, pub usize);

#[derive(Debug, Clone)]
pub struct Liveness {
    /// The set of places live immediately *after* each statement.
    pub live: HashMap<StmtId, HashSet<Place>>,
    pub live_in: HashMap<BlockId, HashSet<Place>>,
    pub live_out: HashMap<BlockId, HashSet<Place>>,
    pub array_defs_in: HashMap<BlockId, HashSet<Rc<str>>>,
    pub array_defs_out: HashMap<BlockId, HashSet<Rc<str>>>,
    pub is_array_init: HashSet<StmtId>,
}

impl Liveness {
    /// Whether `p` is live immediately after the statement at `id`.
    /// Statements never annotated (e.g. outside the analyzed CFG) are
    /// conservatively treated as making nothing live.
    pub fn is_live_after(&self, id: StmtId, p: &Place) -> bool {
        self.live.get(&id).is_some_and(|s| s.contains(p))
    }
}

fn is_tracked(p: &Place) -> bool {
    matches!(p, Place::Temp(_) | Place::Ssa(_))
}

pub fn analyze(cfg: &Cfg) -> CompileResult<Liveness> {
    let reachable = cfg.reachable();
    if !reachable.iter().any(|&b| cfg.block(b).is_terminator()) {
        return Err(CompileError::InfiniteLoop);
    }
    let reachable_set: HashSet<BlockId> = reachable.iter().copied().collect();

    let (array_defs_in, array_defs_out) = forward_array_defs(cfg, &reachable);

    let mut live_out: HashMap<BlockId, HashSet<Place>> =
        reachable.iter().map(|&b| (b, HashSet::new())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in reachable.iter().rev() {
            let live_in_b = block_live_in(cfg, b, &live_out);
            for &p in &cfg.block(b).preds {
                if !reachable_set.contains(&p) {
                    continue;
                }
                let out = live_out.get_mut(&p).unwrap();
                for item in &live_in_b {
                    if out.insert(item.clone()) {
                        changed = true;
                    }
                }
            }
            for arms in cfg.block(b).phis.values() {
                for (&pred, src) in arms {
                    if !reachable_set.contains(&pred) || !is_tracked(src) {
                        continue;
                    }
                    if live_out.get_mut(&pred).unwrap().insert(src.clone()) {
                        changed = true;
                    }
                }
            }
        }
    }

    let mut live: HashMap<StmtId, HashSet<Place>> = HashMap::new();
    let mut live_in: HashMap<BlockId, HashSet<Place>> = HashMap::new();
    let mut is_array_init: HashSet<StmtId> = HashSet::new();

    for &b in &reachable {
        let bb = cfg.block(b);
        let mut current = live_out[&b].clone();
        bb.test.for_each_use(&mut |p| {
            if is_tracked(p) {
                current.insert(p.clone());
            }
        });

        let mut forward_local = array_defs_in.get(&b).cloned().unwrap_or_default();
        let mut local_before: Vec<HashSet<Rc<str>>> = Vec::with_capacity(bb.stmts.len());
        for stmt in &bb.stmts {
            local_before.push(forward_local.clone());
            if let Some(Place::Temp(t)) = stmt.defined_place() {
                if !t.is_scalar() {
                    forward_local.insert(t.name.clone());
                }
            }
        }

        let mut superseded: HashSet<Place> = HashSet::new();
        for i in (0..bb.stmts.len()).rev() {
            let stmt = &bb.stmts[i];
            let id = StmtId(b, i);

            if let Some(Place::Temp(t)) = stmt.defined_place() {
                if !t.is_scalar() {
                    let key = Place::Temp(t.clone());
                    let is_init = !local_before[i].contains(&t.name);
                    if is_init {
                        is_array_init.insert(id);
                        if superseded.contains(&key) {
                            current.remove(&key);
                        }
                    }
                }
            }

            live.insert(id, current.clone());

            match stmt.defined_place() {
                Some(Place::Temp(t)) if !t.is_scalar() => {
                    superseded.insert(Place::Temp(t.clone()));
                }
                Some(p) if is_tracked(p) => {
                    current.remove(p);
                }
                _ => {}
            }

            let mut uses = HashSet::new();
            stmt.for_each_use(&mut |p| {
                if is_tracked(p) {
                    uses.insert(p.clone());
                    if let Place::Temp(t) = p {
                        if !t.is_scalar() {
                            superseded.remove(&Place::Temp(t.clone()));
                        }
                    }
                }
            });
            current.extend(uses);
        }
        live_in.insert(b, current);
    }

    Ok(Liveness {
        live,
        live_in,
        live_out,
        array_defs_in,
        array_defs_out,
        is_array_init,
    })
}

fn block_live_in(
    cfg: &Cfg,
    b: BlockId,
    live_out: &HashMap<BlockId, HashSet<Place>>,
) -> HashSet<Place> {
    let bb = cfg.block(b);
    let mut current = live_out[&b].clone();
    bb.test.for_each_use(&mut |p| {
        if is_tracked(p) {
            current.insert(p.clone());
        }
    });
    for stmt in bb.stmts.iter().rev() {
        match stmt.defined_place() {
            Some(Place::Temp(t)) if !t.is_scalar() => {}
            Some(p) if is_tracked(p) => {
                current.remove(p);
            }
            _ => {}
        }
        stmt.for_each_use(&mut |p| {
            if is_tracked(p) {
                current.insert(p.clone());
            }
        });
    }
    for target in bb.phis.keys() {
        current.remove(target);
    }
    current
}

fn forward_array_defs(
    cfg: &Cfg,
    reachable: &[BlockId],
) -> (
    HashMap<BlockId, HashSet<Rc<str>>>,
    HashMap<BlockId, HashSet<Rc<str>>>,
) {
    let mut din: HashMap<BlockId, HashSet<Rc<str>>> =
        reachable.iter().map(|&b| (b, HashSet::new())).collect();
    let mut dout: HashMap<BlockId, HashSet<Rc<str>>> =
        reachable.iter().map(|&b| (b, HashSet::new())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in reachable {
            let mut new_in = HashSet::new();
            for &p in &cfg.block(b).preds {
                if let Some(s) = dout.get(&p) {
                    new_in.extend(s.iter().cloned());
                }
            }
            if new_in != din[&b] {
                din.insert(b, new_in);
                changed = true;
            }
            let mut new_out = din[&b].clone();
            for stmt in &cfg.block(b).stmts {
                if let Some(Place::Temp(t)) = stmt.defined_place() {
                    if !t.is_scalar() {
                        new_out.insert(t.name.clone());
                    }
                }
            }
            if new_out != dout[&b] {
                dout.insert(b, new_out);
                changed = true;
            }
        }
    }
    (din, dout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;
    use nodec_core::TempPlace;

    fn temp(name: &str, size: u32) -> Place {
        Place::Temp(TempPlace::new(name, size))
    }

    #[test]
    fn rejects_cfg_with_no_reachable_exit() {
        let mut cfg = Cfg::new();
        let b = cfg.new_block();
        cfg.add_edge(cfg.entry, b, None);
        cfg.add_edge(b, cfg.entry, None);
        assert_eq!(analyze(&cfg).unwrap_err(), CompileError::InfiniteLoop);
    }

    #[test]
    fn used_place_is_live_at_its_use() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("x", 1), Expr::Const(1.0)));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(temp("y", 1), Expr::get(temp("x", 1))));

        let live = analyze(&cfg).unwrap();
        let after_first = &live.live[&StmtId(cfg.entry, 0)];
        assert!(after_first.contains(&temp("x", 1)));
    }

    #[test]
    fn dead_scalar_store_is_not_live() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("dead", 1), Expr::Const(1.0)));

        let live = analyze(&cfg).unwrap();
        assert!(!live.live[&StmtId(cfg.entry, 0)].contains(&temp("dead", 1)));
    }

    #[test]
    fn superseded_array_init_is_pruned() {
        // S6: first store to a size-4 temp, overwritten by a second store,
        // with the first store's contribution never read.
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("arr", 4), Expr::Const(1.0)));
        cfg.block_mut(cfg.entry).stmts.push(Expr::set(temp("arr", 4), Expr::Const(2.0)));
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(temp("out", 1), Expr::get(temp("arr", 4))));

        let live = analyze(&cfg).unwrap();
        assert!(is_array_init_of(&live, cfg.entry, 0));
        assert!(!is_array_init_of(&live, cfg.entry, 1));
        assert!(!live.live[&StmtId(cfg.entry, 0)].contains(&temp("arr", 4)));
        assert!(live.live[&StmtId(cfg.entry, 1)].contains(&temp("arr", 4)));
    }

    fn is_array_init_of(live: &Liveness, b: BlockId, i: usize) -> bool {
        live.is_array_init.contains(&StmtId(b, i))
    }
}
