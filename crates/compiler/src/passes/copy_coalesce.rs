//! Copy coalescing (section 4.14)
//!
//! A linear-scan style coalescer over size-1 temps, run after `FromSSA` has
//! turned every phi into plain copies. Builds an interference graph (two
//! scalar temps interfere if both are live immediately after the same `Set`,
//! excluding the copy's own source/target pair) and a copy graph (`Set(t,
//! Get(s))` records a bidirectional copy edge). For each copy edge whose
//! endpoints' current union-find groups don't interfere, unions the groups;
//! afterward every scalar temp remaps to its group's canonical
//! representative, chosen as the lexicographically minimal temp name.

use crate::analysis::{Liveness, StmtId};
use crate::error::CompileResult;
use crate::ir::{Cfg, Expr};
use crate::pass::{Pass, PassId};
use nodec_core::Place;
use std::collections::{HashMap, HashSet};

pub struct CopyCoalesce;

impl Pass for CopyCoalesce {
    fn id(&self) -> PassId {
        PassId::CopyCoalesce
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        let liveness = crate::analysis::analyze_liveness(cfg)?;
        copy_coalesce(cfg, &liveness);
        Ok(())
    }
}

fn is_scalar_temp(p: &Place) -> bool {
    matches!(p, Place::Temp(t) if t.is_scalar())
}

struct UnionFind {
    parent: HashMap<Place, Place>,
    members: HashMap<Place, Vec<Place>>,
}

impl UnionFind {
    fn new(places: impl Iterator<Item = Place>) -> Self {
        let mut parent = HashMap::new();
        let mut members = HashMap::new();
        for p in places {
            parent.entry(p.clone()).or_insert_with(|| p.clone());
            members.entry(p.clone()).or_insert_with(|| vec![p.clone()]);
        }
        UnionFind { parent, members }
    }

    fn find(&mut self, p: &Place) -> Place {
        let mut root = p.clone();
        loop {
            let par = self.parent.get(&root).cloned().unwrap_or_else(|| root.clone());
            if par == root {
                break;
            }
            root = par;
        }
        let mut cur = p.clone();
        while cur != root {
            let next = self.parent.get(&cur).cloned().unwrap_or_else(|| cur.clone());
            self.parent.insert(cur, root.clone());
            cur = next;
        }
        root
    }

    fn temp_name(p: &Place) -> std::rc::Rc<str> {
        p.as_temp().map(|t| t.name.clone()).unwrap_or_else(|| "".into())
    }

    fn union(&mut self, ra: &Place, rb: &Place) {
        let (keep, drop) = if Self::temp_name(ra) <= Self::temp_name(rb) {
            (ra.clone(), rb.clone())
        } else {
            (rb.clone(), ra.clone())
        };
        let dropped_members = self.members.remove(&drop).unwrap_or_default();
        for m in &dropped_members {
            self.parent.insert(m.clone(), keep.clone());
        }
        self.members.entry(keep.clone()).or_default().extend(dropped_members);
        self.parent.insert(drop, keep);
    }

    fn groups_interfere(&self, interference: &HashMap<Place, HashSet<Place>>, ra: &Place, rb: &Place) -> bool {
        let empty = Vec::new();
        let ma = self.members.get(ra).unwrap_or(&empty);
        let mb = self.members.get(rb).unwrap_or(&empty);
        ma.iter().any(|x| {
            interference
                .get(x)
                .is_some_and(|adj| mb.iter().any(|y| adj.contains(y)))
        })
    }
}

fn build_interference(cfg: &Cfg, liveness: &Liveness) -> HashMap<Place, HashSet<Place>> {
    let mut graph: HashMap<Place, HashSet<Place>> = HashMap::new();
    for b in cfg.live_ids() {
        for (i, stmt) in cfg.block(b).stmts.iter().enumerate() {
            let Expr::Set(d, rhs) = stmt else { continue };
            if !is_scalar_temp(d) {
                continue;
            }
            let copy_src = match rhs.as_ref() {
                Expr::Get(s) if is_scalar_temp(s) => Some(s.clone()),
                _ => None,
            };
            let Some(live_after) = liveness.live.get(&StmtId(b, i)) else {
                continue;
            };
            for q in live_after {
                if q == d || !is_scalar_temp(q) || copy_src.as_ref() == Some(q) {
                    continue;
                }
                graph.entry(d.clone()).or_default().insert(q.clone());
                graph.entry(q.clone()).or_default().insert(d.clone());
            }
        }
    }
    graph
}

fn collect_copy_edges(cfg: &Cfg) -> Vec<(Place, Place)> {
    let mut edges = Vec::new();
    for b in cfg.live_ids() {
        for stmt in &cfg.block(b).stmts {
            if let Expr::Set(d, rhs) = stmt {
                if is_scalar_temp(d) {
                    if let Expr::Get(s) = rhs.as_ref() {
                        if is_scalar_temp(s) {
                            edges.push((d.clone(), s.clone()));
                        }
                    }
                }
            }
        }
    }
    edges
}

fn rewrite_place(remap: &HashMap<Place, Place>, p: &mut Place) {
    if let Some(r) = remap.get(p) {
        *p = r.clone();
    }
}

pub fn copy_coalesce(cfg: &mut Cfg, liveness: &Liveness) {
    let interference = build_interference(cfg, liveness);
    let copies = collect_copy_edges(cfg);

    let all_temps: HashSet<Place> = interference
        .keys()
        .cloned()
        .chain(copies.iter().flat_map(|(t, s)| [t.clone(), s.clone()]))
        .collect();
    let mut uf = UnionFind::new(all_temps.into_iter());

    for (t, s) in &copies {
        let rt = uf.find(t);
        let rs = uf.find(s);
        if rt == rs {
            continue;
        }
        if !uf.groups_interfere(&interference, &rt, &rs) {
            uf.union(&rt, &rs);
        }
    }

    let keys: Vec<Place> = uf.parent.keys().cloned().collect();
    let remap: HashMap<Place, Place> = keys.into_iter().map(|p| {
        let r = uf.find(&p);
        (p, r)
    }).collect();

    for b in cfg.live_ids().collect::<Vec<_>>() {
        for i in 0..cfg.block(b).stmts.len() {
            if let Some(p) = cfg.block_mut(b).stmts[i].defined_place_mut() {
                rewrite_place(&remap, p);
            }
            cfg.block_mut(b).stmts[i].for_each_use_mut(&mut |p| rewrite_place(&remap, p));
        }
        let mut test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
        test.for_each_use_mut(&mut |p| rewrite_place(&remap, p));
        cfg.block_mut(b).test = test;
    }
}
