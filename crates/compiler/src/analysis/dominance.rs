//! Dominance (section 4.5)
//!
//! Reverse-postorder numbering over reachable blocks, the classic
//! Cooper/Harvey/Kennedy iterative dominator algorithm, and dominance
//! frontiers derived from it. This is a read-only analysis, not a
//! CFG-mutating pass. `ToSsa` and any future consumer calls `Dominance::compute`
//! fresh each time it needs it, since nothing downstream preserves it across
//! an edge-mutating pass.

use crate::ir::{BlockId, Cfg};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Dominance {
    /// Reverse-postorder number of each reachable block (lower = earlier).
    pub rpo_number: HashMap<BlockId, usize>,
    pub rpo_order: Vec<BlockId>,
    pub idom: HashMap<BlockId, BlockId>,
    pub children: HashMap<BlockId, Vec<BlockId>>,
    pub frontier: HashMap<BlockId, HashSet<BlockId>>,
}

impl Dominance {
    pub fn compute(cfg: &Cfg, entry: BlockId) -> Dominance {
        let rpo_order = reverse_postorder(cfg, entry);
        let rpo_number: HashMap<BlockId, usize> = rpo_order
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i))
            .collect();

        let idom = compute_idom(cfg, entry, &rpo_order, &rpo_number);
        let children = dominator_tree_children(&idom, entry);
        let frontier = dominance_frontiers(cfg, &rpo_order, &idom);

        Dominance {
            rpo_number,
            rpo_order,
            idom,
            children,
            frontier,
        }
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&id) = self.idom.get(&cur) {
            if id == cur {
                break; // entry's idom is itself
            }
            if id == a {
                return true;
            }
            cur = id;
        }
        false
    }
}

fn reverse_postorder(cfg: &Cfg, entry: BlockId) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    fn visit(
        cfg: &Cfg,
        id: BlockId,
        visited: &mut HashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        if let Some(bb) = cfg.try_block(id) {
            for e in &bb.succs {
                visit(cfg, e.dst, visited, postorder);
            }
        }
        postorder.push(id);
    }
    visit(cfg, entry, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

fn compute_idom(
    cfg: &Cfg,
    entry: BlockId,
    rpo_order: &[BlockId],
    rpo_number: &HashMap<BlockId, usize>,
) -> HashMap<BlockId, BlockId> {
    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo_order {
            if b == entry {
                continue;
            }
            let preds = &cfg.block(b).preds;
            let mut new_idom: Option<BlockId> = None;
            for &p in preds {
                if !rpo_number.contains_key(&p) || !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, rpo_number),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }
    idom
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_number: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while rpo_number[&a] > rpo_number[&b] {
            a = idom[&a];
        }
        while rpo_number[&b] > rpo_number[&a] {
            b = idom[&b];
        }
    }
    a
}

fn dominator_tree_children(
    idom: &HashMap<BlockId, BlockId>,
    entry: BlockId,
) -> HashMap<BlockId, Vec<BlockId>> {
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&b, &d) in idom {
        if b != entry {
            children.entry(d).or_default().push(b);
        }
    }
    children
}

fn dominance_frontiers(
    cfg: &Cfg,
    rpo_order: &[BlockId],
    idom: &HashMap<BlockId, BlockId>,
) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut df: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &b in rpo_order {
        df.entry(b).or_default();
    }
    for &b in rpo_order {
        let preds = &cfg.block(b).preds;
        if preds.len() < 2 {
            continue;
        }
        for &p in preds {
            if !idom.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while Some(&runner) != idom.get(&b) {
                df.entry(runner).or_default().insert(b);
                let next = idom[&runner];
                if next == runner {
                    break; // reached entry without finding b's idom; stop.
                }
                runner = next;
            }
        }
    }
    df
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;

    #[test]
    fn diamond_join_dominated_by_entry() {
        // entry -> a -> join, entry -> b -> join
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        let join = cfg.new_block();
        cfg.add_edge(cfg.entry, a, None);
        cfg.add_edge(cfg.entry, b, Some(0.0));
        cfg.add_edge(a, join, None);
        cfg.add_edge(b, join, None);

        let dom = Dominance::compute(&cfg, cfg.entry);
        assert_eq!(dom.idom[&join], cfg.entry);
        assert!(dom.dominates(cfg.entry, join));
        assert!(!dom.dominates(a, join));
    }

    #[test]
    fn diamond_join_is_in_frontier_of_both_branches() {
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        let join = cfg.new_block();
        cfg.add_edge(cfg.entry, a, None);
        cfg.add_edge(cfg.entry, b, Some(0.0));
        cfg.add_edge(a, join, None);
        cfg.add_edge(b, join, None);

        let dom = Dominance::compute(&cfg, cfg.entry);
        assert!(dom.frontier[&a].contains(&join));
        assert!(dom.frontier[&b].contains(&join));
        assert!(dom.frontier[&cfg.entry].is_empty());
    }

    #[test]
    fn linear_chain_has_empty_frontiers() {
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        cfg.add_edge(cfg.entry, a, None);
        cfg.add_edge(a, b, None);

        let dom = Dominance::compute(&cfg, cfg.entry);
        assert!(dom.frontier.values().all(|s| s.is_empty()));
        assert_eq!(dom.idom[&b], a);
        assert_eq!(dom.idom[&a], cfg.entry);
    }

    #[test]
    fn loop_header_is_its_own_frontier() {
        // entry -> header -> body -> header, header -> exit
        let mut cfg = Cfg::new();
        let header = cfg.new_block();
        let body = cfg.new_block();
        let exit = cfg.new_block();
        cfg.add_edge(cfg.entry, header, None);
        cfg.add_edge(header, body, None);
        cfg.add_edge(body, header, Some(0.0));
        cfg.add_edge(header, exit, Some(1.0));

        let dom = Dominance::compute(&cfg, cfg.entry);
        assert!(dom.frontier[&body].contains(&header));
    }
}
