//! The control-flow graph (section 3 "Basic blocks", "Flow edges")
//!
//! Arena-and-index ownership (section 9 "Cyclic graph ownership"): blocks
//! are owned by one `Vec` inside `Cfg` and referenced everywhere else by the
//! stable index `BlockId`. No block ever borrows another; cycles in the
//! control-flow graph are just `BlockId` values pointing at each other,
//! never Rust references.

use crate::ir::expr::{Expr, Stmt};
use nodec_core::Place;
use std::collections::HashMap;

/// A stable index into `Cfg::blocks`. Never reused within a compilation
/// unit, even across block deletion (deleted blocks are left as unreachable
/// tombstones rather than renumbered); renumbering only happens once, in
/// linearization, which produces the final traversal order from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// An outgoing flow edge (section 3 "Flow edges"). `cond = None` is the
/// default/fallthrough arm; `Some(v)` selects the arm taken when the block's
/// test evaluates to exactly `v`.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub src: BlockId,
    pub dst: BlockId,
    pub cond: Option<f64>,
}

/// Bit-pattern equality for edge conditions, `Some(NaN) == Some(NaN)` must
/// hold for edge-condition bookkeeping, unlike IEEE float equality.
pub fn cond_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.to_bits() == y.to_bits(),
        _ => false,
    }
}

/// The incoming-edge map of one phi: which source place arrives from which
/// predecessor block (section 3). Keyed by `BlockId` so that flow coalescing
/// and SSA destruction can rewrite a single arm in place.
pub type PhiArms = HashMap<BlockId, Place>;

/// A basic block (section 3): phis, an ordered statement list, a branch test
/// expression, and its incoming/outgoing edges.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// `place -> (incoming_block -> source_place)`. Placeholder phis key on
    /// a `TempPlace` (inserted by `ToSSA`); after renaming they key on the
    /// `SsaPlace` the phi now defines.
    pub phis: HashMap<Place, PhiArms>,
    pub stmts: Vec<Stmt>,
    /// The expression evaluated to pick an outgoing edge. `Const(0)` for a
    /// block whose only successor is the unconditional `None` edge.
    pub test: Expr,
    pub preds: Vec<BlockId>,
    pub succs: Vec<Edge>,
}

impl BasicBlock {
    fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            phis: HashMap::new(),
            stmts: Vec::new(),
            test: Expr::Const(0.0),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn none_edge(&self) -> Option<&Edge> {
        self.succs.iter().find(|e| e.cond.is_none())
    }

    pub fn edge_for_cond(&self, v: f64) -> Option<&Edge> {
        self.succs
            .iter()
            .find(|e| e.cond.map(|c| c.to_bits() == v.to_bits()).unwrap_or(false))
    }

    /// Check the section-3 edge invariants for this block alone.
    pub fn check_edge_invariants(&self) -> Result<(), String> {
        let none_count = self.succs.iter().filter(|e| e.cond.is_none()).count();
        if none_count > 1 {
            return Err(format!("{}: more than one None-conditioned edge", self.id));
        }
        let mut seen_bits = Vec::new();
        for e in &self.succs {
            if let Some(c) = e.cond {
                let bits = c.to_bits();
                if seen_bits.contains(&bits) {
                    return Err(format!("{}: duplicate cond value {}", self.id, c));
                }
                seen_bits.push(bits);
            }
        }
        Ok(())
    }
}

/// The control-flow graph: an arena of blocks plus the entry point.
#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: Vec<Option<BasicBlock>>,
    pub entry: BlockId,
}

impl Cfg {
    /// A CFG with a single empty entry block.
    pub fn new() -> Self {
        let mut cfg = Cfg {
            blocks: Vec::new(),
            entry: BlockId(0),
        };
        let id = cfg.new_block();
        cfg.entry = id;
        cfg
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock::new(id)));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("{id} was deleted"))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("{id} was deleted"))
    }

    pub fn try_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(|b| b.as_ref())
    }

    /// Remove a block from the arena entirely. Only safe once all edges
    /// referencing it have been rewritten (unreachable-code elimination and
    /// flow coalescing both do this before calling).
    pub fn delete_block(&mut self, id: BlockId) {
        self.blocks[id.index()] = None;
    }

    pub fn is_deleted(&self, id: BlockId) -> bool {
        self.blocks[id.index()].is_none()
    }

    /// All block ids ever allocated, including deleted ones; callers
    /// filter with `try_block`/`is_deleted`.
    pub fn all_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(|i| BlockId(i as u32))
    }

    pub fn live_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.all_ids().filter(move |id| !self.is_deleted(*id))
    }

    /// Add an edge `src -> dst` with the given condition, updating both
    /// endpoints' edge lists.
    pub fn add_edge(&mut self, src: BlockId, dst: BlockId, cond: Option<f64>) {
        self.block_mut(src).succs.push(Edge { src, dst, cond });
        self.block_mut(dst).preds.push(src);
    }

    /// Remove every outgoing edge `src -> dst` (there should be at most one
    /// per the section-3 invariants, but this removes all matches
    /// defensively) and the matching predecessor entries on `dst`.
    pub fn remove_edge(&mut self, src: BlockId, dst: BlockId) {
        self.block_mut(src).succs.retain(|e| e.dst != dst);
        self.block_mut(dst).preds.retain(|&p| p != src);
    }

    /// Redirect every edge `_ -> from` to point at `to` instead, preserving
    /// conditions. Does not touch `to`'s phis; callers rewrite phi arm keys
    /// themselves, since the right rewrite is pass-specific (flow
    /// coalescing vs. SSA destruction disagree on what the new key should
    /// be).
    pub fn redirect_preds(&mut self, from: BlockId, to: BlockId) {
        let preds = self.block(from).preds.clone();
        for p in preds {
            let cond = {
                let pb = self.block_mut(p);
                let cond = pb.succs.iter().find(|e| e.dst == from).map(|e| e.cond);
                pb.succs.retain(|e| e.dst != from);
                cond
            };
            if let Some(cond) = cond {
                self.add_edge(p, to, cond);
            }
        }
        self.block_mut(from).preds.clear();
    }

    /// Walk every reachable block from `entry` via BFS, returning them in
    /// discovery order.
    pub fn reachable_from(&self, entry: BlockId) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(entry);
        visited[entry.index()] = true;
        while let Some(b) = queue.pop_front() {
            order.push(b);
            if let Some(bb) = self.try_block(b) {
                for e in &bb.succs {
                    if !visited[e.dst.index()] {
                        visited[e.dst.index()] = true;
                        queue.push_back(e.dst);
                    }
                }
            }
        }
        order
    }

    pub fn reachable(&self) -> Vec<BlockId> {
        self.reachable_from(self.entry)
    }

    /// Validate the section-3 edge invariants over every live block.
    pub fn check_invariants(&self) -> Result<(), String> {
        for id in self.live_ids() {
            self.block(id).check_edge_invariants()?;
        }
        Ok(())
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg::new()
    }
}
