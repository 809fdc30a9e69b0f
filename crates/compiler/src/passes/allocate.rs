//! Allocation into the scratch region (section 4.15)
//!
//! Builds an interference graph over every temp that is still live after its
//! own definition, a temp absent from the graph never appears in any
//! `live_after` set anywhere, so it is genuinely dead and needs no slot
//! (this matters for the Minimal/Fast pipelines, which reach allocation
//! without ever running DCE). Two placement algorithms (`Fast`, `Standard`)
//! consume the same graph; both rewrite every surviving `Place::Temp` into
//! `Place::Block(SCRATCH_BLOCK_ID, offset, 0)` afterward. The post-placement
//! dead-store sweep reuses the interference pass's own `Liveness` and
//! `advanced_dce`'s rule directly rather than recomputing liveness a second
//! time.

use crate::analysis::{analyze_liveness, Liveness, StmtId};
use crate::error::{CompileError, CompileResult};
use crate::ir::{BlockId, Cfg};
use crate::pass::{Pass, PassId};
use crate::passes::dce::advanced_dce;
use nodec_core::{BlockPlace, Place, SCRATCH_BLOCK_ID, SCRATCH_CAPACITY};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct AllocateFast;

impl Pass for AllocateFast {
    fn id(&self) -> PassId {
        PassId::AllocateFast
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        allocate_fast(cfg)
    }
}

pub struct AllocateStandard;

impl Pass for AllocateStandard {
    fn id(&self) -> PassId {
        PassId::AllocateStandard
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        allocate_standard(cfg)
    }
}

struct Graph {
    sizes: HashMap<Rc<str>, u32>,
    interference: HashMap<Rc<str>, HashSet<Rc<str>>>,
    live_names: Vec<Rc<str>>,
}

fn build_graph(cfg: &Cfg, liveness: &Liveness) -> Graph {
    let mut sizes: HashMap<Rc<str>, u32> = HashMap::new();
    let mut interference: HashMap<Rc<str>, HashSet<Rc<str>>> = HashMap::new();
    let mut live_names: Vec<Rc<str>> = Vec::new();

    for b in cfg.live_ids() {
        for (i, stmt) in cfg.block(b).stmts.iter().enumerate() {
            let Some(Place::Temp(d)) = stmt.defined_place() else {
                continue;
            };
            sizes.entry(d.name.clone()).or_insert(d.size);

            let Some(live_after) = liveness.live.get(&StmtId(b, i)) else {
                continue;
            };
            if !live_after.contains(&Place::Temp(d.clone())) {
                continue;
            }
            if interference.entry(d.name.clone()).or_default().is_empty() {
                live_names.push(d.name.clone());
            }

            for q in live_after {
                if let Place::Temp(t) = q {
                    sizes.entry(t.name.clone()).or_insert(t.size);
                    if t.name == d.name {
                        continue;
                    }
                    interference.entry(d.name.clone()).or_default().insert(t.name.clone());
                    interference.entry(t.name.clone()).or_default().insert(d.name.clone());
                }
            }
        }
    }

    Graph {
        sizes,
        interference,
        live_names,
    }
}

/// Greedy: process in an arbitrary (first-definition-encountered) order;
/// place each temp at the highest end offset among its already-placed
/// interference neighbors.
fn place_fast(graph: &Graph) -> CompileResult<HashMap<Rc<str>, u32>> {
    let mut offset: HashMap<Rc<str>, u32> = HashMap::new();
    let mut end: HashMap<Rc<str>, u32> = HashMap::new();
    let empty = HashSet::new();

    for name in &graph.live_names {
        let neighbors = graph.interference.get(name).unwrap_or(&empty);
        let start = neighbors.iter().filter_map(|n| end.get(n)).copied().max().unwrap_or(0);
        let size = graph.sizes[name];
        let stop = start
            .checked_add(size)
            .ok_or(CompileError::ScratchExhausted { needed: u32::MAX, capacity: SCRATCH_CAPACITY })?;
        if stop > SCRATCH_CAPACITY {
            return Err(CompileError::ScratchExhausted { needed: stop, capacity: SCRATCH_CAPACITY });
        }
        offset.insert(name.clone(), start);
        end.insert(name.clone(), stop);
    }
    Ok(offset)
}

/// Best-fit: process in descending-size order; for each temp, scan its
/// already-placed interference neighbors sorted by end offset and take the
/// first gap big enough.
fn place_standard(graph: &Graph) -> CompileResult<HashMap<Rc<str>, u32>> {
    let mut order: Vec<Rc<str>> = graph.live_names.clone();
    order.sort_by(|a, b| graph.sizes[b].cmp(&graph.sizes[a]).then_with(|| a.cmp(b)));

    let mut offset: HashMap<Rc<str>, u32> = HashMap::new();
    let empty = HashSet::new();

    for name in &order {
        let size = graph.sizes[name];
        let neighbors = graph.interference.get(name).unwrap_or(&empty);
        let mut occupied: Vec<(u32, u32)> = neighbors
            .iter()
            .filter_map(|n| offset.get(n).map(|&start| (start, start + graph.sizes[n])))
            .collect();
        occupied.sort_by_key(|&(_, end)| end);

        let mut cursor = 0u32;
        let mut start = None;
        for (s, e) in occupied {
            if s >= cursor + size {
                start = Some(cursor);
                break;
            }
            cursor = cursor.max(e);
        }
        let start = start.unwrap_or(cursor);
        let stop = start
            .checked_add(size)
            .ok_or(CompileError::ScratchExhausted { needed: u32::MAX, capacity: SCRATCH_CAPACITY })?;
        if stop > SCRATCH_CAPACITY {
            return Err(CompileError::ScratchExhausted { needed: stop, capacity: SCRATCH_CAPACITY });
        }
        offset.insert(name.clone(), start);
    }
    Ok(offset)
}

fn rewrite_place(offsets: &HashMap<Rc<str>, u32>, p: &mut Place) {
    if let Place::Temp(t) = p {
        if let Some(&off) = offsets.get(&t.name) {
            *p = Place::Block(BlockPlace::new(SCRATCH_BLOCK_ID, off, 0));
        }
    }
}

fn apply_offsets(cfg: &mut Cfg, offsets: &HashMap<Rc<str>, u32>) {
    let ids: Vec<BlockId> = cfg.live_ids().collect();
    for b in ids {
        for i in 0..cfg.block(b).stmts.len() {
            if let Some(p) = cfg.block_mut(b).stmts[i].defined_place_mut() {
                rewrite_place(offsets, p);
            }
            cfg.block_mut(b).stmts[i].for_each_use_mut(&mut |p| rewrite_place(offsets, p));
        }
        let mut test = std::mem::replace(&mut cfg.block_mut(b).test, crate::ir::Expr::Const(0.0));
        test.for_each_use_mut(&mut |p| rewrite_place(offsets, p));
        cfg.block_mut(b).test = test;
    }
}

fn allocate_with(cfg: &mut Cfg, place: impl Fn(&Graph) -> CompileResult<HashMap<Rc<str>, u32>>) -> CompileResult<()> {
    let liveness = analyze_liveness(cfg)?;
    let graph = build_graph(cfg, &liveness);
    let offsets = place(&graph)?;
    advanced_dce(cfg, &liveness);
    apply_offsets(cfg, &offsets);
    Ok(())
}

pub fn allocate_fast(cfg: &mut Cfg) -> CompileResult<()> {
    allocate_with(cfg, place_fast)
}

pub fn allocate_standard(cfg: &mut Cfg) -> CompileResult<()> {
    allocate_with(cfg, place_standard)
}
