//! SSA construction (section 4.6)
//!
//! Placeholder phis go in at the iterated dominance frontier of each
//! scalar temp's definitions, keyed on the temp itself. A dominator-tree
//! recursive rename then turns those placeholders into versioned SSA
//! places and rewrites every use/def in program order. A use with no
//! version on the current path is replaced by the `("err", 0)` sentinel
//! (section 9 open question ii); this covers both ordinary uses and phi
//! arms contributed by a predecessor that never reaches a definition.

use crate::analysis::Dominance;
use crate::error::CompileResult;
use crate::ir::{BlockId, Cfg};
use crate::pass::{Pass, PassId};
use nodec_core::{Place, SsaPlace, TempPlace};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct ToSsa;

impl Pass for ToSsa {
    fn id(&self) -> PassId {
        PassId::ToSsa
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        to_ssa(cfg);
        Ok(())
    }
}

pub fn to_ssa(cfg: &mut Cfg) {
    let dom = Dominance::compute(cfg, cfg.entry);

    let defs_by_temp = collect_scalar_defs(cfg);
    let mut placeholders_by_block: HashMap<BlockId, Vec<Rc<str>>> = HashMap::new();
    let mut phi_key: HashMap<(BlockId, Rc<str>), Place> = HashMap::new();

    for (name, def_blocks) in &defs_by_temp {
        for block in iterated_df(&dom, def_blocks) {
            let key = Place::Temp(TempPlace::new(name.clone(), 1));
            if cfg
                .block_mut(block)
                .phis
                .insert(key.clone(), HashMap::new())
                .is_none()
            {
                placeholders_by_block
                    .entry(block)
                    .or_default()
                    .push(name.clone());
                phi_key.insert((block, name.clone()), key);
            }
        }
    }

    let mut stacks: HashMap<Rc<str>, Vec<Place>> = HashMap::new();
    let mut counters: HashMap<Rc<str>, u32> = HashMap::new();

    rename_block(
        cfg,
        &dom,
        cfg.entry,
        &placeholders_by_block,
        &mut phi_key,
        &mut stacks,
        &mut counters,
    );
}

fn collect_scalar_defs(cfg: &Cfg) -> HashMap<Rc<str>, HashSet<BlockId>> {
    let mut defs: HashMap<Rc<str>, HashSet<BlockId>> = HashMap::new();
    for id in cfg.live_ids().collect::<Vec<_>>() {
        for stmt in &cfg.block(id).stmts {
            if let Some(Place::Temp(t)) = stmt.defined_place() {
                if t.is_scalar() {
                    defs.entry(t.name.clone()).or_default().insert(id);
                }
            }
        }
    }
    defs
}

fn iterated_df(dom: &Dominance, def_blocks: &HashSet<BlockId>) -> HashSet<BlockId> {
    let mut df_final: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
    let mut processed: HashSet<BlockId> = HashSet::new();
    while let Some(b) = worklist.pop() {
        if !processed.insert(b) {
            continue;
        }
        if let Some(frontier) = dom.frontier.get(&b) {
            for &f in frontier {
                if df_final.insert(f) {
                    worklist.push(f);
                }
            }
        }
    }
    df_final
}

fn rewrite_scalar_use(p: &mut Place, stacks: &HashMap<Rc<str>, Vec<Place>>) {
    if let Place::Temp(t) = p {
        if t.is_scalar() {
            *p = stacks
                .get(&t.name)
                .and_then(|s| s.last())
                .cloned()
                .unwrap_or_else(|| Place::Ssa(SsaPlace::sentinel()));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rename_block(
    cfg: &mut Cfg,
    dom: &Dominance,
    block: BlockId,
    placeholders_by_block: &HashMap<BlockId, Vec<Rc<str>>>,
    phi_key: &mut HashMap<(BlockId, Rc<str>), Place>,
    stacks: &mut HashMap<Rc<str>, Vec<Place>>,
    counters: &mut HashMap<Rc<str>, u32>,
) {
    let mut pushed: Vec<Rc<str>> = Vec::new();

    if let Some(temps) = placeholders_by_block.get(&block).cloned() {
        for name in temps {
            let version = *counters.entry(name.clone()).or_insert(0);
            *counters.get_mut(&name).unwrap() += 1;
            let new_place = Place::Ssa(SsaPlace::new(name.clone(), version));

            let old_key = phi_key[&(block, name.clone())].clone();
            let arms = cfg.block_mut(block).phis.remove(&old_key).unwrap_or_default();
            cfg.block_mut(block).phis.insert(new_place.clone(), arms);
            phi_key.insert((block, name.clone()), new_place.clone());

            stacks.entry(name.clone()).or_default().push(new_place);
            pushed.push(name);
        }
    }

    for i in 0..cfg.block(block).stmts.len() {
        {
            let stacks_ref = &*stacks;
            cfg.block_mut(block).stmts[i]
                .for_each_use_mut(&mut |p| rewrite_scalar_use(p, stacks_ref));
        }
        let def_name = match cfg.block(block).stmts[i].defined_place() {
            Some(Place::Temp(t)) if t.is_scalar() => Some(t.name.clone()),
            _ => None,
        };
        if let Some(name) = def_name {
            let version = *counters.entry(name.clone()).or_insert(0);
            *counters.get_mut(&name).unwrap() += 1;
            let new_place = Place::Ssa(SsaPlace::new(name.clone(), version));
            if let Some(target) = cfg.block_mut(block).stmts[i].defined_place_mut() {
                *target = new_place.clone();
            }
            stacks.entry(name.clone()).or_default().push(new_place);
            pushed.push(name);
        }
    }

    {
        let mut test = std::mem::replace(&mut cfg.block_mut(block).test, crate::ir::Expr::Const(0.0));
        let stacks_ref = &*stacks;
        test.for_each_use_mut(&mut |p| rewrite_scalar_use(p, stacks_ref));
        cfg.block_mut(block).test = test;
    }

    let succs: Vec<BlockId> = cfg.block(block).succs.iter().map(|e| e.dst).collect();
    for s in succs {
        if let Some(temps) = placeholders_by_block.get(&s) {
            for name in temps.clone() {
                let key = phi_key[&(s, name.clone())].clone();
                let val = stacks
                    .get(&name)
                    .and_then(|v| v.last())
                    .cloned()
                    .unwrap_or_else(|| Place::Ssa(SsaPlace::sentinel()));
                cfg.block_mut(s)
                    .phis
                    .get_mut(&key)
                    .expect("placeholder phi must exist for its own block")
                    .insert(block, val);
            }
        }
    }

    let children = dom.children.get(&block).cloned().unwrap_or_default();
    for c in children {
        rename_block(cfg, dom, c, placeholders_by_block, phi_key, stacks, counters);
    }

    for name in pushed.into_iter().rev() {
        stacks.get_mut(&name).unwrap().pop();
    }
}
