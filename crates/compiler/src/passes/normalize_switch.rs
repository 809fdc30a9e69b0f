//! Switch normalization
//!
//! Runs late in the standard pipeline, after if-to-switch fusion, SSA
//! destruction, and copy coalescing have all had a chance to add or
//! reorder edges. Canonicalizes every block's outgoing-edge order to
//! ascending `cond` value with the `None`/default edge last, so
//! linearization (section 4.16) emits `SwitchWithDefault` argument lists in
//! a deterministic order independent of the order fusions happened to
//! insert edges in; the node-tree DAG dedup downstream depends on
//! structurally identical switches producing identical node sequences.

use crate::error::CompileResult;
use crate::ir::Cfg;
use crate::pass::{Pass, PassId};

pub struct NormalizeSwitch;

impl Pass for NormalizeSwitch {
    fn id(&self) -> PassId {
        PassId::NormalizeSwitch
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()> {
        normalize_switch(cfg);
        Ok(())
    }
}

pub fn normalize_switch(cfg: &mut Cfg) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        cfg.block_mut(b)
            .succs
            .sort_by(|a, b| match (a.cond, b.cond) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(x), Some(y)) => x.total_cmp(&y),
            });
    }
}
