//! Linearization to the engine node tree (section 4.16)
//!
//! Numbers reachable blocks in reverse-postorder (the same traversal
//! [`Dominance`] already computes), lowers each block's statements and
//! terminator into the node tree, and wraps the per-block array in
//! `JumpLoop(..., Const(0))` inside `Block(...)`. Node-tree DAG
//! deduplication (section 4.16) is the [`NodeTreeBuilder`]'s job, not this
//! module's, every `value`/`op` call here already shares structurally
//! identical nodes.

use crate::analysis::Dominance;
use crate::error::{CompileError, CompileResult};
use crate::ir::{BlockId, Cfg, Expr};
use nodec_core::{NodeTree, NodeTreeBuilder, Op, Place};
use std::collections::HashMap;

pub fn linearize(cfg: &Cfg) -> CompileResult<NodeTree> {
    let order = Dominance::compute(cfg, cfg.entry).rpo_order;
    let n_blocks = order.len() as u32;
    let index_of: HashMap<BlockId, u32> = order.iter().enumerate().map(|(i, &b)| (b, i as u32)).collect();

    let mut builder = NodeTreeBuilder::new();
    let mut block_roots = Vec::with_capacity(order.len());

    for &b in &order {
        let bb = cfg.block(b);
        let mut stmt_nodes = Vec::with_capacity(bb.stmts.len());
        for stmt in &bb.stmts {
            stmt_nodes.push(lower_expr(&mut builder, stmt)?);
        }
        let terminator = lower_terminator(&mut builder, cfg, b, &index_of, n_blocks)?;
        let block_node = if stmt_nodes.is_empty() {
            terminator
        } else {
            stmt_nodes.push(terminator);
            builder.op(Op::Execute, stmt_nodes)
        };
        block_roots.push(block_node);
    }

    let zero = builder.value(0.0);
    let mut loop_args = block_roots;
    loop_args.push(zero);
    let jump_loop = builder.op(Op::JumpLoop, loop_args);
    let root = builder.op(Op::Block, vec![jump_loop]);

    Ok(builder.finish(root))
}

fn lower_expr(builder: &mut NodeTreeBuilder, expr: &Expr) -> CompileResult<u32> {
    match expr {
        Expr::Const(v) => Ok(builder.value(*v)),
        Expr::Get(p) => {
            let (block_id, cell) = block_place_args(p)?;
            let block_id = builder.value(block_id as f64);
            let cell = builder.value(cell as f64);
            Ok(builder.op(Op::Get, vec![block_id, cell]))
        }
        Expr::Set(p, rhs) => {
            let value = lower_expr(builder, rhs)?;
            let (block_id, cell) = block_place_args(p)?;
            let block_id = builder.value(block_id as f64);
            let cell = builder.value(cell as f64);
            Ok(builder.op(Op::Set, vec![block_id, cell, value]))
        }
        Expr::PureOp(op, args) | Expr::Op(op, args) => {
            let mut idxs = Vec::with_capacity(args.len());
            for a in args {
                idxs.push(lower_expr(builder, a)?);
            }
            Ok(builder.op(*op, idxs))
        }
    }
}

fn block_place_args(p: &Place) -> CompileResult<(u32, u32)> {
    match p {
        Place::Block(bp) => Ok((bp.block_id, bp.cell())),
        other => Err(CompileError::UnexpectedIrShape(format!(
            "place {other:?} survived to linearization; allocation should have resolved every temp"
        ))),
    }
}

fn block_index(index_of: &HashMap<BlockId, u32>, id: BlockId) -> CompileResult<u32> {
    index_of
        .get(&id)
        .copied()
        .ok_or_else(|| CompileError::UnexpectedIrShape(format!("edge target {id:?} is unreachable from entry")))
}

fn cond_is(cond: Option<f64>, v: f64) -> bool {
    cond.is_some_and(|c| c.to_bits() == v.to_bits())
}

fn lower_terminator(
    builder: &mut NodeTreeBuilder,
    cfg: &Cfg,
    b: BlockId,
    index_of: &HashMap<BlockId, u32>,
    n_blocks: u32,
) -> CompileResult<u32> {
    let bb = cfg.block(b);

    if bb.succs.is_empty() {
        return Ok(builder.value(n_blocks as f64));
    }
    if bb.succs.len() == 1 && bb.succs[0].cond.is_none() {
        let idx = block_index(index_of, bb.succs[0].dst)?;
        return Ok(builder.value(idx as f64));
    }
    if bb.succs.len() == 2 {
        let none_e = bb.succs.iter().find(|e| e.cond.is_none());
        let zero_e = bb.succs.iter().find(|e| cond_is(e.cond, 0.0));
        if let (Some(none_e), Some(zero_e)) = (none_e, zero_e) {
            let test = lower_expr(builder, &bb.test)?;
            let none_idx = builder.value(block_index(index_of, none_e.dst)? as f64);
            let zero_idx = builder.value(block_index(index_of, zero_e.dst)? as f64);
            return Ok(builder.op(Op::If, vec![test, none_idx, zero_idx]));
        }
    }

    let test = lower_expr(builder, &bb.test)?;
    let mut args = vec![test];
    for e in bb.succs.iter().filter(|e| e.cond.is_some()) {
        args.push(builder.value(e.cond.unwrap()));
        args.push(builder.value(block_index(index_of, e.dst)? as f64));
    }
    let default_idx = match bb.succs.iter().find(|e| e.cond.is_none()) {
        Some(e) => block_index(index_of, e.dst)?,
        None => n_blocks,
    };
    args.push(builder.value(default_idx as f64));
    Ok(builder.op(Op::SwitchWithDefault, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodec_core::{BlockPlace, Node};

    fn block_get(block_id: u32, index: u32) -> Expr {
        Expr::get(Place::Block(BlockPlace::new(block_id, index, 0)))
    }

    fn block_set(block_id: u32, index: u32, v: Expr) -> Expr {
        Expr::set(Place::Block(BlockPlace::new(block_id, index, 0)), v)
    }

    #[test]
    fn no_successor_terminates_with_sentinel() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry).stmts.push(block_set(1, 0, Expr::Const(3.0)));
        cfg.block_mut(cfg.entry).test = Expr::Const(1.0);

        let tree = linearize(&cfg).unwrap();
        let Node::Op { func, args } = tree.get(tree.root).unwrap() else {
            panic!("root is not an op node");
        };
        assert_eq!(*func, Op::Block as u16);
        let Node::Op { func: jl_func, args: jl_args } = tree.get(args[0]).unwrap() else {
            panic!("expected JumpLoop under Block");
        };
        assert_eq!(*jl_func, Op::JumpLoop as u16);
        // one block + trailing Const(0)
        assert_eq!(jl_args.len(), 2);
    }

    #[test]
    fn single_none_successor_lowers_to_target_index_constant() {
        let mut cfg = Cfg::new();
        let next = cfg.new_block();
        cfg.add_edge(cfg.entry, next, None);
        cfg.block_mut(cfg.entry).test = Expr::Const(0.0);
        cfg.block_mut(next).test = Expr::Const(1.0);

        let tree = linearize(&cfg).unwrap();
        let Node::Op { args, .. } = tree.get(tree.root).unwrap() else { unreachable!() };
        let Node::Op { args: jl_args, .. } = tree.get(args[0]).unwrap() else { unreachable!() };
        // entry block's body is just its terminator: Const(index(next)) == Const(1.0)
        assert_eq!(tree.get(jl_args[0]), Some(&Node::value(1.0)));
    }

    #[test]
    fn two_way_zero_none_branch_lowers_to_if() {
        let mut cfg = Cfg::new();
        let a = cfg.new_block();
        let b = cfg.new_block();
        cfg.block_mut(cfg.entry).test = block_get(2, 0);
        cfg.add_edge(cfg.entry, a, Some(0.0));
        cfg.add_edge(cfg.entry, b, None);
        cfg.block_mut(a).test = Expr::Const(1.0);
        cfg.block_mut(b).test = Expr::Const(1.0);

        let tree = linearize(&cfg).unwrap();
        let Node::Op { args, .. } = tree.get(tree.root).unwrap() else { unreachable!() };
        let Node::Op { args: jl_args, .. } = tree.get(args[0]).unwrap() else { unreachable!() };
        let Node::Op { func, .. } = tree.get(jl_args[0]).unwrap() else {
            panic!("expected entry body to be an op node");
        };
        assert_eq!(*func, Op::If as u16);
    }

    #[test]
    fn temp_place_surviving_to_linearization_is_an_error() {
        let mut cfg = Cfg::new();
        cfg.block_mut(cfg.entry)
            .stmts
            .push(Expr::set(nodec_core::TempPlace::new("t", 1), Expr::Const(1.0)));
        cfg.block_mut(cfg.entry).test = Expr::Const(1.0);

        assert!(matches!(linearize(&cfg), Err(CompileError::UnexpectedIrShape(_))));
    }
}
