//! Reference interpreter (section 4.17)
//!
//! A faithful, unoptimized evaluator of a compiled [`NodeTree`]. Exists for
//! testing: it lets the compiler's test suite assert on the *meaning* of a
//! compiled program, not just its shape. Models the engine's block-memory
//! store as a sparse `id -> cell array` map with 0-initialized lazy growth,
//! and implements every opcode in `nodec_core::op` directly off its numeric
//! `func` code via `Op::try_from`.
//!
//! Index preconditions (non-negative, integral, <= 65535) are asserted, not
//! returned as `Result`, section 7 calls these "assertion failure, tests
//! only": a compiled program that violates them is a compiler or frontend
//! bug, not a runtime condition callers recover from.

use nodec_core::{floored_mod, Node, NodeTree, Op};
use std::collections::HashMap;

/// Maximum valid cell index within any block (section 4.17).
const MAX_INDEX: f64 = 65535.0;

/// Non-local exit raised by `Break` and caught by the innermost `Block`
/// (section 9 "control via exceptions"). `n` counts additional `Block`
/// levels to unwind through; `n == 0` means "this is the target".
#[derive(Debug, Clone, Copy, PartialEq)]
struct BreakSignal {
    n: u32,
    value: f64,
}

type EvalResult = Result<f64, BreakSignal>;

/// Evaluates node trees and owns the block-memory store between runs.
pub struct Interpreter {
    blocks: HashMap<u32, Vec<f64>>,
    log: Vec<f64>,
    rng_state: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_seed(0x9E3779B97F4A7C15)
    }

    pub fn with_seed(seed: u64) -> Self {
        Interpreter {
            blocks: HashMap::new(),
            log: Vec::new(),
            rng_state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Values appended by `DebugLog`, in evaluation order.
    pub fn log(&self) -> &[f64] {
        &self.log
    }

    /// Reads a cell, 0.0 if the block or cell was never written.
    pub fn cell(&self, block_id: u32, index: u32) -> f64 {
        self.blocks.get(&block_id).and_then(|b| b.get(index as usize)).copied().unwrap_or(0.0)
    }

    /// Evaluates a tree's root. Top-level `Break` (no enclosing `Block`)
    /// is a precondition violation: compiled trees always wrap their root
    /// in `Block` (section 4.16), so this only fires on a malformed tree.
    pub fn run(&mut self, tree: &NodeTree) -> f64 {
        match self.eval(tree, tree.root) {
            Ok(v) => v,
            Err(b) => panic!("uncaught Break(n={}, v={}) escaped the tree root", b.n, b.value),
        }
    }

    fn eval(&mut self, tree: &NodeTree, idx: u32) -> EvalResult {
        match tree.get(idx).unwrap_or_else(|| panic!("dangling node index {idx}")) {
            Node::Value { value } => Ok(*value),
            Node::Op { func, args } => {
                let op = Op::try_from(*func).unwrap_or_else(|f| panic!("unknown op code {f}"));
                let args = args.clone();
                self.eval_op(tree, op, &args)
            }
        }
    }

    fn eval_args(&mut self, tree: &NodeTree, args: &[u32]) -> Result<Vec<f64>, BreakSignal> {
        args.iter().map(|&a| self.eval(tree, a)).collect()
    }

    fn eval_op(&mut self, tree: &NodeTree, op: Op, args: &[u32]) -> EvalResult {
        use Op::*;
        match op {
            If => {
                let test = self.eval(tree, args[0])?;
                let branch = if test != 0.0 { args[1] } else { args[2] };
                self.eval(tree, branch)
            }
            Switch | SwitchWithDefault => self.eval_switch(tree, args, op == SwitchWithDefault, false),
            SwitchInteger | SwitchIntegerWithDefault => {
                self.eval_switch(tree, args, op == SwitchIntegerWithDefault, true)
            }
            While => self.eval_while(tree, args[0], args[1]),
            DoWhile => self.eval_do_while(tree, args[0], args[1]),
            Block => match self.eval(tree, args[0]) {
                Ok(v) => Ok(v),
                Err(BreakSignal { n: 0, value }) => Ok(value),
                Err(BreakSignal { n, value }) => Err(BreakSignal { n: n - 1, value }),
            },
            Break => {
                let n = self.eval(tree, args[0])?;
                let value = self.eval(tree, args[1])?;
                Err(BreakSignal { n: as_index(n) as u32, value })
            }
            JumpLoop => self.eval_jump_loop(tree, args),
            Execute => {
                let vals = self.eval_args(tree, args)?;
                Ok(vals.into_iter().last().unwrap_or(0.0))
            }
            Execute0 => {
                self.eval_args(tree, args)?;
                Ok(0.0)
            }
            Get => {
                let vals = self.eval_args(tree, args)?;
                Ok(self.cell(as_index(vals[0]), as_index(vals[1])))
            }
            Set => {
                let vals = self.eval_args(tree, args)?;
                let v = vals[2];
                self.write(as_index(vals[0]), as_index(vals[1]), v);
                Ok(v)
            }
            GetShifted => {
                let vals = self.eval_args(tree, args)?;
                Ok(self.cell(as_index(vals[0]), as_index(vals[1]) + as_index(vals[2])))
            }
            SetShifted => {
                let vals = self.eval_args(tree, args)?;
                let v = vals[3];
                self.write(as_index(vals[0]), as_index(vals[1]) + as_index(vals[2]), v);
                Ok(v)
            }
            GetPointed => {
                let vals = self.eval_args(tree, args)?;
                Ok(self.cell(as_index(vals[0]), as_index(vals[1])))
            }
            SetPointed => {
                let vals = self.eval_args(tree, args)?;
                let v = vals[2];
                self.write(as_index(vals[0]), as_index(vals[1]), v);
                Ok(v)
            }
            IncrementPre | IncrementPost => {
                let vals = self.eval_args(tree, args)?;
                let (block_id, cell, delta) = (as_index(vals[0]), as_index(vals[1]), vals[2]);
                let old = self.cell(block_id, cell);
                let new = old + delta;
                self.write(block_id, cell, new);
                Ok(if op == IncrementPre { new } else { old })
            }
            IncrementPreShifted | IncrementPostShifted => {
                let vals = self.eval_args(tree, args)?;
                let (block_id, cell, delta) =
                    (as_index(vals[0]), as_index(vals[1]) + as_index(vals[2]), vals[3]);
                let old = self.cell(block_id, cell);
                let new = old + delta;
                self.write(block_id, cell, new);
                Ok(if op == IncrementPreShifted { new } else { old })
            }
            IncrementPrePointed | IncrementPostPointed => {
                let vals = self.eval_args(tree, args)?;
                let (block_id, cell, delta) = (as_index(vals[0]), as_index(vals[1]), vals[2]);
                let old = self.cell(block_id, cell);
                let new = old + delta;
                self.write(block_id, cell, new);
                Ok(if op == IncrementPrePointed { new } else { old })
            }
            DebugLog => {
                let v = self.eval(tree, args[0])?;
                self.log.push(v);
                Ok(v)
            }
            DebugPause => Ok(0.0),
            Random => Ok(self.next_f64()),
            RandomInteger => {
                let vals = self.eval_args(tree, args)?;
                let (lo, hi) = (vals[0], vals[1]);
                if hi <= lo {
                    Ok(lo)
                } else {
                    let span = (hi - lo) as u64 + 1;
                    Ok(lo + (self.next_u64() % span) as f64)
                }
            }
            Divide => {
                let vals = self.eval_args(tree, args)?;
                Ok(vals[0] / vals[1])
            }
            Mod => {
                let vals = self.eval_args(tree, args)?;
                Ok(floored_mod(vals[0], vals[1]))
            }
            Rem => {
                let vals = self.eval_args(tree, args)?;
                Ok(vals[0] % vals[1])
            }
            _ => {
                let vals = self.eval_args(tree, args)?;
                Ok(op.eval(&vals).unwrap_or_else(|| panic!("op {op:?} has no runtime fallback")))
            }
        }
    }

    fn eval_switch(&mut self, tree: &NodeTree, args: &[u32], has_default: bool, integer: bool) -> EvalResult {
        let test = self.eval(tree, args[0])?;
        let test = if integer { as_index(test) as f64 } else { test };
        let arm_count = if has_default { (args.len() - 2) / 2 } else { (args.len() - 1) / 2 };
        for i in 0..arm_count {
            let cond = self.eval(tree, args[1 + 2 * i])?;
            if cond.to_bits() == test.to_bits() {
                return self.eval(tree, args[2 + 2 * i]);
            }
        }
        if has_default {
            self.eval(tree, args[args.len() - 1])
        } else {
            panic!("Switch with no matching arm and no default")
        }
    }

    fn eval_while(&mut self, tree: &NodeTree, cond: u32, body: u32) -> EvalResult {
        let mut last = 0.0;
        while self.eval(tree, cond)? != 0.0 {
            last = self.eval(tree, body)?;
        }
        Ok(last)
    }

    fn eval_do_while(&mut self, tree: &NodeTree, body: u32, cond: u32) -> EvalResult {
        let mut last = self.eval(tree, body)?;
        while self.eval(tree, cond)? != 0.0 {
            last = self.eval(tree, body)?;
        }
        Ok(last)
    }

    fn eval_jump_loop(&mut self, tree: &NodeTree, args: &[u32]) -> EvalResult {
        let n_blocks = (args.len() - 1) as u32;
        let start = self.eval(tree, *args.last().unwrap())?;
        let mut i = as_index(start);
        while i < n_blocks {
            let next = self.eval(tree, args[i as usize])?;
            i = as_index(next);
        }
        Ok(n_blocks as f64)
    }

    fn write(&mut self, block_id: u32, index: u32, value: f64) {
        let block = self.blocks.entry(block_id).or_default();
        if block.len() <= index as usize {
            block.resize(index as usize + 1, 0.0);
        }
        block[index as usize] = value;
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

/// Asserts the section 4.17 index precondition and truncates to `u32`.
fn as_index(v: f64) -> u32 {
    assert!(v >= 0.0, "index must be non-negative, got {v}");
    assert!(v.fract() == 0.0, "index must be integral, got {v}");
    assert!(v <= MAX_INDEX, "index must be <= 65535, got {v}");
    v as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodec_core::NodeTreeBuilder;

    #[test]
    fn get_on_unwritten_cell_is_zero() {
        let mut builder = NodeTreeBuilder::new();
        let bid = builder.value(10000.0);
        let cell = builder.value(5.0);
        let root = builder.op(Op::Get, vec![bid, cell]);
        let tree = builder.finish(root);

        assert_eq!(Interpreter::new().run(&tree), 0.0);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut builder = NodeTreeBuilder::new();
        let bid = builder.value(10000.0);
        let cell = builder.value(3.0);
        let val = builder.value(42.0);
        let set = builder.op(Op::Set, vec![bid, cell, val]);
        let get = builder.op(Op::Get, vec![bid, cell]);
        let root = builder.op(Op::Execute, vec![set, get]);
        let tree = builder.finish(root);

        assert_eq!(Interpreter::new().run(&tree), 42.0);
    }

    #[test]
    fn break_inside_block_yields_its_value() {
        let mut builder = NodeTreeBuilder::new();
        let n = builder.value(0.0);
        let v = builder.value(7.0);
        let brk = builder.op(Op::Break, vec![n, v]);
        let root = builder.op(Op::Block, vec![brk]);
        let tree = builder.finish(root);

        assert_eq!(Interpreter::new().run(&tree), 7.0);
    }

    #[test]
    fn nested_break_unwinds_through_outer_block() {
        let mut builder = NodeTreeBuilder::new();
        let n = builder.value(1.0);
        let v = builder.value(9.0);
        let brk = builder.op(Op::Break, vec![n, v]);
        let inner = builder.op(Op::Block, vec![brk]);
        let outer = builder.op(Op::Block, vec![inner]);
        let tree = builder.finish(outer);

        assert_eq!(Interpreter::new().run(&tree), 9.0);
    }

    #[test]
    fn jump_loop_advances_through_indices_and_terminates_at_sentinel() {
        // block 0: Set(10000, 0, 1), yields index 1 (next block)
        // block 1: sentinel (past-the-end, n_blocks = 2)
        let mut builder = NodeTreeBuilder::new();
        let bid = builder.value(10000.0);
        let cell = builder.value(0.0);
        let one = builder.value(1.0);
        let block0 = builder.op(Op::Set, vec![bid, cell, one]);
        let block1 = builder.value(2.0);
        let start = builder.value(0.0);
        let jl = builder.op(Op::JumpLoop, vec![block0, block1, start]);
        let root = builder.op(Op::Block, vec![jl]);
        let tree = builder.finish(root);

        let mut interp = Interpreter::new();
        interp.run(&tree);
        assert_eq!(interp.cell(10000, 0), 1.0);
    }

    #[test]
    fn debug_log_records_values_in_order() {
        let mut builder = NodeTreeBuilder::new();
        let a = builder.value(1.0);
        let b = builder.value(2.0);
        let log_a = builder.op(Op::DebugLog, vec![a]);
        let log_b = builder.op(Op::DebugLog, vec![b]);
        let root = builder.op(Op::Execute, vec![log_a, log_b]);
        let tree = builder.finish(root);

        let mut interp = Interpreter::new();
        interp.run(&tree);
        assert_eq!(interp.log(), &[1.0, 2.0]);
    }

    #[test]
    fn switch_with_default_falls_back_when_no_arm_matches() {
        let mut builder = NodeTreeBuilder::new();
        let test = builder.value(9.0);
        let cond1 = builder.value(1.0);
        let idx1 = builder.value(100.0);
        let default = builder.value(-1.0);
        let root = builder.op(Op::SwitchWithDefault, vec![test, cond1, idx1, default]);
        let tree = builder.finish(root);

        assert_eq!(Interpreter::new().run(&tree), -1.0);
    }

    #[test]
    fn random_is_deterministic_for_a_fixed_seed() {
        let mut builder = NodeTreeBuilder::new();
        let root = builder.op(Op::Random, vec![]);
        let tree = builder.finish(root);

        let a = Interpreter::with_seed(42).run(&tree);
        let b = Interpreter::with_seed(42).run(&tree);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "index must be non-negative")]
    fn negative_index_is_a_precondition_violation() {
        let mut builder = NodeTreeBuilder::new();
        let bid = builder.value(10000.0);
        let cell = builder.value(-1.0);
        let root = builder.op(Op::Get, vec![bid, cell]);
        let tree = builder.finish(root);

        Interpreter::new().run(&tree);
    }
}
