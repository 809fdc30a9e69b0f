//! The serialized engine node tree (section 4.16, section 6)
//!
//! A flat array of records, each either a literal value or an operator
//! application whose arguments are indices into the same array. Builders
//! insert each unique `(func, args)` or `(value,)` shape exactly once
//! (section 9 "Node deduplication") so that repeated subexpressions share
//! storage; the tree is rooted at whichever index is current when the
//! builder hands back control.

use crate::op::Op;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One record in the flat node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Value { value: f64 },
    Op { func: u16, args: Vec<u32> },
}

impl Node {
    pub fn value(v: f64) -> Node {
        Node::Value { value: v }
    }
}

/// A flat, DAG-shared array of node-tree records plus a root index.
///
/// Multiple callbacks in one mode may share a single backing array by
/// building into the same [`NodeTreeBuilder`] and recording each callback's
/// own root index (section 6 "a module entry point ... is addressed by a
/// single root index").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    pub nodes: Vec<Node>,
    pub root: u32,
}

impl NodeTree {
    pub fn get(&self, index: u32) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Content-addressed key for dedup. NaN requires bit-pattern hashing since
/// `NaN != NaN` under IEEE equality (section 9 "Node deduplication").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Value(u64),
    Op { func: u16, args: Vec<u32> },
}

fn value_key(v: f64) -> u64 {
    v.to_bits()
}

/// Builds a [`NodeTree`] with structural sharing: inserting the same
/// `(value,)` or `(func, args)` shape twice returns the first index both
/// times.
#[derive(Debug, Default)]
pub struct NodeTreeBuilder {
    nodes: Vec<Node>,
    index: HashMap<NodeKey, u32>,
}

impl NodeTreeBuilder {
    pub fn new() -> Self {
        NodeTreeBuilder::default()
    }

    /// Insert a literal value node, returning its (possibly shared) index.
    pub fn value(&mut self, v: f64) -> u32 {
        let key = NodeKey::Value(value_key(v));
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node::value(v));
        self.index.insert(key, idx);
        idx
    }

    /// Insert an operator application node, returning its (possibly shared)
    /// index. `args` are indices already present in this builder.
    pub fn op(&mut self, func: Op, args: Vec<u32>) -> u32 {
        self.op_raw(func as u16, args)
    }

    /// Insert by raw numeric func code, for control nodes synthesized during
    /// linearization that do not map to a single [`Op`] (e.g. a
    /// `SwitchWithDefault` whose condition/index pairs are assembled by the
    /// caller).
    pub fn op_raw(&mut self, func: u16, args: Vec<u32>) -> u32 {
        let key = NodeKey::Op {
            func,
            args: args.clone(),
        };
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node::Op { func, args });
        self.index.insert(key, idx);
        idx
    }

    /// Finish building, rooting the tree at `root`.
    pub fn finish(self, root: u32) -> NodeTree {
        NodeTree {
            nodes: self.nodes,
            root,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_value_shares_index() {
        let mut b = NodeTreeBuilder::new();
        let a = b.value(1.0);
        let c = b.value(1.0);
        assert_eq!(a, c);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn nan_values_dedup_by_bit_pattern_not_ieee_equality() {
        let mut b = NodeTreeBuilder::new();
        let a = b.value(f64::NAN);
        let c = b.value(f64::NAN);
        assert_eq!(a, c);
    }

    #[test]
    fn repeated_op_shares_index() {
        let mut b = NodeTreeBuilder::new();
        let x = b.value(1.0);
        let y = b.value(2.0);
        let sum1 = b.op(Op::Add, vec![x, y]);
        let sum2 = b.op(Op::Add, vec![x, y]);
        assert_eq!(sum1, sum2);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn different_arg_order_is_not_deduped() {
        let mut b = NodeTreeBuilder::new();
        let x = b.value(1.0);
        let y = b.value(2.0);
        let a = b.op(Op::Subtract, vec![x, y]);
        let c = b.op(Op::Subtract, vec![y, x]);
        assert_ne!(a, c);
    }

    #[test]
    fn finish_roots_the_tree() {
        let mut b = NodeTreeBuilder::new();
        let x = b.value(7.0);
        let tree = b.finish(x);
        assert_eq!(tree.root, x);
        assert_eq!(tree.get(x), Some(&Node::value(7.0)));
    }
}
