//! Node-Tree Core: shared data types for the optimizing backend compiler
//!
//! This crate provides the language-agnostic foundation shared between the
//! pass pipeline (`nodec-compiler`) and the reference interpreter
//! (`nodec-runtime`):
//!
//! - `place`: addressable storage (fixed memory blocks, temp blocks, SSA
//!   registers)
//! - `op`: the full operator table, with `pure`/`side_effects` properties
//! - `blocks`: the fixed memory block-id table and per-callback-phase
//!   readable/writable rules
//! - `nodetree`: the serialized engine node tree format and its
//!   DAG-deduplicating builder
//!
//! # Modules
//!
//! - `place`: `Place`, `BlockPlace`, `TempPlace`, `SsaPlace`
//! - `op`: `Op`, the opcode table
//! - `blocks`: `FixedBlock`, `Phase`, the scratch-block constants
//! - `nodetree`: `Node`, `NodeTree`, `NodeTreeBuilder`

pub mod blocks;
pub mod nodetree;
pub mod op;
pub mod place;

pub use blocks::{FixedBlock, Phase, SCRATCH_BLOCK_ID, SCRATCH_CAPACITY};
pub use nodetree::{Node, NodeTree, NodeTreeBuilder};
pub use op::{floored_mod, Op};
pub use place::{BlockPlace, Place, SsaPlace, TempPlace};
