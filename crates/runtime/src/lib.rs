//! Reference interpreter, compile cache, and worker pool (section 4.17,
//! section 5 "Concurrency & resource model")
//!
//! This crate has no dependency on [`nodec_compiler`] beyond its node-tree
//! output type: the interpreter only ever sees a finished [`nodec_core::NodeTree`],
//! never a `Cfg`. The compile cache and worker pool are generic over any
//! compile function a caller supplies.

pub mod cache;
pub mod interp;
pub mod pool;

pub use cache::CompileCache;
pub use interp::Interpreter;
pub use pool::WorkerPool;
