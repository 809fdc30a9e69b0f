//! IR and CFG (section 4.1, section 3)

pub mod cfg;
pub mod expr;

pub use cfg::{cond_eq, BasicBlock, BlockId, Cfg, Edge, PhiArms};
pub use expr::{Expr, Stmt};
