pub mod dominance;
pub mod liveness;

pub use dominance::Dominance;
pub use liveness::{analyze as analyze_liveness, Liveness, StmtId};
