pub mod coalesce_flow;
pub mod unreachable_elim;
pub mod to_ssa;
pub mod sccp;
pub mod from_ssa;
pub mod dce;
pub mod arith_simplify;
pub mod inline_vars;
pub mod if_to_switch;
pub mod normalize_switch;
pub mod copy_coalesce;
pub mod allocate;

pub use coalesce_flow::CoalesceFlow;
pub use unreachable_elim::UnreachableElim;
pub use to_ssa::ToSsa;
pub use sccp::Sccp;
pub use from_ssa::FromSsa;
pub use dce::{AdvancedDce, Dce};
pub use arith_simplify::arith_simplify;
pub use inline_vars::InlineVars;
pub use if_to_switch::IfToSwitch;
pub use normalize_switch::NormalizeSwitch;
pub use copy_coalesce::CopyCoalesce;
pub use allocate::{AllocateFast, AllocateStandard};
