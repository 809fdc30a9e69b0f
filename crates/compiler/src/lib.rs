//! Optimizing backend compiler for the node-tree toolchain (section 4)
//!
//! Takes a frontend-emitted [`ir::Cfg`], runs it through one of three
//! canonical pipelines ([`pipeline::PipelineKind`]), and linearizes the
//! result into the engine's flat node tree ([`nodec_core::NodeTree`]).
//! Passes are modeled as values implementing [`pass::Pass`] and scheduled
//! by [`pass::run_passes`]; individual passes live under [`passes`].

pub mod analysis;
pub mod config;
pub mod error;
pub mod ir;
pub mod linearize;
pub mod pass;
pub mod passes;
pub mod pipeline;

pub use config::CompileOptions;
pub use error::{CompileError, CompileResult};
pub use pipeline::PipelineKind;

use pass::PassRegistry;

/// Every pass this crate knows about, registered under its [`pass::PassId`].
pub fn default_registry() -> PassRegistry {
    let mut reg = PassRegistry::new();
    reg.register(Box::new(passes::CoalesceFlow))
        .register(Box::new(passes::UnreachableElim))
        .register(Box::new(passes::Dce))
        .register(Box::new(passes::ToSsa))
        .register(Box::new(passes::Sccp))
        .register(Box::new(passes::InlineVars))
        .register(Box::new(passes::IfToSwitch))
        .register(Box::new(passes::FromSsa))
        .register(Box::new(passes::CopyCoalesce))
        .register(Box::new(passes::AdvancedDce))
        .register(Box::new(passes::NormalizeSwitch))
        .register(Box::new(passes::AllocateFast))
        .register(Box::new(passes::AllocateStandard));
    reg
}

/// Compile a single callback's CFG into a node tree (section 6).
///
/// All-or-nothing (section 7): any pass failure aborts the whole
/// compilation and no partial tree is returned.
pub fn compile(cfg: &mut ir::Cfg, options: &CompileOptions) -> CompileResult<nodec_core::NodeTree> {
    let registry = default_registry();
    pass::run_passes(cfg, options.pipeline().schedule(), &registry)?;
    linearize::linearize(cfg)
}
