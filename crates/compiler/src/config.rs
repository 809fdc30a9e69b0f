//! Compile-time configuration (section 6 "Pipeline selection")

use crate::pipeline::PipelineKind;

/// Caller-facing knobs for a single callback's compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pipeline: PipelineKind,
}

impl CompileOptions {
    pub fn new(pipeline: PipelineKind) -> Self {
        CompileOptions { pipeline }
    }

    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions::new(PipelineKind::Standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_select_standard_pipeline() {
        assert_eq!(CompileOptions::default().pipeline(), PipelineKind::Standard);
    }
}
