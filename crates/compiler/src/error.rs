//! Compile-time error types (section 7 "Error handling design")
//!
//! Only the "Fatal" rows of the section 7 table are represented here. The
//! SSA-sentinel substitution and division-by-zero-in-folding rows are *not*
//! errors, they are handled entirely in-band (see
//! [`nodec_core::SsaPlace::sentinel`] and [`nodec_core::Op::eval`]) and must
//! never surface as a `CompileError` variant.

/// All-or-nothing: a `CompileError` means the whole compilation failed and
/// no partial node tree is emitted (section 7, last paragraph).
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Allocation could not fit every temp block within the 4096-cell
    /// scratch region (section 4.15, section 3 invariant).
    ScratchExhausted { needed: u32, capacity: u32 },
    /// Liveness analysis found no reachable exit block: the CFG has a back
    /// edge with no way out (section 4.8).
    InfiniteLoop,
    /// The pass scheduler's requirement graph could not converge within its
    /// watchdog budget (section 4.2).
    UnsatisfiedPassRequirements { pass: String, missing: Vec<String> },
    /// A pass observed IR shape it should never see given the invariants in
    /// section 3; indicates a frontend bug, not a user error.
    UnexpectedIrShape(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::ScratchExhausted { needed, capacity } => write!(
                f,
                "scratch memory exhausted: needed at least {needed} cells, capacity is {capacity}"
            ),
            CompileError::InfiniteLoop => {
                write!(f, "CFG has no reachable exit (infinite loop)")
            }
            CompileError::UnsatisfiedPassRequirements { pass, missing } => write!(
                f,
                "pass scheduler could not satisfy requirements of `{pass}`: missing {missing:?}"
            ),
            CompileError::UnexpectedIrShape(s) => write!(f, "unexpected IR shape: {s}"),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
