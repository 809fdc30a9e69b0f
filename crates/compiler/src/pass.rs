//! The pass framework (section 4.2)
//!
//! A pass declares what it `requires` (passes that must have last run and
//! still be active), what it `preserves` (the active set collapses to the
//! intersection with this after the pass runs, `None` means "invalidate
//! everything not in `applies`"), what it explicitly `destroys`, and what it
//! `applies` (usually just itself). `run_passes` drives the schedule,
//! prepending missing requirements and retrying, under a watchdog budget
//! that guards against an unsatisfiable requirement cycle.

use crate::error::{CompileError, CompileResult};
use crate::ir::Cfg;
use std::collections::{HashMap, HashSet, VecDeque};

/// Pass identity is a value, compared by equality, never by pass-instance
/// identity (section 9 "Pass requirements").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    CoalesceFlow,
    UnreachableElim,
    Dce,
    ToSsa,
    Sccp,
    InlineVars,
    IfToSwitch,
    FromSsa,
    CopyCoalesce,
    AdvancedDce,
    NormalizeSwitch,
    AllocateFast,
    AllocateStandard,
}

impl std::fmt::Display for PassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single optimization/transformation pass over a `Cfg`.
pub trait Pass {
    fn id(&self) -> PassId;

    /// Passes that must be in the active set before this one may run.
    fn requires(&self) -> &[PassId] {
        &[]
    }

    /// The active set collapses to its intersection with this after the
    /// pass runs. `None` means "drop everything not re-established by
    /// `applies`".
    fn preserves(&self) -> Option<&[PassId]> {
        None
    }

    /// Explicitly invalidated passes, removed from the active set after
    /// `preserves` is applied.
    fn destroys(&self) -> &[PassId] {
        &[]
    }

    /// Passes this run establishes as valid. Defaults to just this pass's
    /// own id.
    fn applies(&self) -> Vec<PassId> {
        vec![self.id()]
    }

    fn run(&self, cfg: &mut Cfg) -> CompileResult<()>;
}

/// Looks passes up by id for the scheduler.
pub struct PassRegistry {
    passes: HashMap<PassId, Box<dyn Pass>>,
}

impl PassRegistry {
    pub fn new() -> Self {
        PassRegistry {
            passes: HashMap::new(),
        }
    }

    pub fn register(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.passes.insert(pass.id(), pass);
        self
    }

    pub fn get(&self, id: PassId) -> Option<&dyn Pass> {
        self.passes.get(&id).map(|b| b.as_ref())
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        PassRegistry::new()
    }
}

/// Dequeues without forward progress allowed before giving up on an
/// unsatisfiable requirement cycle (section 4.2).
const WATCHDOG_BUDGET: u32 = 99;

/// Drive `schedule` to completion against `registry`, honoring
/// requires/preserves/destroys/applies (section 4.2).
pub fn run_passes(cfg: &mut Cfg, schedule: &[PassId], registry: &PassRegistry) -> CompileResult<()> {
    let mut queue: VecDeque<PassId> = schedule.iter().copied().collect();
    let mut active: HashSet<PassId> = HashSet::new();
    let mut stall_budget = WATCHDOG_BUDGET;

    while let Some(pid) = queue.pop_front() {
        let pass = registry.get(pid).ok_or_else(|| {
            CompileError::UnexpectedIrShape(format!("no pass registered for {pid}"))
        })?;

        let missing: Vec<PassId> = pass
            .requires()
            .iter()
            .copied()
            .filter(|r| !active.contains(r))
            .collect();

        if !missing.is_empty() {
            if stall_budget == 0 {
                return Err(CompileError::UnsatisfiedPassRequirements {
                    pass: pid.to_string(),
                    missing: missing.iter().map(PassId::to_string).collect(),
                });
            }
            stall_budget -= 1;
            tracing::debug!(pass = %pid, ?missing, "requirement not active, rescheduling");
            queue.push_front(pid);
            for r in missing.into_iter().rev() {
                queue.push_front(r);
            }
            continue;
        }

        stall_budget = WATCHDOG_BUDGET;
        tracing::trace!(pass = %pid, "running");
        pass.run(cfg)?;

        if let Some(preserves) = pass.preserves() {
            active.retain(|a| preserves.contains(a));
        }
        for d in pass.destroys() {
            active.remove(d);
        }
        for a in pass.applies() {
            active.insert(a);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        id: PassId,
        requires: Vec<PassId>,
        calls: std::rc::Rc<std::cell::RefCell<Vec<PassId>>>,
    }

    impl Pass for Counting {
        fn id(&self) -> PassId {
            self.id
        }
        fn requires(&self) -> &[PassId] {
            &self.requires
        }
        fn run(&self, _cfg: &mut Cfg) -> CompileResult<()> {
            self.calls.borrow_mut().push(self.id);
            Ok(())
        }
    }

    #[test]
    fn missing_requirement_is_prepended_and_retried() {
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut reg = PassRegistry::new();
        reg.register(Box::new(Counting {
            id: PassId::UnreachableElim,
            requires: vec![],
            calls: calls.clone(),
        }));
        reg.register(Box::new(Counting {
            id: PassId::Dce,
            requires: vec![PassId::UnreachableElim],
            calls: calls.clone(),
        }));

        let mut cfg = Cfg::new();
        // Schedule Dce first; UnreachableElim is not active yet, so it must
        // be inserted ahead of Dce automatically.
        run_passes(&mut cfg, &[PassId::Dce], &reg).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![PassId::UnreachableElim, PassId::Dce]
        );
    }

    #[test]
    fn unsatisfiable_requirement_cycle_hits_watchdog() {
        // Dce requires ToSsa and ToSsa requires Dce: neither can ever
        // become active, so the scheduler must give up rather than loop
        // forever.
        struct NeedsOther {
            id: PassId,
            other: PassId,
        }
        impl Pass for NeedsOther {
            fn id(&self) -> PassId {
                self.id
            }
            fn requires(&self) -> &[PassId] {
                std::slice::from_ref(&self.other)
            }
            fn run(&self, _cfg: &mut Cfg) -> CompileResult<()> {
                Ok(())
            }
        }
        let mut reg = PassRegistry::new();
        reg.register(Box::new(NeedsOther {
            id: PassId::Dce,
            other: PassId::ToSsa,
        }));
        reg.register(Box::new(NeedsOther {
            id: PassId::ToSsa,
            other: PassId::Dce,
        }));
        let mut cfg = Cfg::new();
        let err = run_passes(&mut cfg, &[PassId::Dce], &reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsatisfiedPassRequirements { .. }
        ));
    }
}
