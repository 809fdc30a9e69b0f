//! Expressions and statements (section 3)
//!
//! A closed, seven-shape tagged union (`Const`, `PureOp`, `Op`, `Get`, `Set`
//!, `Set` does double duty as both the value-producing nested form and the
//! block-body statement form). Every pass in this crate matches `Expr`
//! exhaustively; see the "Tagged unions vs. dispatch" design note, no
//! `isinstance`-style probing.

use nodec_core::{Op, Place};

/// The IR's single expression/statement type (section 3).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal. Booleans are represented as 0/1.
    Const(f64),
    /// A pure, side-effect-free arithmetic/logic operator application.
    PureOp(Op, Vec<Expr>),
    /// A general operator application, possibly impure or side-effecting.
    Op(Op, Vec<Expr>),
    /// Read from a place.
    Get(Place),
    /// Write `value` to `place`. Also the top-level statement form in a
    /// block body; may itself appear nested as a side-effecting value.
    Set(Place, Box<Expr>),
}

/// A block body statement is just an `Expr` evaluated for its side effects
/// (and, if it is a `Set`, for its definition). Named separately from `Expr`
/// only for readability at call sites; the type is identical.
pub type Stmt = Expr;

impl Expr {
    pub fn const_(v: f64) -> Expr {
        Expr::Const(v)
    }

    pub fn get(p: impl Into<Place>) -> Expr {
        Expr::Get(p.into())
    }

    pub fn set(p: impl Into<Place>, v: Expr) -> Expr {
        Expr::Set(p.into(), Box::new(v))
    }

    pub fn pure_op(op: Op, args: Vec<Expr>) -> Expr {
        debug_assert!(op.is_pure(), "{op:?} is not pure");
        Expr::PureOp(op, args)
    }

    pub fn op(op: Op, args: Vec<Expr>) -> Expr {
        Expr::Op(op, args)
    }

    /// The place this expression defines, if it is (or is headed by) a `Set`.
    pub fn defined_place(&self) -> Option<&Place> {
        match self {
            Expr::Set(p, _) => Some(p),
            _ => None,
        }
    }

    /// Mutable access to the defined place, for passes that rewrite
    /// definitions in place (SSA renaming, allocation).
    pub fn defined_place_mut(&mut self) -> Option<&mut Place> {
        match self {
            Expr::Set(p, _) => Some(p),
            _ => None,
        }
    }

    /// True when this is the self-copy `Set(p, Get(p))` that multiple passes
    /// special-case for deletion (section 4.12; section 9 Open Question i).
    pub fn is_self_copy(&self) -> bool {
        match self {
            Expr::Set(dst, rhs) => matches!(rhs.as_ref(), Expr::Get(src) if src == dst),
            _ => false,
        }
    }

    /// Whether evaluating this expression has an externally observable
    /// effect that must not be elided even if its result is dead (section
    /// 4.1's `side_effects` property, applied recursively: a pure wrapper
    /// around a side-effecting nested `Set` still has side effects).
    pub fn has_side_effects(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Get(_) => false,
            Expr::PureOp(_, args) => args.iter().any(Expr::has_side_effects),
            Expr::Op(op, args) => op.has_side_effects() || args.iter().any(Expr::has_side_effects),
            // A Set is always observable, regardless of its RHS.
            Expr::Set(_, _) => true,
        }
    }

    /// Apply `f` to every immediate child expression, left to right.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        match self {
            Expr::Const(_) | Expr::Get(_) => {}
            Expr::PureOp(_, args) | Expr::Op(_, args) => args.iter().for_each(f),
            Expr::Set(_, rhs) => f(rhs),
        }
    }

    /// Apply `f` to every immediate child expression mutably.
    pub fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut Expr)) {
        match self {
            Expr::Const(_) | Expr::Get(_) => {}
            Expr::PureOp(_, args) | Expr::Op(_, args) => args.iter_mut().for_each(f),
            Expr::Set(_, rhs) => f(rhs),
        }
    }

    /// Recursively visit every place read by this expression (a `Get`'s
    /// place, or a nested `Set`'s RHS places; the target of a `Set` is a
    /// definition, not a use, so it is not yielded here).
    pub fn for_each_use(&self, f: &mut impl FnMut(&Place)) {
        match self {
            Expr::Const(_) => {}
            Expr::Get(p) => f(p),
            Expr::PureOp(_, args) | Expr::Op(_, args) => {
                for a in args {
                    a.for_each_use(f);
                }
            }
            Expr::Set(_, rhs) => rhs.for_each_use(f),
        }
    }

    /// Recursively visit every place read by this expression, mutably.
    pub fn for_each_use_mut(&mut self, f: &mut impl FnMut(&mut Place)) {
        match self {
            Expr::Const(_) => {}
            Expr::Get(p) => f(p),
            Expr::PureOp(_, args) | Expr::Op(_, args) => {
                for a in args {
                    a.for_each_use_mut(f);
                }
            }
            Expr::Set(_, rhs) => rhs.for_each_use_mut(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodec_core::TempPlace;

    fn t(name: &str) -> Place {
        Place::Temp(TempPlace::new(name, 1))
    }

    #[test]
    fn self_copy_is_detected() {
        let e = Expr::set(t("x"), Expr::get(t("x")));
        assert!(e.is_self_copy());
        let e2 = Expr::set(t("x"), Expr::get(t("y")));
        assert!(!e2.is_self_copy());
    }

    #[test]
    fn set_always_has_side_effects_even_with_pure_rhs() {
        let e = Expr::set(t("x"), Expr::Const(1.0));
        assert!(e.has_side_effects());
    }

    #[test]
    fn pure_op_side_effects_only_from_nested_set() {
        let pure = Expr::pure_op(Op::Add, vec![Expr::Const(1.0), Expr::Const(2.0)]);
        assert!(!pure.has_side_effects());

        let nested = Expr::pure_op(
            Op::Add,
            vec![Expr::set(t("x"), Expr::Const(1.0)), Expr::Const(2.0)],
        );
        assert!(nested.has_side_effects());
    }

    #[test]
    fn for_each_use_finds_nested_gets() {
        let e = Expr::pure_op(Op::Add, vec![Expr::get(t("a")), Expr::get(t("b"))]);
        let mut uses = vec![];
        e.for_each_use(&mut |p| uses.push(p.clone()));
        assert_eq!(uses, vec![t("a"), t("b")]);
    }
}
