//! Arithmetic simplification / constant folding (section 4.10)
//!
//! Runs as part of the inlining/simplification phase rather than as its own
//! scheduled pass, `InlineVars` calls this after each inlining fixed point
//! (section 9, "Applied as part of the inlining/simplification phase").
//! Bottom-up: children simplify first, so a chain like `Add(Add(x, 1), 2)`
//! flattens and folds in one pass without repeated scheduling.

use crate::ir::{Cfg, Expr};
use nodec_core::Op;

pub fn arith_simplify(cfg: &mut Cfg) {
    for b in cfg.live_ids().collect::<Vec<_>>() {
        for i in 0..cfg.block(b).stmts.len() {
            let mut stmt = std::mem::replace(&mut cfg.block_mut(b).stmts[i], Expr::Const(0.0));
            simplify(&mut stmt);
            cfg.block_mut(b).stmts[i] = stmt;
        }
        let mut test = std::mem::replace(&mut cfg.block_mut(b).test, Expr::Const(0.0));
        simplify(&mut test);
        cfg.block_mut(b).test = test;
    }
}

fn simplify(e: &mut Expr) {
    match e {
        Expr::Const(_) | Expr::Get(_) => {}
        Expr::PureOp(op, args) => {
            for a in args.iter_mut() {
                simplify(a);
            }
            let op = *op;
            let args = std::mem::take(args);
            *e = fold_pure(op, args);
        }
        Expr::Op(op, args) => {
            for a in args.iter_mut() {
                simplify(a);
            }
            if op.is_pure() {
                let op = *op;
                let args = std::mem::take(args);
                *e = fold_pure(op, args);
            }
        }
        Expr::Set(_, rhs) => simplify(rhs),
    }
}

fn is_associative(op: Op) -> bool {
    matches!(op, Op::Add | Op::Multiply | Op::And | Op::Or)
}

/// Identity element dropped from a variadic chain (section 4.10: "0 for
/// Add/Subtract; 1 for Multiply/Divide"). `And`/`Or` keep their folded
/// constant rather than dropping it: there is no identity rule for them,
/// only an absorbing one.
fn identity_value(op: Op) -> Option<f64> {
    match op {
        Op::Add => Some(0.0),
        Op::Multiply => Some(1.0),
        _ => None,
    }
}

fn absorbing_value(op: Op) -> Option<f64> {
    match op {
        Op::Multiply | Op::And => Some(0.0),
        Op::Or => Some(1.0),
        _ => None,
    }
}

fn fold_pure(op: Op, args: Vec<Expr>) -> Expr {
    if is_associative(op) {
        simplify_variadic(op, args)
    } else if matches!(op, Op::Subtract | Op::Divide) {
        simplify_base_preserving(op, args)
    } else if args.iter().all(|a| matches!(a, Expr::Const(_))) {
        let vals: Vec<f64> = args
            .iter()
            .map(|a| match a {
                Expr::Const(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        match op.eval(&vals) {
            Some(v) => Expr::Const(v),
            None => Expr::PureOp(op, args),
        }
    } else {
        Expr::PureOp(op, args)
    }
}

/// Flatten nested same-op chains, short-circuit the absorbing element, fold
/// every constant argument into one, and collapse a singleton result to its
/// bare operand (section 4.10).
fn simplify_variadic(op: Op, args: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(args.len());
    for a in args {
        match a {
            Expr::PureOp(o, inner) if o == op => flat.extend(inner),
            other => flat.push(other),
        }
    }

    if let Some(absorb) = absorbing_value(op) {
        if flat
            .iter()
            .any(|a| matches!(a, Expr::Const(v) if v.to_bits() == absorb.to_bits()))
        {
            return Expr::Const(absorb);
        }
    }

    let mut consts: Vec<f64> = Vec::new();
    let mut new_args: Vec<Expr> = Vec::new();
    for a in flat {
        match a {
            Expr::Const(v) => consts.push(v),
            other => new_args.push(other),
        }
    }

    if !consts.is_empty() {
        let folded = op.eval(&consts).expect("Add/Multiply/And/Or always fold");
        let drop_as_identity = !new_args.is_empty()
            && matches!(identity_value(op), Some(id) if id.to_bits() == folded.to_bits());
        if !drop_as_identity {
            new_args.insert(0, Expr::Const(folded));
        }
    }

    match new_args.len() {
        0 => Expr::Const(consts.first().copied().unwrap_or_else(|| identity_value(op).unwrap_or(0.0))),
        1 => new_args.into_iter().next().unwrap(),
        _ => Expr::PureOp(op, new_args),
    }
}

/// `Subtract`/`Divide` keep their first argument as the base (section 4.10:
/// "for Subtract/Divide preserve the first argument as the base"), only the
/// trailing arguments get identity-dropped and constant-folded together.
fn simplify_base_preserving(op: Op, mut args: Vec<Expr>) -> Expr {
    if args.is_empty() {
        return Expr::PureOp(op, args);
    }
    let base = args.remove(0);
    let identity = match op {
        Op::Subtract => 0.0,
        Op::Divide => 1.0,
        _ => unreachable!(),
    };
    let rest: Vec<Expr> = args
        .into_iter()
        .filter(|a| !matches!(a, Expr::Const(v) if v.to_bits() == identity.to_bits()))
        .collect();

    if rest.is_empty() {
        return base;
    }

    if let Expr::Const(b) = base {
        if rest.iter().all(|a| matches!(a, Expr::Const(_))) {
            let mut vals = vec![b];
            vals.extend(rest.iter().map(|a| match a {
                Expr::Const(v) => *v,
                _ => unreachable!(),
            }));
            if let Some(v) = op.eval(&vals) {
                return Expr::Const(v);
            }
        }
    }

    let mut new_args = vec![base];
    new_args.extend(rest);
    Expr::PureOp(op, new_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(args: Vec<Expr>) -> Expr {
        Expr::PureOp(Op::Add, args)
    }

    #[test]
    fn nested_add_chains_flatten_and_fold() {
        let mut e = add(vec![add(vec![Expr::Const(1.0), Expr::Const(2.0)]), Expr::Const(3.0)]);
        simplify(&mut e);
        assert_eq!(e, Expr::Const(6.0));
    }

    #[test]
    fn add_drops_zero_identity() {
        let mut e = add(vec![Expr::get(nodec_core::TempPlace::new("x", 1)), Expr::Const(0.0)]);
        simplify(&mut e);
        assert_eq!(e, Expr::get(nodec_core::TempPlace::new("x", 1)));
    }

    #[test]
    fn multiply_short_circuits_on_zero() {
        let mut e = Expr::PureOp(
            Op::Multiply,
            vec![Expr::get(nodec_core::TempPlace::new("x", 1)), Expr::Const(0.0)],
        );
        simplify(&mut e);
        assert_eq!(e, Expr::Const(0.0));
    }

    #[test]
    fn division_by_zero_is_left_unfolded() {
        let mut e = Expr::PureOp(Op::Divide, vec![Expr::Const(1.0), Expr::Const(0.0)]);
        simplify(&mut e);
        assert_eq!(e, Expr::PureOp(Op::Divide, vec![Expr::Const(1.0), Expr::Const(0.0)]));
    }

    #[test]
    fn subtract_keeps_base_and_drops_zero_subtrahend() {
        let x = Expr::get(nodec_core::TempPlace::new("x", 1));
        let mut e = Expr::PureOp(Op::Subtract, vec![x.clone(), Expr::Const(0.0)]);
        simplify(&mut e);
        assert_eq!(e, x);
    }
}
