//! The operator table (section 4.1, section 6 "Engine node output")
//!
//! Every operator carries two independent boolean properties:
//!
//! - `pure`: the result depends only on argument values and may be freely
//!   CSE'd, reordered, or inlined.
//! - `side_effects`: execution is observable and must not be elided even if
//!   the result is dead.
//!
//! `eval` implements the host-equivalent arithmetic for every op SCCP and
//! arithmetic simplification can fold at compile time, and that the
//! reference interpreter uses at runtime: one evaluator, shared, so the
//! two can never silently disagree (section 8 invariant 6).

/// The full operator set. Discriminants are the numeric `func` codes used in
/// the serialized node tree (section 6 "Engine node output").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Op {
    // Arithmetic
    Add = 0,
    Subtract = 1,
    Multiply = 2,
    Divide = 3,
    Mod = 4,
    Rem = 5,
    Power = 6,
    Negate = 7,
    Abs = 8,

    // Comparison
    Equal = 10,
    NotEqual = 11,
    Less = 12,
    LessOr = 13,
    Greater = 14,
    GreaterOr = 15,

    // Logic
    And = 20,
    Or = 21,
    Not = 22,

    // Transcendental
    Sin = 30,
    Cos = 31,
    Tan = 32,
    Arcsin = 33,
    Arccos = 34,
    Arctan = 35,
    Arctan2 = 36,
    Sinh = 37,
    Cosh = 38,
    Tanh = 39,
    Log = 40,

    // Rounding
    Ceil = 50,
    Floor = 51,
    Round = 52,
    Trunc = 53,
    Frac = 54,
    Sign = 55,

    // Utility
    Min = 60,
    Max = 61,
    Clamp = 62,
    Lerp = 63,
    LerpClamped = 64,
    Remap = 65,
    Unlerp = 66,
    UnlerpClamped = 67,
    Degree = 68,
    Radian = 69,
    Random = 70,
    RandomInteger = 71,

    // Memory access
    Get = 80,
    Set = 81,
    GetShifted = 82,
    SetShifted = 83,
    GetPointed = 84,
    SetPointed = 85,
    IncrementPre = 86,
    IncrementPost = 87,
    IncrementPreShifted = 88,
    IncrementPostShifted = 89,
    IncrementPrePointed = 90,
    IncrementPostPointed = 91,

    // Control
    If = 100,
    Switch = 101,
    SwitchWithDefault = 102,
    SwitchInteger = 103,
    SwitchIntegerWithDefault = 104,
    While = 105,
    DoWhile = 106,
    Block = 107,
    Break = 108,
    JumpLoop = 109,
    Execute = 110,
    Execute0 = 111,

    // Debug
    DebugLog = 120,
    DebugPause = 121,
}

impl Op {
    /// Result depends only on argument values; free to CSE/inline/reorder.
    pub fn is_pure(self) -> bool {
        use Op::*;
        match self {
            Add | Subtract | Multiply | Divide | Mod | Rem | Power | Negate | Abs | Equal
            | NotEqual | Less | LessOr | Greater | GreaterOr | And | Or | Not | Sin | Cos
            | Tan | Arcsin | Arccos | Arctan | Arctan2 | Sinh | Cosh | Tanh | Log | Ceil
            | Floor | Round | Trunc | Frac | Sign | Min | Max | Clamp | Lerp | LerpClamped
            | Remap | Unlerp | UnlerpClamped | Degree | Radian | Get | GetShifted
            | GetPointed => true,
            // Random/RandomInteger are not pure: repeated calls are not
            // required to agree.
            Random | RandomInteger => false,
            Set | SetShifted | SetPointed | IncrementPre | IncrementPost
            | IncrementPreShifted | IncrementPostShifted | IncrementPrePointed
            | IncrementPostPointed => false,
            If | Switch | SwitchWithDefault | SwitchInteger | SwitchIntegerWithDefault
            | While | DoWhile | Block | Break | JumpLoop | Execute | Execute0 => false,
            DebugLog | DebugPause => false,
        }
    }

    /// Execution is observable and must survive even if its result is dead.
    pub fn has_side_effects(self) -> bool {
        use Op::*;
        match self {
            Get | GetShifted | GetPointed => false,
            Set | SetShifted | SetPointed | IncrementPre | IncrementPost
            | IncrementPreShifted | IncrementPostShifted | IncrementPrePointed
            | IncrementPostPointed => true,
            Random | RandomInteger => true,
            DebugLog | DebugPause => true,
            If | Switch | SwitchWithDefault | SwitchInteger | SwitchIntegerWithDefault
            | While | DoWhile | Block | Break | JumpLoop | Execute | Execute0 => true,
            _ => false,
        }
    }

    /// True for memory-access ops (section 4.1): these carry a place operand
    /// rather than being evaluated purely from argument values.
    pub fn is_memory_access(self) -> bool {
        use Op::*;
        matches!(
            self,
            Get | Set
                | GetShifted
                | SetShifted
                | GetPointed
                | SetPointed
                | IncrementPre
                | IncrementPost
                | IncrementPreShifted
                | IncrementPostShifted
                | IncrementPrePointed
                | IncrementPostPointed
        )
    }

    /// Evaluate a pure, non-memory, non-control op over its argument values,
    /// with IEEE-754 double semantics (section 4.10: "any other fold must be
    /// exact under the engine's numeric model").
    ///
    /// Returns `None` when the op cannot be folded at compile time:
    /// `Divide`/`Mod`/`Rem` by zero are always left unfolded (section 4.10,
    /// section 7), and impure/memory/control ops are never evaluated here.
    pub fn eval(self, args: &[f64]) -> Option<f64> {
        use Op::*;
        let a = |i: usize| args.get(i).copied();
        match self {
            Add => Some(args.iter().sum()),
            Subtract => Some(args.iter().skip(1).fold(a(0)?, |acc, v| acc - v)),
            Multiply => Some(args.iter().product()),
            Divide => {
                let d = args.iter().skip(1).fold(a(0)?, |acc, v| acc / v);
                let divisor_zero = args.iter().skip(1).any(|v| *v == 0.0);
                if divisor_zero { None } else { Some(d) }
            }
            Mod => {
                let (x, y) = (a(0)?, a(1)?);
                if y == 0.0 { None } else { Some(floored_mod(x, y)) }
            }
            Rem => {
                let (x, y) = (a(0)?, a(1)?);
                if y == 0.0 { None } else { Some(x % y) }
            }
            Power => Some(a(0)?.powf(a(1)?)),
            Negate => Some(-a(0)?),
            Abs => Some(a(0)?.abs()),
            Equal => Some(bool_f(a(0)? == a(1)?)),
            NotEqual => Some(bool_f(a(0)? != a(1)?)),
            Less => Some(bool_f(a(0)? < a(1)?)),
            LessOr => Some(bool_f(a(0)? <= a(1)?)),
            Greater => Some(bool_f(a(0)? > a(1)?)),
            GreaterOr => Some(bool_f(a(0)? >= a(1)?)),
            And => Some(bool_f(args.iter().all(|v| *v != 0.0))),
            Or => Some(bool_f(args.iter().any(|v| *v != 0.0))),
            Not => Some(bool_f(a(0)? == 0.0)),
            Sin => Some(a(0)?.sin()),
            Cos => Some(a(0)?.cos()),
            Tan => Some(a(0)?.tan()),
            Arcsin => Some(a(0)?.asin()),
            Arccos => Some(a(0)?.acos()),
            Arctan => Some(a(0)?.atan()),
            Arctan2 => Some(a(0)?.atan2(a(1)?)),
            Sinh => Some(a(0)?.sinh()),
            Cosh => Some(a(0)?.cosh()),
            Tanh => Some(a(0)?.tanh()),
            Log => Some(a(0)?.ln()),
            Ceil => Some(a(0)?.ceil()),
            Floor => Some(a(0)?.floor()),
            Round => Some(a(0)?.round_ties_even()),
            Trunc => Some(a(0)?.trunc()),
            Frac => Some(a(0)?.fract()),
            Sign => Some(a(0)?.signum() * if a(0)? == 0.0 { 0.0 } else { 1.0 }),
            Min => args.iter().copied().reduce(f64::min),
            Max => args.iter().copied().reduce(f64::max),
            Clamp => Some(a(0)?.clamp(a(1)?.min(a(2)?), a(1)?.max(a(2)?))),
            Lerp => Some(a(0)? + (a(1)? - a(0)?) * a(2)?),
            LerpClamped => {
                let t = a(2)?.clamp(0.0, 1.0);
                Some(a(0)? + (a(1)? - a(0)?) * t)
            }
            Remap => {
                let (v, in_lo, in_hi, out_lo, out_hi) = (a(0)?, a(1)?, a(2)?, a(3)?, a(4)?);
                if in_hi == in_lo {
                    None
                } else {
                    Some(out_lo + (v - in_lo) / (in_hi - in_lo) * (out_hi - out_lo))
                }
            }
            Unlerp => {
                let (lo, hi, v) = (a(0)?, a(1)?, a(2)?);
                if hi == lo {
                    None
                } else {
                    Some((v - lo) / (hi - lo))
                }
            }
            UnlerpClamped => {
                let (lo, hi, v) = (a(0)?, a(1)?, a(2)?);
                if hi == lo {
                    None
                } else {
                    Some(((v - lo) / (hi - lo)).clamp(0.0, 1.0))
                }
            }
            Degree => Some(a(0)?.to_degrees()),
            Radian => Some(a(0)?.to_radians()),
            _ => None,
        }
    }
}

fn bool_f(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Floored modulo: the result takes the sign of `y`, matching the engine's
/// `Op::Mod` (section 4.10) rather than Rust's `%`/`rem_euclid`, which take
/// the sign of `x` and are always non-negative respectively.
pub fn floored_mod(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Decodes a serialized node's raw `func` code back into an [`Op`] (section
/// 6 "Engine node output"). The interpreter is the only consumer; compiled
/// trees never carry a code outside this table.
impl TryFrom<u16> for Op {
    type Error = u16;

    fn try_from(func: u16) -> Result<Self, u16> {
        use Op::*;
        Ok(match func {
            0 => Add,
            1 => Subtract,
            2 => Multiply,
            3 => Divide,
            4 => Mod,
            5 => Rem,
            6 => Power,
            7 => Negate,
            8 => Abs,
            10 => Equal,
            11 => NotEqual,
            12 => Less,
            13 => LessOr,
            14 => Greater,
            15 => GreaterOr,
            20 => And,
            21 => Or,
            22 => Not,
            30 => Sin,
            31 => Cos,
            32 => Tan,
            33 => Arcsin,
            34 => Arccos,
            35 => Arctan,
            36 => Arctan2,
            37 => Sinh,
            38 => Cosh,
            39 => Tanh,
            40 => Log,
            50 => Ceil,
            51 => Floor,
            52 => Round,
            53 => Trunc,
            54 => Frac,
            55 => Sign,
            60 => Min,
            61 => Max,
            62 => Clamp,
            63 => Lerp,
            64 => LerpClamped,
            65 => Remap,
            66 => Unlerp,
            67 => UnlerpClamped,
            68 => Degree,
            69 => Radian,
            70 => Random,
            71 => RandomInteger,
            80 => Get,
            81 => Set,
            82 => GetShifted,
            83 => SetShifted,
            84 => GetPointed,
            85 => SetPointed,
            86 => IncrementPre,
            87 => IncrementPost,
            88 => IncrementPreShifted,
            89 => IncrementPostShifted,
            90 => IncrementPrePointed,
            91 => IncrementPostPointed,
            100 => If,
            101 => Switch,
            102 => SwitchWithDefault,
            103 => SwitchInteger,
            104 => SwitchIntegerWithDefault,
            105 => While,
            106 => DoWhile,
            107 => Block,
            108 => Break,
            109 => JumpLoop,
            110 => Execute,
            111 => Execute0,
            120 => DebugLog,
            121 => DebugPause,
            other => return Err(other),
        })
    }
}
