// 🧮 Tree evaluation
// Integer arithmetic is checked and falls back to floating point on i64 overflow.

use crate::error::{CalcError, CalcResult};
use crate::vocabulary::{BinaryOp, Function};

use super::ast::{Expr, UnaryOp};
use super::number::Number;

fn domain_error() -> CalcError {
    CalcError::eval("math domain error")
}

impl Expr {
    /// Evaluate the tree. The result is not yet normalized.
    pub fn eval(&self) -> CalcResult<Number> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Constant { value, .. } => Ok(Number::Float(*value)),
            Expr::Unary { op, operand } => {
                let value = operand.eval()?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Neg => negate(value),
                })
            }
            Expr::Binary { op, lhs, rhs } => apply_binary(*op, lhs.eval()?, rhs.eval()?),
            Expr::Call { function, args } => {
                let values = args.iter().map(Expr::eval).collect::<CalcResult<Vec<_>>>()?;
                apply_function(*function, &values)
            }
        }
    }
}

fn negate(value: Number) -> Number {
    match value {
        Number::Integer(i) => i
            .checked_neg()
            .map(Number::Integer)
            .unwrap_or(Number::Float(-(i as f64))),
        Number::Float(f) => Number::Float(-f),
    }
}

// ============================================================================
// BINARY OPERATORS
// ============================================================================

pub fn apply_binary(op: BinaryOp, lhs: Number, rhs: Number) -> CalcResult<Number> {
    use Number::{Float, Integer};

    match op {
        BinaryOp::Add => Ok(match (lhs, rhs) {
            (Integer(a), Integer(b)) => a.checked_add(b).map(Integer).unwrap_or(Float(a as f64 + b as f64)),
            _ => Float(lhs.as_f64() + rhs.as_f64()),
        }),
        BinaryOp::Sub => Ok(match (lhs, rhs) {
            (Integer(a), Integer(b)) => a.checked_sub(b).map(Integer).unwrap_or(Float(a as f64 - b as f64)),
            _ => Float(lhs.as_f64() - rhs.as_f64()),
        }),
        BinaryOp::Mul => Ok(match (lhs, rhs) {
            (Integer(a), Integer(b)) => a.checked_mul(b).map(Integer).unwrap_or(Float(a as f64 * b as f64)),
            _ => Float(lhs.as_f64() * rhs.as_f64()),
        }),
        BinaryOp::Div => {
            if rhs.is_zero() {
                return Err(CalcError::DivisionByZero);
            }
            Ok(Float(lhs.as_f64() / rhs.as_f64()))
        }
        BinaryOp::Mod => floored_mod(lhs, rhs),
        BinaryOp::Pow => power(lhs, rhs),
    }
}

/// Remainder takes the sign of the divisor
fn floored_mod(lhs: Number, rhs: Number) -> CalcResult<Number> {
    if rhs.is_zero() {
        return Err(CalcError::DivisionByZero);
    }

    if let (Number::Integer(a), Number::Integer(b)) = (lhs, rhs) {
        if let Some(mut r) = a.checked_rem(b) {
            if r != 0 && (r < 0) != (b < 0) {
                r += b;
            }
            return Ok(Number::Integer(r));
        }
    }

    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    let mut r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r += b;
    }
    Ok(Number::Float(r))
}

fn power(base: Number, exponent: Number) -> CalcResult<Number> {
    if let (Number::Integer(b), Number::Integer(e)) = (base, exponent) {
        if e >= 0 {
            let exact = u32::try_from(e).ok().and_then(|e| b.checked_pow(e));
            if let Some(value) = exact {
                return Ok(Number::Integer(value));
            }
        }
    }

    let (b, e) = (base.as_f64(), exponent.as_f64());

    if b == 0.0 && e < 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    if b < 0.0 && e.is_finite() && e.fract() != 0.0 {
        return Err(CalcError::ComplexResultUnsupported);
    }

    let result = b.powf(e);
    if result.is_infinite() && b.is_finite() && e.is_finite() {
        return Err(CalcError::Overflow);
    }
    Ok(Number::Float(result))
}

// ============================================================================
// FUNCTIONS
// ============================================================================

/// Float -> Integer for rounding functions, which always produce integers
fn to_integer(value: f64) -> CalcResult<Number> {
    if value.is_infinite() {
        return Err(CalcError::Overflow);
    }
    if value.is_nan() {
        return Err(CalcError::eval("cannot convert NaN to integer"));
    }
    Ok(Number::from_integral(value))
}

fn trig(value: Number, f: fn(f64) -> f64) -> CalcResult<Number> {
    let x = value.as_f64();
    if x.is_infinite() {
        return Err(domain_error());
    }
    Ok(Number::Float(f(x)))
}

fn positive(value: Number) -> CalcResult<f64> {
    let x = value.as_f64();
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(x)
}

/// Arity was checked at parse time
pub fn apply_function(function: Function, args: &[Number]) -> CalcResult<Number> {
    let arg = |i: usize| -> CalcResult<Number> {
        args.get(i)
            .copied()
            .ok_or_else(|| CalcError::eval("missing function argument"))
    };

    match function {
        Function::Sin => trig(arg(0)?, f64::sin),
        Function::Cos => trig(arg(0)?, f64::cos),
        Function::Tan => trig(arg(0)?, f64::tan),
        Function::Sqrt => {
            let x = arg(0)?.as_f64();
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Number::Float(x.sqrt()))
        }
        Function::Log => Ok(Number::Float(positive(arg(0)?)?.log10())),
        Function::Ln => {
            let x = positive(arg(0)?)?;
            match args.get(1) {
                None => Ok(Number::Float(x.ln())),
                Some(base) => {
                    let base = positive(*base)?;
                    if base == 1.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    Ok(Number::Float(x.ln() / base.ln()))
                }
            }
        }
        Function::Abs => Ok(match arg(0)? {
            Number::Integer(i) => i
                .checked_abs()
                .map(Number::Integer)
                .unwrap_or(Number::Float((i as f64).abs())),
            Number::Float(f) => Number::Float(f.abs()),
        }),
        Function::Round => round(arg(0)?, args.get(1).copied()),
        Function::Floor => match arg(0)? {
            n @ Number::Integer(_) => Ok(n),
            Number::Float(f) => to_integer(f.floor()),
        },
        Function::Ceil => match arg(0)? {
            n @ Number::Integer(_) => Ok(n),
            Number::Float(f) => to_integer(f.ceil()),
        },
        Function::Pow => power(arg(0)?, arg(1)?),
        Function::Min => extreme(args, |candidate, best| candidate < best),
        Function::Max => extreme(args, |candidate, best| candidate > best),
    }
}

/// Half-to-even rounding, optionally to a number of decimal digits
fn round(value: Number, digits: Option<Number>) -> CalcResult<Number> {
    let Some(digits) = digits else {
        return match value {
            Number::Integer(_) => Ok(value),
            Number::Float(f) => to_integer(f.round_ties_even()),
        };
    };

    let Number::Integer(ndigits) = digits else {
        return Err(CalcError::eval("round() digit count must be an integer"));
    };
    if let Number::Integer(_) = value {
        if ndigits >= 0 {
            return Ok(value);
        }
    }

    let x = value.as_f64();
    if !x.is_finite() {
        return Ok(Number::Float(x));
    }
    let factor = 10f64.powi(ndigits.clamp(-308, 308) as i32);
    Ok(Number::Float((x * factor).round_ties_even() / factor))
}

/// First argument that beats every other one under `better`
fn extreme(args: &[Number], better: fn(f64, f64) -> bool) -> CalcResult<Number> {
    let mut iter = args.iter().copied();
    let mut best = iter
        .next()
        .ok_or_else(|| CalcError::eval("expected at least one argument"))?;

    for candidate in iter {
        if better(candidate.as_f64(), best.as_f64()) {
            best = candidate;
        }
    }
    Ok(best)
}
