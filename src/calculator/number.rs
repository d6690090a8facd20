// Numeric values produced by the evaluator

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CalcError, CalcResult};

/// Magnitudes below this collapse to exactly zero
pub const ZERO_THRESHOLD: f64 = 1e-10;

/// Integer or floating point value.
///
/// Serializes untagged so API responses carry a plain JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Integer(i) => *i == 0,
            Number::Float(f) => *f == 0.0,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Number::Integer(_))
    }

    /// Integral float -> Integer when it fits in i64, otherwise left as Float
    pub fn from_integral(value: f64) -> Number {
        // 2^63 is exactly representable; anything at or past it does not fit
        if value >= -9_223_372_036_854_775_808.0 && value < 9_223_372_036_854_775_808.0 {
            Number::Integer(value as i64)
        } else {
            Number::Float(value)
        }
    }

    /// Final result normalization: finite only, near-zero to 0, integral to Integer
    pub fn normalize(self) -> CalcResult<Number> {
        let value = match self {
            Number::Integer(_) => return Ok(self),
            Number::Float(f) => f,
        };

        if value.is_nan() {
            return Err(CalcError::ResultUndefined);
        }
        if value.is_infinite() {
            return Err(CalcError::ResultOverflow);
        }
        if value.abs() < ZERO_THRESHOLD {
            return Ok(Number::Integer(0));
        }
        if value.fract() == 0.0 {
            return Ok(Number::from_integral(value));
        }

        Ok(Number::Float(value))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}
