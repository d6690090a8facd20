// ⚠️ Calculator Errors
// One error type for the whole evaluation pipeline

use thiserror::Error;

/// Every way an expression can be rejected or fail to evaluate.
///
/// All variants are recoverable and deterministic: the same input always
/// produces the same variant. Callers translate them into a client error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("Empty expression")]
    EmptyExpression,

    #[error("Invalid or unsafe expression")]
    UnsafeExpression,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Number too large")]
    Overflow,

    #[error("Complex numbers not supported")]
    ComplexResultUnsupported,

    #[error("Result is infinity")]
    ResultOverflow,

    #[error("Result is not a number")]
    ResultUndefined,

    #[error("Calculation error: {0}")]
    EvaluationError(String),
}

impl CalcError {
    /// Stable machine-readable code (used in API responses)
    pub fn kind(&self) -> &'static str {
        match self {
            CalcError::EmptyExpression => "empty_expression",
            CalcError::UnsafeExpression => "unsafe_expression",
            CalcError::DivisionByZero => "division_by_zero",
            CalcError::Overflow => "overflow",
            CalcError::ComplexResultUnsupported => "complex_result_unsupported",
            CalcError::ResultOverflow => "result_overflow",
            CalcError::ResultUndefined => "result_undefined",
            CalcError::EvaluationError(_) => "evaluation_error",
        }
    }

    pub(crate) fn eval(msg: impl Into<String>) -> Self {
        CalcError::EvaluationError(msg.into())
    }
}

pub type CalcResult<T> = Result<T, CalcError>;
