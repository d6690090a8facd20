// Safe Expression Evaluator
//
// prepare (rewrite + allow-list/deny-list) -> tokenize -> parse -> eval -> normalize
//
// Nothing here reaches a general-purpose interpreter: the only names an
// expression can refer to are the entries of the vocabulary tables.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod number;
pub mod prepare;

pub use ast::{parse_expression, Expr, UnaryOp};
pub use number::Number;
pub use prepare::prepare;

use crate::error::CalcResult;

/// Evaluate a typed (or already voice-normalized) expression.
///
/// Fails with the `CalcError` taxonomy; never panics on user input.
pub fn evaluate_expression(expression: &str) -> CalcResult<Number> {
    let prepared = prepare(expression)?;
    let tree = parse_expression(&prepared)?;
    tree.eval()?.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;

    fn int(i: i64) -> CalcResult<Number> {
        Ok(Number::Integer(i))
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate_expression("2+3*4"), int(14));
        assert_eq!(evaluate_expression("(2+3)*4"), int(20));
        assert_eq!(evaluate_expression("10/2"), int(5));
        assert_eq!(evaluate_expression("10/4"), Ok(Number::Float(2.5)));
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(evaluate_expression("sqrt(16)"), int(4));
        assert_eq!(evaluate_expression("sin(pi/2)"), int(1));
        assert_eq!(evaluate_expression("abs(-5)"), int(5));
        assert_eq!(evaluate_expression("round(3.7)"), int(4));
        assert_eq!(evaluate_expression("ceil(2.1)"), int(3));
        assert_eq!(
            evaluate_expression("2*pi"),
            Ok(Number::Float(2.0 * std::f64::consts::PI))
        );
        assert_eq!(
            evaluate_expression("e^2"),
            Ok(Number::Float(std::f64::consts::E.powf(2.0)))
        );
    }

    #[test]
    fn test_caret_and_double_star_agree() {
        assert_eq!(evaluate_expression("2^3"), int(8));
        assert_eq!(evaluate_expression("2**3"), int(8));
        assert_eq!(evaluate_expression("2 ^ 3"), int(8));
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(evaluate_expression("2(3+4)"), int(14));
        assert_eq!(evaluate_expression("(1+1)(2+2)"), int(8));
        assert_eq!(evaluate_expression("2sqrt(9)"), int(6));
        assert_eq!(evaluate_expression("3pi"), evaluate_expression("3*pi"));
    }

    #[test]
    fn test_unicode_operators() {
        assert_eq!(evaluate_expression("6 × 7"), int(42));
        assert_eq!(evaluate_expression("9 ÷ 3"), int(3));
    }

    #[test]
    fn test_auto_close() {
        assert_eq!(evaluate_expression("sqrt(16"), int(4));
        assert_eq!(evaluate_expression("2*(3+(4"), int(14));
    }

    #[test]
    fn test_near_zero_collapses() {
        assert_eq!(evaluate_expression("sin(pi)"), int(0));
        assert_eq!(evaluate_expression("0.1+0.2-0.3"), int(0));
    }

    #[test]
    fn test_failure_taxonomy() {
        assert_eq!(evaluate_expression(""), Err(CalcError::EmptyExpression));
        assert_eq!(evaluate_expression("   "), Err(CalcError::EmptyExpression));
        assert_eq!(evaluate_expression("10/0"), Err(CalcError::DivisionByZero));
        assert_eq!(
            evaluate_expression("__import__('os')"),
            Err(CalcError::UnsafeExpression)
        );
        assert_eq!(evaluate_expression("exec(1)"), Err(CalcError::UnsafeExpression));
        assert_eq!(evaluate_expression("5%2"), Err(CalcError::UnsafeExpression));
        assert_eq!(evaluate_expression("10**400"), Err(CalcError::Overflow));
        assert_eq!(
            evaluate_expression("(0-8)**(1/3)"),
            Err(CalcError::ComplexResultUnsupported)
        );
        assert!(matches!(
            evaluate_expression("2+*3"),
            Err(CalcError::EvaluationError(_))
        ));
        assert!(matches!(
            evaluate_expression("x+1"),
            Err(CalcError::EvaluationError(_))
        ));
    }

    #[test]
    fn test_result_overflow() {
        let huge = format!("{}.0*{}.0", "9".repeat(200), "9".repeat(200));
        assert_eq!(evaluate_expression(&huge), Err(CalcError::ResultOverflow));
    }

    #[test]
    fn test_idempotent_on_own_output() {
        for input in ["2+3*4", "10/4", "1/3", "-7/2", "2**70", "sqrt(2)"] {
            let first = evaluate_expression(input).unwrap();
            let again = evaluate_expression(&first.to_string()).unwrap();
            assert_eq!(first, again, "re-evaluating {} changed the value", input);
        }
    }
}
