// 🧹 Expression Preparation
// Text rewriting and fail-closed validation that run before any parsing.
//
// Each step is total and applied once, in this order:
//   clean -> implicit '*' -> constants -> '*' before functions
//   -> auto-close ')' -> allow-list / deny-list

use crate::error::{CalcError, CalcResult};
use crate::vocabulary::{is_function, lookup_constant};

/// Substrings that are never allowed, whatever the character set says
const DENIED_SUBSTRINGS: &[&str] = &[
    "__",
    "import",
    "exec",
    "eval",
    "open",
    "file",
    "input",
    "raw_input",
    "globals",
    "locals",
    "vars",
    "dir",
    "help",
];

/// Run every preparation step. Returns the validated expression text.
pub fn prepare(expression: &str) -> CalcResult<String> {
    let cleaned = insert_implicit_multiplication(&clean_expression(expression));
    if cleaned.is_empty() {
        return Err(CalcError::EmptyExpression);
    }

    let substituted = substitute_constants(&cleaned);
    let with_functions = insert_function_multiplication(&substituted);
    let balanced = close_parentheses(&with_functions);

    validate(&balanced)?;
    Ok(balanced)
}

// ============================================================================
// STEP 1: TEXT FORM
// ============================================================================

/// Collapse whitespace, map calculator symbols, turn a lone `^` into `**`,
/// then drop all whitespace.
pub fn clean_expression(expression: &str) -> String {
    let collapsed = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    let replaced = collapsed.replace('×', "*").replace('÷', "/");

    let chars: Vec<char> = replaced.chars().collect();
    let mut out = String::with_capacity(replaced.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '^' {
            let after_star = i > 0 && chars[i - 1] == '*';
            let before_star = chars.get(i + 1) == Some(&'*');
            if !after_star && !before_star {
                out.push_str("**");
                continue;
            }
        }
        out.push(c);
    }

    out.retain(|c| !c.is_whitespace());
    out
}

// ============================================================================
// STEP 2: IMPLICIT MULTIPLICATION
// ============================================================================

/// `2(` -> `2*(`, `)2` -> `)*2`, `)(` -> `)*(`.
/// Digit followed by a letter is left alone.
pub fn insert_implicit_multiplication(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 4);
    let mut prev: Option<char> = None;

    for c in expression.chars() {
        if let Some(p) = prev {
            let digit_open = p.is_ascii_digit() && c == '(';
            let close_digit = p == ')' && c.is_ascii_digit();
            let close_open = p == ')' && c == '(';
            if digit_open || close_digit || close_open {
                out.push('*');
            }
        }
        out.push(c);
        prev = Some(c);
    }

    out
}

// ============================================================================
// IDENTIFIER RUNS
// ============================================================================

fn is_ident_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Split text into alternating identifier / non-identifier segments
fn segments(expression: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (idx, c) in expression.char_indices() {
        let ident = is_ident_char(c);
        match current {
            Some(kind) if kind == ident => {}
            Some(kind) => {
                out.push((kind, &expression[start..idx]));
                start = idx;
                current = Some(ident);
            }
            None => current = Some(ident),
        }
    }
    if let Some(kind) = current {
        out.push((kind, &expression[start..]));
    }

    out
}

// ============================================================================
// STEP 3: CONSTANTS
// ============================================================================

/// Replace whole identifiers `pi`, `π`, `e` with their literal values.
/// A literal glued to a number or parenthesis gets an explicit `*`.
pub fn substitute_constants(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 16);
    let parts = segments(expression);

    for (i, (ident, text)) in parts.iter().enumerate() {
        let constant = if *ident { lookup_constant(text) } else { None };
        let Some(constant) = constant else {
            out.push_str(text);
            continue;
        };

        if matches!(out.chars().next_back(), Some(c) if c.is_ascii_digit() || c == '.' || c == ')') {
            out.push('*');
        }
        out.push_str(&constant.value.to_string());

        let next = parts.get(i + 1).and_then(|(_, t)| t.chars().next());
        if matches!(next, Some(c) if c.is_ascii_digit() || c == '.' || c == '(') {
            out.push('*');
        }
    }

    out
}

// ============================================================================
// STEP 4: FUNCTION-CALL MULTIPLICATION
// ============================================================================

/// `2sqrt(4)` -> `2*sqrt(4)`, `(1)sin(0)` -> `(1)*sin(0)`
pub fn insert_function_multiplication(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 4);

    for (ident, text) in segments(expression) {
        if ident
            && is_function(text)
            && matches!(out.chars().next_back(), Some(c) if c.is_ascii_digit() || c == ')')
        {
            out.push('*');
        }
        out.push_str(text);
    }

    out
}

// ============================================================================
// STEP 5: PARENTHESES
// ============================================================================

/// Append missing `)`. Excess `)` is left for the parser to reject.
pub fn close_parentheses(expression: &str) -> String {
    let open = expression.chars().filter(|&c| c == '(').count();
    let close = expression.chars().filter(|&c| c == ')').count();

    let mut out = expression.to_string();
    if open > close {
        out.push_str(&")".repeat(open - close));
    }
    out
}

// ============================================================================
// STEP 6: VALIDATION
// ============================================================================

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.' | '_')
        || c.is_whitespace()
}

/// Character allow-list plus case-insensitive substring deny-list
pub fn validate(expression: &str) -> CalcResult<()> {
    if !expression.chars().all(is_allowed_char) {
        return Err(CalcError::UnsafeExpression);
    }

    let lowered = expression.to_ascii_lowercase();
    if DENIED_SUBSTRINGS.iter().any(|denied| lowered.contains(denied)) {
        return Err(CalcError::UnsafeExpression);
    }

    Ok(())
}
