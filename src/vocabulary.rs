// 📚 Vocabulary - Operators, functions and constants as data
// The only names an expression is allowed to refer to

use serde::Serialize;

// ============================================================================
// OPERATORS
// ============================================================================

/// Binary arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
}

impl BinaryOp {
    /// Canonical ASCII symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::Mod => "%",
        }
    }
}

/// Operator table. Multi-character symbols come first so a scan that takes
/// the first match always takes the longest one.
pub static OPERATORS: &[(&str, BinaryOp)] = &[
    ("**", BinaryOp::Pow),
    ("+", BinaryOp::Add),
    ("-", BinaryOp::Sub),
    ("*", BinaryOp::Mul),
    ("×", BinaryOp::Mul),
    ("/", BinaryOp::Div),
    ("÷", BinaryOp::Div),
    ("^", BinaryOp::Pow),
    ("%", BinaryOp::Mod),
];

/// Find the operator whose symbol starts `text`, with the symbol's byte length
pub fn match_operator(text: &str) -> Option<(BinaryOp, usize)> {
    OPERATORS
        .iter()
        .find(|(symbol, _)| text.starts_with(symbol))
        .map(|(symbol, op)| (*op, symbol.len()))
}

pub fn lookup_operator(symbol: &str) -> Option<BinaryOp> {
    OPERATORS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, op)| *op)
}

// ============================================================================
// FUNCTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Log,
    Ln,
    Abs,
    Round,
    Floor,
    Ceil,
    Pow,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    pub function: Function,
    pub min_args: usize,
    /// None = variadic
    pub max_args: Option<usize>,
    pub description: &'static str,
}

impl FunctionDef {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }
}

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "sin", function: Function::Sin, min_args: 1, max_args: Some(1), description: "Sine function (radians)" },
    FunctionDef { name: "cos", function: Function::Cos, min_args: 1, max_args: Some(1), description: "Cosine function (radians)" },
    FunctionDef { name: "tan", function: Function::Tan, min_args: 1, max_args: Some(1), description: "Tangent function (radians)" },
    FunctionDef { name: "sqrt", function: Function::Sqrt, min_args: 1, max_args: Some(1), description: "Square root" },
    FunctionDef { name: "log", function: Function::Log, min_args: 1, max_args: Some(1), description: "Base-10 logarithm" },
    FunctionDef { name: "ln", function: Function::Ln, min_args: 1, max_args: Some(2), description: "Natural logarithm" },
    FunctionDef { name: "abs", function: Function::Abs, min_args: 1, max_args: Some(1), description: "Absolute value" },
    FunctionDef { name: "round", function: Function::Round, min_args: 1, max_args: Some(2), description: "Round to nearest integer" },
    FunctionDef { name: "floor", function: Function::Floor, min_args: 1, max_args: Some(1), description: "Round down to integer" },
    FunctionDef { name: "ceil", function: Function::Ceil, min_args: 1, max_args: Some(1), description: "Round up to integer" },
    FunctionDef { name: "pow", function: Function::Pow, min_args: 2, max_args: Some(2), description: "Power (x raised to y)" },
    FunctionDef { name: "min", function: Function::Min, min_args: 2, max_args: None, description: "Smallest argument" },
    FunctionDef { name: "max", function: Function::Max, min_args: 2, max_args: None, description: "Largest argument" },
];

/// Function names are matched in lowercase only
pub fn lookup_function(name: &str) -> Option<&'static FunctionDef> {
    FUNCTIONS.iter().find(|def| def.name == name)
}

pub fn is_function(name: &str) -> bool {
    lookup_function(name).is_some()
}

// ============================================================================
// CONSTANTS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ConstantDef {
    pub name: &'static str,
    pub value: f64,
    pub description: &'static str,
}

pub static CONSTANTS: &[ConstantDef] = &[
    ConstantDef { name: "pi", value: std::f64::consts::PI, description: "Pi (3.14159...)" },
    ConstantDef { name: "π", value: std::f64::consts::PI, description: "Pi (3.14159...)" },
    ConstantDef { name: "e", value: std::f64::consts::E, description: "Euler's number (2.71828...)" },
];

pub fn lookup_constant(name: &str) -> Option<&'static ConstantDef> {
    CONSTANTS.iter().find(|def| def.name == name)
}

// ============================================================================
// LISTINGS (for the API)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstantInfo {
    pub name: &'static str,
    pub value: f64,
}

pub fn functions_list() -> Vec<FunctionInfo> {
    FUNCTIONS
        .iter()
        .map(|def| FunctionInfo {
            name: def.name,
            description: def.description,
        })
        .collect()
}

pub fn constants_list() -> Vec<ConstantInfo> {
    CONSTANTS
        .iter()
        .map(|def| ConstantInfo {
            name: def.name,
            value: def.value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(match_operator("**3"), Some((BinaryOp::Pow, 2)));
        assert_eq!(match_operator("*3"), Some((BinaryOp::Mul, 1)));
        assert_eq!(match_operator("÷2"), Some((BinaryOp::Div, "÷".len())));
        assert_eq!(match_operator("3"), None);
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(lookup_operator("^"), lookup_operator("**"));
        assert_eq!(lookup_operator("×"), Some(BinaryOp::Mul));
        assert_eq!(lookup_operator("%"), Some(BinaryOp::Mod));
        assert_eq!(lookup_operator("//"), None);
    }

    #[test]
    fn test_function_arity() {
        let sqrt = lookup_function("sqrt").unwrap();
        assert!(sqrt.accepts(1));
        assert!(!sqrt.accepts(2));

        let max = lookup_function("max").unwrap();
        assert!(!max.accepts(1));
        assert!(max.accepts(7));

        assert!(lookup_function("SQRT").is_none());
        assert!(lookup_function("exp").is_none());
    }

    #[test]
    fn test_constants() {
        assert_eq!(lookup_constant("π").unwrap().value, lookup_constant("pi").unwrap().value);
        assert!(lookup_constant("E").is_none());
        assert_eq!(constants_list().len(), 3);
        assert_eq!(functions_list().len(), 13);
    }
}
