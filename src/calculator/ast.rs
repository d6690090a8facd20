// 🌳 Expression tree + recursive-descent parser
//
// Grammar (Python arithmetic precedence):
//   expr    := term (('+' | '-') term)*
//   term    := unary (('*' | '/' | '%') unary)*
//   unary   := ('+' | '-') unary | power
//   power   := primary ('**' unary)?
//   primary := NUMBER | IDENT '(' args ')' | IDENT | '(' expr ')'

use crate::error::{CalcError, CalcResult};
use crate::vocabulary::{lookup_constant, lookup_function, BinaryOp, Function};

use super::lexer::{tokenize, Token};
use super::number::Number;

/// Nesting guard: deeper input is rejected instead of exhausting the stack
const MAX_DEPTH: usize = 200;

/// Operator chains build trees as deep as they are long, so length is capped too
const MAX_TOKENS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Number),
    Constant { name: &'static str, value: f64 },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { function: Function, args: Vec<Expr> },
}

/// Tokenize and parse an expression into a tree.
/// Identifiers resolve only against the function and constant tables.
pub fn parse_expression(input: &str) -> CalcResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CalcError::EmptyExpression);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(CalcError::eval("expression is too long"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;

    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(CalcError::eval(format!(
            "unexpected token '{}'",
            token.describe()
        ))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_op(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn enter(&mut self) -> CalcResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::eval("expression is nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> CalcResult<Expr> {
        self.enter()?;
        let mut lhs = self.term()?;

        while let Some(op @ (BinaryOp::Add | BinaryOp::Sub)) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }

        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> CalcResult<Expr> {
        let mut lhs = self.unary()?;

        while let Some(op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod)) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> CalcResult<Expr> {
        let op = match self.peek_op() {
            Some(BinaryOp::Add) => UnaryOp::Plus,
            Some(BinaryOp::Sub) => UnaryOp::Neg,
            _ => return self.power(),
        };
        self.pos += 1;

        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;

        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn power(&mut self) -> CalcResult<Expr> {
        let base = self.primary()?;

        if self.peek_op() == Some(BinaryOp::Pow) {
            self.pos += 1;
            self.enter()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }

        Ok(base)
    }

    fn primary(&mut self) -> CalcResult<Expr> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(CalcError::eval("missing closing parenthesis"));
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    self.call(&name)
                } else {
                    self.constant(&name)
                }
            }
            Some(token) => Err(CalcError::eval(format!(
                "unexpected token '{}'",
                token.describe()
            ))),
            None => Err(CalcError::eval("unexpected end of expression")),
        }
    }

    fn constant(&self, name: &str) -> CalcResult<Expr> {
        if let Some(def) = lookup_constant(name) {
            return Ok(Expr::Constant { name: def.name, value: def.value });
        }
        if lookup_function(name).is_some() {
            return Err(CalcError::eval(format!("function '{}' must be called", name)));
        }
        Err(CalcError::eval(format!("name '{}' is not defined", name)))
    }

    /// Called after `name(` has been consumed
    fn call(&mut self, name: &str) -> CalcResult<Expr> {
        let def = lookup_function(name)
            .ok_or_else(|| CalcError::eval(format!("name '{}' is not defined", name)))?;

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                return Err(CalcError::eval(format!(
                    "expected ',' or ')' in call to {}",
                    name
                )));
            }
        }

        if !def.accepts(args.len()) {
            return Err(CalcError::eval(format!(
                "{}() does not take {} argument(s)",
                name,
                args.len()
            )));
        }

        Ok(Expr::Call { function: def.function, args })
    }
}
