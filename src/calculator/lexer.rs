// Tokenizer for prepared expressions

use crate::error::{CalcError, CalcResult};
use crate::vocabulary::{match_operator, BinaryOp};

use super::number::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(Number),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

impl Token {
    /// Short text used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Num(n) => n.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Op(op) => op.symbol().to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

/// Tokenize an expression.
/// Supports:
/// - integers (12) and decimals (1.5, .5, 5.)
/// - every symbol of the operator table, longest match first
/// - parentheses and commas
/// - identifiers [a-zA-Z_][a-zA-Z0-9_]*
pub fn tokenize(input: &str) -> CalcResult<Vec<Token>> {
    let mut out = Vec::new();
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        match c {
            '(' => {
                out.push(Token::LParen);
                rest = &rest[1..];
                continue;
            }
            ')' => {
                out.push(Token::RParen);
                rest = &rest[1..];
                continue;
            }
            ',' => {
                out.push(Token::Comma);
                rest = &rest[1..];
                continue;
            }
            _ => {}
        }

        if let Some((op, len)) = match_operator(rest) {
            out.push(Token::Op(op));
            rest = &rest[len..];
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
                .unwrap_or(rest.len());
            out.push(Token::Num(parse_number(&rest[..len])?));
            rest = &rest[len..];
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            out.push(Token::Ident(rest[..len].to_string()));
            rest = &rest[len..];
            continue;
        }

        return Err(CalcError::eval(format!("unexpected character '{}'", c)));
    }

    Ok(out)
}

fn parse_number(literal: &str) -> CalcResult<Number> {
    let invalid = || CalcError::eval(format!("invalid number literal '{}'", literal));

    if literal == "." || literal.matches('.').count() > 1 {
        return Err(invalid());
    }

    if literal.contains('.') {
        return literal.parse::<f64>().map(Number::Float).map_err(|_| invalid());
    }

    // Integers too wide for i64 degrade to floating point
    match literal.parse::<i64>() {
        Ok(i) => Ok(Number::Integer(i)),
        Err(_) => literal.parse::<f64>().map(Number::Float).map_err(|_| invalid()),
    }
}
