// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( ("or" | "||") and )*
//! and     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | primary
//! primary := "(" or ")" | "true" | "false" | path [ op literal ]
//! ```

use serde_json::{json, Value};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

use super::ast::{CompareOp, Expression};

#[derive(Debug, Error, PartialEq)]
#[error("Invalid condition '{input}': {message}")]
pub struct ConditionError {
    pub input: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Str(String),
    Num(Value),
    Bool(bool),
    Null,
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let fail = |message: String| ConditionError {
        input: input.to_string(),
        message,
    };

    let tokens = tokenize(input).map_err(fail)?;
    if tokens.is_empty() {
        return Err(fail("empty expression".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or().map_err(fail)?;
    if let Some(token) = parser.peek() {
        return Err(fail(format!("unexpected {:?}", token)));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => tokens.push(Token::Str(read_quoted(&mut chars, c)?)),
            '=' | '!' | '>' | '<' | '&' | '|' => tokens.push(read_symbol(&mut chars)?),
            c if c.is_ascii_digit() || c == '-' => {
                let word = read_word(input, &mut chars, start);
                let number = word
                    .parse::<i64>()
                    .map(|n| json!(n))
                    .or_else(|_| word.parse::<f64>().map(|f| json!(f)))
                    .map_err(|_| format!("invalid number '{}'", word))?;
                tokens.push(Token::Num(number));
            }
            c if is_path_char(c) => {
                let word = read_word(input, &mut chars, start);
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "contains" => Token::Op(CompareOp::Contains),
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    path => Token::Path(path.to_string()),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '$' | '-')
}

fn read_word<'a>(input: &'a str, chars: &mut Peekable<CharIndices<'_>>, start: usize) -> &'a str {
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if !is_path_char(c) {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    &input[start..end]
}

fn read_quoted(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> Result<String, String> {
    chars.next();
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err("unterminated string".to_string())
}

fn read_symbol(chars: &mut Peekable<CharIndices<'_>>) -> Result<Token, String> {
    let (_, first) = chars.next().ok_or("unexpected end of input")?;
    let second = chars.peek().map(|&(_, c)| c);
    let (token, pair) = match (first, second) {
        ('=', Some('=')) => (Token::Op(CompareOp::Eq), true),
        ('!', Some('=')) => (Token::Op(CompareOp::NotEq), true),
        ('>', Some('=')) => (Token::Op(CompareOp::Gte), true),
        ('<', Some('=')) => (Token::Op(CompareOp::Lte), true),
        ('&', Some('&')) => (Token::And, true),
        ('|', Some('|')) => (Token::Or, true),
        ('>', _) => (Token::Op(CompareOp::Gt), false),
        ('<', _) => (Token::Op(CompareOp::Lt), false),
        ('!', _) => (Token::Not, false),
        (c, _) => return Err(format!("unexpected character '{}'", c)),
    };
    if pair {
        chars.next();
    }
    Ok(token)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
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

    fn parse_or(&mut self) -> Result<Expression, String> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            expr = expr.or(self.parse_and()?);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression, String> {
        let mut expr = self.parse_unary()?;
        while self.eat(&Token::And) {
            expr = expr.and(self.parse_unary()?);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, String> {
        if self.eat(&Token::Not) {
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, String> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing ')'".to_string());
                }
                Ok(expr)
            }
            Some(Token::Bool(b)) => Ok(Expression::Const(b)),
            Some(Token::Path(path)) => match self.peek() {
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.pos += 1;
                    let operand = self.parse_literal()?;
                    Ok(Expression::Compare { path, op, operand })
                }
                _ => Ok(Expression::Truthy(path)),
            },
            Some(other) => Err(format!("unexpected {:?}", other)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_literal(&mut self) -> Result<Value, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(other) => Err(format!("expected a literal, found {:?}", other)),
            None => Err("expected a literal".to_string()),
        }
    }
}
