//! Conditions and text interpolation over run variables
//!
//! A condition is a single operand or a binary comparison:
//!
//! ```text
//! $logged_in
//! $count >= 3
//! ${title} contains "Welcome"
//! ```
//!
//! Operands are variable references (`$name` or `${name}`), numbers, quoted
//! strings and the literals `true`, `false` and `null`.

use std::cmp::Ordering;

use serde_json::Value;

use crate::common::{Error, Result};
use crate::variables::VariableStore;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Var(String),
    Literal(Value),
    Op(Op),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

/// Evaluate `condition` against the store
pub fn evaluate(condition: &str, vars: &VariableStore) -> Result<bool> {
    let tokens = tokenize(condition)?;
    match tokens.as_slice() {
        [operand] => Ok(truthy(&resolve(operand, vars)?)),
        [lhs, Token::Op(op), rhs] => {
            let lhs = resolve(lhs, vars)?;
            let rhs = resolve(rhs, vars)?;
            compare(&lhs, *op, &rhs)
        }
        [] => Err(Error::Expression("empty condition".to_string())),
        _ => Err(Error::Expression(format!(
            "expected '<operand>' or '<operand> <op> <operand>', got '{}'",
            condition
        ))),
    }
}

/// Replace every `${name}` in `text` with the variable's value
///
/// String values are inserted without quotes; other values use their JSON
/// form. `$$` produces a literal `$`.
pub fn interpolate(text: &str, vars: &VariableStore) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body
                .find('}')
                .ok_or_else(|| Error::Expression(format!("unterminated '${{' in '{}'", text)))?;
            let name = &body[..end];
            let value = vars
                .value(name)
                .ok_or_else(|| Error::Expression(format!("unknown variable '{}'", name)))?;
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve(token: &Token, vars: &VariableStore) -> Result<Value> {
    match token {
        Token::Var(name) => vars
            .value(name)
            .cloned()
            .ok_or_else(|| Error::Expression(format!("unknown variable '{}'", name))),
        Token::Literal(value) => Ok(value.clone()),
        Token::Op(op) => Err(Error::Expression(format!("unexpected operator {:?}", op))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(lhs: &Value, op: Op, rhs: &Value) -> Result<bool> {
    if op == Op::Contains {
        return match (lhs, rhs) {
            (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Array(items), needle) => Ok(items.iter().any(|item| loosely_equal(item, needle))),
            _ => Err(Error::Expression(
                "'contains' needs a string or array on the left".to_string(),
            )),
        };
    }

    if matches!(op, Op::Eq | Op::Ne) {
        let equal = loosely_equal(lhs, rhs);
        return Ok(if op == Op::Eq { equal } else { !equal });
    }

    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| Error::Expression(format!("cannot order {} and {}", lhs, rhs)))?;

    Ok(match op {
        Op::Lt => ordering == Ordering::Less,
        Op::Le => ordering != Ordering::Greater,
        Op::Gt => ordering == Ordering::Greater,
        Op::Ge => ordering != Ordering::Less,
        Op::Eq | Op::Ne | Op::Contains => unreachable!("handled above"),
    })
}

// 1 and 1.0 are the same number
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '$' => {
                i += 1;
                let name: String = if chars.get(i) == Some(&'{') {
                    let start = i + 1;
                    let end = (start..chars.len())
                        .find(|&j| chars[j] == '}')
                        .ok_or_else(|| Error::Expression("unterminated '${'".to_string()))?;
                    i = end + 1;
                    chars[start..end].iter().collect()
                } else {
                    let start = i;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    chars[start..i].iter().collect()
                };
                if name.is_empty() {
                    return Err(Error::Expression("empty variable name".to_string()));
                }
                tokens.push(Token::Var(name));
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let end = (start..chars.len())
                    .find(|&j| chars[j] == quote)
                    .ok_or_else(|| Error::Expression("unterminated string".to_string()))?;
                tokens.push(Token::Literal(Value::String(chars[start..end].iter().collect())));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => (Op::Eq, 2),
                    ('!', Some('=')) => (Op::Ne, 2),
                    ('<', Some('=')) => (Op::Le, 2),
                    ('>', Some('=')) => (Op::Ge, 2),
                    ('<', _) => (Op::Lt, 1),
                    ('>', _) => (Op::Gt, 1),
                    _ => {
                        return Err(Error::Expression(format!("unknown operator at '{}'", c)));
                    }
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && !"=!<>".contains(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(word_token(&word)?);
            }
        }
    }

    Ok(tokens)
}

fn word_token(word: &str) -> Result<Token> {
    Ok(match word {
        "contains" => Token::Op(Op::Contains),
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        "null" => Token::Literal(Value::Null),
        _ => {
            let number: serde_json::Number = word
                .parse()
                .map_err(|_| Error::Expression(format!("unexpected '{}'", word)))?;
            Token::Literal(Value::Number(number))
        }
    })
}
