//! Reverse-polish expression evaluator.
//!
//! Expressions are whitespace-tokenized strings over floating-point literals
//! and a fixed operator set. Unknown tokens are skipped with a warning
//! rather than aborting evaluation — the dynamic-states formulas in the wild
//! rely on this leniency.

use tracing::warn;

use crate::error::{BridgeError, Result};

enum Token {
    Number(f64),
    Op(String),
}

fn tokenize(expr: &str) -> Vec<Token> {
    expr.split_whitespace()
        .map(|part| match part.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Op(part.to_string()),
        })
        .collect()
}

/// Evaluate a reverse-polish expression, returning the top of the stack.
///
/// Fails with [`BridgeError::Evaluation`] if the stack is empty at the end,
/// on a pop from an empty stack (malformed expression), or on division by
/// zero.
pub fn evaluate(expr: &str) -> Result<f64> {
    let mut stack: Vec<f64> = Vec::new();

    macro_rules! pop {
        () => {
            stack.pop().ok_or_else(|| BridgeError::Evaluation {
                details: format!("stack underflow evaluating `{expr}`"),
            })?
        };
    }

    for token in tokenize(expr) {
        match token {
            Token::Number(n) => stack.push(n),
            Token::Op(op) => match op.as_str() {
                "+" => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(a + b);
                }
                "-" => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(a - b);
                }
                "*" => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(a * b);
                }
                "/" => {
                    let b = pop!();
                    let a = pop!();
                    if b == 0.0 {
                        return Err(BridgeError::Evaluation {
                            details: format!("division by zero evaluating `{expr}`"),
                        });
                    }
                    stack.push(a / b);
                }
                "%" | "mod" => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(a % b);
                }
                "floor" => {
                    let a = pop!();
                    stack.push(a.floor());
                }
                "ceil" => {
                    let a = pop!();
                    stack.push(a.ceil());
                }
                "round" => {
                    let precision = pop!() as i32;
                    let value = pop!();
                    let factor = 10f64.powi(precision);
                    stack.push((value * factor).round() / factor);
                }
                "abs" => {
                    let a = pop!();
                    stack.push(a.abs());
                }
                "eq" => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(if a == b { 1.0 } else { 0.0 });
                }
                "not" => {
                    let a = pop!();
                    stack.push(if a != 0.0 { 0.0 } else { 1.0 });
                }
                other => {
                    warn!("rpn: invalid token {other}");
                }
            },
        }
    }

    stack.pop().ok_or_else(|| BridgeError::Evaluation {
        details: format!("empty stack after evaluating `{expr}`"),
    })
}
