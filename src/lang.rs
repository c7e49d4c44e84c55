//! A small, self-contained expression language for bracket keys, filter
//! predicates and script bodies.
//!
//! This is the default host behind the [`ExpressionParser`] boundary:
//! literals, comparison and boolean operators, arithmetic, function calls
//! and nested `$`/`@` paths. Embedders with a richer expression engine
//! implement [`ExpressionParser`] themselves and plug it into
//! [`Language`](crate::Language).

use std::sync::Arc;

use crate::Options;
use crate::error::{EvalError, ParseError};
use crate::expr::{EvalContext, Evaluable, ExpressionParser, OutputMode};
use crate::functions::{FunctionRegistry, PathFunction};
use crate::parser::{lex_identifier, parse_current_path, parse_root_path};
use crate::path::CompiledPath;
use crate::value::Value;

/// A parsed expression of the basic language.
#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Value),
    /// An embedded `$` or `@` path.
    Path(CompiledPath),
    /// `#` (all captured keys) or `#i` (the i-th captured key); only parsed
    /// when the placeholder extension is enabled.
    Placeholder(Option<usize>),
    FunctionCall {
        name: String,
        func: PathFunction,
        args: Vec<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl Evaluable for Expression {
    fn eval(&self, ctx: &EvalContext<'_>, root: &Value) -> Result<Value, EvalError> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Path(path) => {
                // Embedded paths always yield flat values; full-path
                // presentation is an outer concern.
                path.evaluate(root, &ctx.with_output(OutputMode::FlatValues))
            }
            Expression::Placeholder(None) => Ok(Value::Array(
                ctx.wildcards
                    .iter()
                    .map(|k| Value::String(k.clone()))
                    .collect(),
            )),
            Expression::Placeholder(Some(i)) => ctx
                .wildcards
                .get(*i)
                .map(|k| Value::String(k.clone()))
                .ok_or(EvalError::UnknownPlaceholder(*i)),
            Expression::FunctionCall { func, args, .. } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(arg.eval(ctx, root)?);
                }
                func(ctx, evaluated)
            }
            Expression::UnaryOp { op, expr } => {
                let v = expr.eval(ctx, root)?;
                match op {
                    UnaryOperator::Minus => match v.as_f64() {
                        Some(n) => Ok(Value::Number(-n)),
                        None => Err(EvalError::TypeError(format!(
                            "can not negate {}",
                            v.kind()
                        ))),
                    },
                    UnaryOperator::Not => Ok(Value::Bool(!v.to_bool())),
                }
            }
            Expression::BinaryOp { left, op, right } => match op {
                BinaryOperator::Or => Ok(Value::Bool(
                    left.eval(ctx, root)?.to_bool() || right.eval(ctx, root)?.to_bool(),
                )),
                BinaryOperator::And => Ok(Value::Bool(
                    left.eval(ctx, root)?.to_bool() && right.eval(ctx, root)?.to_bool(),
                )),
                _ => apply_binary(*op, left.eval(ctx, root)?, right.eval(ctx, root)?),
            },
        }
    }
}

fn apply_binary(op: BinaryOperator, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinaryOperator::*;
    match op {
        Equals => Ok(Value::Bool(left == right)),
        NotEquals => Ok(Value::Bool(left != right)),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(EvalError::TypeError(format!(
                    "can not compare {} with {}",
                    left.kind(),
                    right.kind()
                )));
            };
            let keep = match op {
                LessThan => ordering.is_lt(),
                LessThanOrEqual => ordering.is_le(),
                GreaterThan => ordering.is_gt(),
                GreaterThanOrEqual => ordering.is_ge(),
                _ => unreachable!("checked above"),
            };
            Ok(Value::Bool(keep))
        }
        Plus => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => Err(EvalError::TypeError(format!(
                "can not add {} and {}",
                left.kind(),
                right.kind()
            ))),
        },
        Minus | Multiply | Divide | Modulo => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(EvalError::TypeError(format!(
                    "arithmetic needs numbers, got {} and {}",
                    left.kind(),
                    right.kind()
                )));
            };
            let n = match op {
                Minus => a - b,
                Multiply => a * b,
                Divide => a / b,
                Modulo => a % b,
                _ => unreachable!("checked above"),
            };
            Ok(Value::Number(n))
        }
        Or | And => unreachable!("short-circuited by the caller"),
    }
}

/// The default expression parser/evaluator plugged into
/// [`Language`](crate::Language).
#[derive(Debug, Clone)]
pub struct BasicExpressions {
    options: Options,
    functions: Arc<FunctionRegistry>,
}

impl BasicExpressions {
    pub fn new(options: Options) -> Self {
        BasicExpressions {
            options,
            functions: Arc::new(FunctionRegistry::default()),
        }
    }

    pub fn with_functions(options: Options, functions: FunctionRegistry) -> Self {
        BasicExpressions {
            options,
            functions: Arc::new(functions),
        }
    }
}

impl ExpressionParser for BasicExpressions {
    fn parse_expression<'a>(
        &self,
        input: &'a str,
    ) -> Result<(Arc<dyn Evaluable>, &'a str), ParseError> {
        let (expr, rest) = self.or_expr(input)?;
        Ok((Arc::new(expr), rest))
    }
}

type PResult<'a> = Result<(Expression, &'a str), ParseError>;

impl BasicExpressions {
    // Precedence levels, loosest first; each level folds a left-associative
    // chain of the next-tighter level.

    fn or_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.and_expr(i), |t| {
            t.strip_prefix("||").map(|r| (BinaryOperator::Or, r))
        })
    }

    fn and_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.equality_expr(i), |t| {
            t.strip_prefix("&&").map(|r| (BinaryOperator::And, r))
        })
    }

    fn equality_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.relational_expr(i), |t| {
            t.strip_prefix("==")
                .map(|r| (BinaryOperator::Equals, r))
                .or_else(|| t.strip_prefix("!=").map(|r| (BinaryOperator::NotEquals, r)))
        })
    }

    fn relational_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.additive_expr(i), |t| {
            t.strip_prefix("<=")
                .map(|r| (BinaryOperator::LessThanOrEqual, r))
                .or_else(|| {
                    t.strip_prefix(">=")
                        .map(|r| (BinaryOperator::GreaterThanOrEqual, r))
                })
                .or_else(|| t.strip_prefix('<').map(|r| (BinaryOperator::LessThan, r)))
                .or_else(|| t.strip_prefix('>').map(|r| (BinaryOperator::GreaterThan, r)))
        })
    }

    fn additive_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.multiplicative_expr(i), |t| {
            t.strip_prefix('+')
                .map(|r| (BinaryOperator::Plus, r))
                .or_else(|| t.strip_prefix('-').map(|r| (BinaryOperator::Minus, r)))
        })
    }

    fn multiplicative_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        self.binary_chain(input, |i| self.unary_expr(i), |t| {
            t.strip_prefix('*')
                .map(|r| (BinaryOperator::Multiply, r))
                .or_else(|| t.strip_prefix('/').map(|r| (BinaryOperator::Divide, r)))
                .or_else(|| t.strip_prefix('%').map(|r| (BinaryOperator::Modulo, r)))
        })
    }

    fn binary_chain<'a>(
        &self,
        input: &'a str,
        mut sub: impl FnMut(&'a str) -> PResult<'a>,
        ops: impl Fn(&'a str) -> Option<(BinaryOperator, &'a str)>,
    ) -> PResult<'a> {
        let (mut left, mut rest) = sub(input)?;
        loop {
            let t = rest.trim_start();
            match ops(t) {
                Some((op, after)) => {
                    let (right, r) = sub(after)?;
                    left = Expression::BinaryOp {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    };
                    rest = r;
                }
                None => return Ok((left, rest)),
            }
        }
    }

    fn unary_expr<'a>(&self, input: &'a str) -> PResult<'a> {
        let t = input.trim_start();
        if let Some(rest) = t.strip_prefix('-') {
            let (expr, rest) = self.unary_expr(rest)?;
            return Ok((
                Expression::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(expr),
                },
                rest,
            ));
        }
        if let Some(rest) = t.strip_prefix('!') {
            let (expr, rest) = self.unary_expr(rest)?;
            return Ok((
                Expression::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(expr),
                },
                rest,
            ));
        }
        self.primary(t)
    }

    fn primary<'a>(&self, input: &'a str) -> PResult<'a> {
        let t = input.trim_start();
        let Some(first) = t.chars().next() else {
            return Err(ParseError::Unexpected {
                context: "expression",
                expected: "a value",
                found: "end of input".to_string(),
            });
        };
        match first {
            '(' => {
                let (expr, rest) = self.or_expr(&t[1..])?;
                let u = rest.trim_start();
                let Some(rest) = u.strip_prefix(')') else {
                    return Err(ParseError::Unexpected {
                        context: "expression",
                        expected: "')'",
                        found: found(u),
                    });
                };
                Ok((expr, rest))
            }
            '\'' | '"' => {
                let (s, rest) = unquote_prefix(t)?;
                Ok((Expression::Literal(Value::String(s)), rest))
            }
            '$' => {
                let (path, rest) = parse_root_path(t, self, &self.options)?;
                Ok((Expression::Path(path), rest))
            }
            '@' => {
                let (path, rest) = parse_current_path(t, self, &self.options)?;
                Ok((Expression::Path(path), rest))
            }
            '#' if self.options.placeholders => {
                let digits: String = t[1..].chars().take_while(|c| c.is_ascii_digit()).collect();
                let rest = &t[1 + digits.len()..];
                if digits.is_empty() {
                    Ok((Expression::Placeholder(None), rest))
                } else {
                    let i = digits.parse().map_err(|e| ParseError::Expression {
                        at: snippet(t),
                        message: format!("invalid placeholder index: {e}"),
                    })?;
                    Ok((Expression::Placeholder(Some(i)), rest))
                }
            }
            c if c.is_ascii_digit() => {
                let result: nom::IResult<&str, f64> = nom::number::complete::double(t);
                match result {
                    Ok((rest, n)) => Ok((Expression::Literal(Value::Number(n)), rest)),
                    Err(e) => Err(ParseError::Expression {
                        at: snippet(t),
                        message: format!("invalid number: {e}"),
                    }),
                }
            }
            _ => {
                let Some((ident, rest)) = lex_identifier(t) else {
                    return Err(ParseError::Unexpected {
                        context: "expression",
                        expected: "a value",
                        found: found(t),
                    });
                };
                match ident {
                    "true" => Ok((Expression::Literal(Value::Bool(true)), rest)),
                    "false" => Ok((Expression::Literal(Value::Bool(false)), rest)),
                    "null" => Ok((Expression::Literal(Value::Null), rest)),
                    _ => self.function_call(ident, rest),
                }
            }
        }
    }

    fn function_call<'a>(&self, name: &str, input: &'a str) -> PResult<'a> {
        let t = input.trim_start();
        let Some(mut rest) = t.strip_prefix('(') else {
            return Err(ParseError::Unexpected {
                context: "expression",
                expected: "'('",
                found: found(t),
            });
        };
        let Some(func) = self.functions.get(name) else {
            return Err(ParseError::UnknownFunction(name.to_string()));
        };

        let mut args = Vec::new();
        if let Some(after) = rest.trim_start().strip_prefix(')') {
            rest = after;
        } else {
            loop {
                let (arg, r) = self.or_expr(rest)?;
                args.push(arg);
                let u = r.trim_start();
                if let Some(after) = u.strip_prefix(',') {
                    rest = after;
                } else if let Some(after) = u.strip_prefix(')') {
                    rest = after;
                    break;
                } else {
                    return Err(ParseError::Unexpected {
                        context: "function call",
                        expected: "',' or ')'",
                        found: found(u),
                    });
                }
            }
        }
        Ok((
            Expression::FunctionCall {
                name: name.to_string(),
                func,
                args,
            },
            rest,
        ))
    }
}

/// Unquotes a single- or double-quoted string literal at the front of the
/// input, handling the usual escape sequences.
fn unquote_prefix(input: &str) -> Result<(String, &str), ParseError> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('\'' | '"'))) => c,
        _ => {
            return Err(ParseError::Unexpected {
                context: "string literal",
                expected: "quote",
                found: found(input),
            });
        }
    };

    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, &input[i + c.len_utf8()..])),
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    'u' => {
                        let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                        let code = u32::from_str_radix(&hex, 16).map_err(|_| {
                            ParseError::Expression {
                                at: snippet(input),
                                message: format!("invalid unicode escape '\\u{hex}'"),
                            }
                        })?;
                        let Some(decoded) = char::from_u32(code) else {
                            return Err(ParseError::Expression {
                                at: snippet(input),
                                message: format!("invalid unicode escape '\\u{hex}'"),
                            });
                        };
                        out.push(decoded);
                    }
                    other => {
                        return Err(ParseError::Expression {
                            at: snippet(input),
                            message: format!("unknown escape '\\{other}'"),
                        });
                    }
                }
            }
            _ => out.push(c),
        }
    }
    Err(ParseError::Unexpected {
        context: "string literal",
        expected: "closing quote",
        found: "end of input".to_string(),
    })
}

fn found(t: &str) -> String {
    match t.chars().next() {
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}

fn snippet(t: &str) -> String {
    t.chars().take(20).collect()
}
