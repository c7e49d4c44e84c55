//! Recursive-descent parser for the path grammar.
//!
//! The parser owns only the path syntax (`.`, `..`, `*`, brackets, scripts);
//! every bracket key, filter predicate and script body is handed to the host
//! [`ExpressionParser`] on the shared string cursor, so arbitrary nested
//! expressions — including further `$`/`@` paths — are allowed inside them.

use std::sync::Arc;

use nom::{
    Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::alpha1,
    combinator::recognize,
    sequence::pair,
};

use crate::Options;
use crate::error::ParseError;
use crate::expr::{Evaluable, ExpressionParser, constant};
use crate::path::{CompiledPath, Origin, PathBuilder, SelectorMode};
use crate::selector::{AmbiguousSelector, PlainSelector};
use crate::value::Value;

/// Parses a path starting at the `$` prefix, returning the compiled path and
/// the unconsumed remainder of the cursor.
pub fn parse_root_path<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    options: &Options,
) -> Result<(CompiledPath, &'a str), ParseError> {
    parse_prefixed(input, '$', Origin::Root, host, options)
}

/// Parses a path starting at the `@` prefix (the current element).
pub fn parse_current_path<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    options: &Options,
) -> Result<(CompiledPath, &'a str), ParseError> {
    parse_prefixed(input, '@', Origin::Current, host, options)
}

fn parse_prefixed<'a>(
    input: &'a str,
    prefix: char,
    origin: Origin,
    host: &dyn ExpressionParser,
    options: &Options,
) -> Result<(CompiledPath, &'a str), ParseError> {
    let t = input.trim_start();
    let rest = t.strip_prefix(prefix).ok_or_else(|| ParseError::Unexpected {
        context: "path",
        expected: if prefix == '$' { "'$'" } else { "'@'" },
        found: found(t),
    })?;

    let mode = if options.allow_missing_keys {
        SelectorMode::DropErrors
    } else {
        SelectorMode::KeepErrors
    };
    let mut builder = PathBuilder::new(origin, mode);
    let rest = parse_segments(rest, host, &mut builder)?;
    Ok((builder.finish(), rest))
}

/// The `('.' select | '[' bracket | '(' script)*` loop. Anything else ends
/// the path and stays on the cursor for the host.
fn parse_segments<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    builder: &mut PathBuilder,
) -> Result<&'a str, ParseError> {
    let mut input = input;
    loop {
        let t = input.trim_start();
        let Some(first) = t.chars().next() else {
            return Ok(input);
        };
        input = match first {
            '.' => parse_select(&t[1..], host, builder)?,
            '[' => parse_bracket(&t[1..], host, builder, false)?,
            '(' => parse_script(&t[1..], host, builder)?,
            _ => return Ok(input),
        };
    }
}

/// One selector after a `.`: an identifier child, a second `.` opening a
/// recursive descent, or `*`.
fn parse_select<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    builder: &mut PathBuilder,
) -> Result<&'a str, ParseError> {
    let t = input.trim_start();
    if let Some(rest) = t.strip_prefix('.') {
        builder.push_ambiguous(AmbiguousSelector::RecursiveDescent);
        return parse_mapper(rest, host, builder);
    }
    if let Some(rest) = t.strip_prefix('*') {
        builder.push_ambiguous(AmbiguousSelector::Wildcard);
        return parse_segments(rest, host, builder);
    }
    if let Some((ident, rest)) = lex_identifier(t) {
        builder.push_plain(
            PlainSelector::Child {
                key: constant(Value::from(ident)),
            },
            SelectorMode::KeepErrors,
        );
        return parse_segments(rest, host, builder);
    }
    Err(ParseError::Unexpected {
        context: "select",
        expected: "identifier, '.' or '*'",
        found: found(t),
    })
}

/// The selector immediately following a recursive descent (`..`). A bare
/// mapper with nothing after it is valid and matches every node.
fn parse_mapper<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    builder: &mut PathBuilder,
) -> Result<&'a str, ParseError> {
    let t = input.trim_start();
    if let Some(rest) = t.strip_prefix('[') {
        return parse_bracket(rest, host, builder, true);
    }
    if let Some(rest) = t.strip_prefix('*') {
        builder.push_ambiguous(AmbiguousSelector::Wildcard);
        return parse_segments(rest, host, builder);
    }
    if let Some(rest) = t.strip_prefix('(') {
        return parse_script(rest, host, builder);
    }
    if let Some((ident, rest)) = lex_identifier(t) {
        builder.push_plain(
            PlainSelector::Child {
                key: constant(Value::from(ident)),
            },
            SelectorMode::KeepErrors,
        );
        return parse_segments(rest, host, builder);
    }
    parse_segments(input, host, builder)
}

/// A parenthesized script stage: one host expression, closed by `)`.
fn parse_script<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    builder: &mut PathBuilder,
) -> Result<&'a str, ParseError> {
    let (script, rest) = host.parse_expression(input)?;
    let t = rest.trim_start();
    let Some(rest) = t.strip_prefix(')') else {
        return Err(ParseError::Unexpected {
            context: "script",
            expected: "')'",
            found: found(t),
        });
    };
    builder.push_plain(PlainSelector::Script { script }, SelectorMode::KeepErrors);
    parse_segments(rest, host, builder)
}

/// A bracket selector: single key, union, range, filter or wildcard,
/// discriminated by the separator found while scanning.
fn parse_bracket<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
    builder: &mut PathBuilder,
    mapper: bool,
) -> Result<&'a str, ParseError> {
    let (mut keys, separator, rest) = scan_bracket(input, host)?;
    match separator {
        ':' => {
            if mapper {
                return Err(ParseError::MapperRange);
            }
            if keys.len() > 3 {
                return Err(ParseError::RangeArity);
            }
            let defaults = [
                constant(Value::Number(0.0)),
                constant(Value::Number(i64::MAX as f64)),
                constant(Value::Number(1.0)),
            ];
            keys.extend(defaults.into_iter().skip(keys.len()));
            let mut parts = keys.into_iter();
            let (min, max, step) = match (parts.next(), parts.next(), parts.next()) {
                (Some(min), Some(max), Some(step)) => (min, max, step),
                _ => return Err(ParseError::RangeArity),
            };
            builder.push_ambiguous(AmbiguousSelector::Range { min, max, step });
        }
        '?' => {
            let [predicate] = keys.as_slice() else {
                return Err(ParseError::FilterArity);
            };
            builder.push_ambiguous(AmbiguousSelector::Filter {
                predicate: predicate.clone(),
            });
        }
        '*' => builder.push_ambiguous(AmbiguousSelector::Wildcard),
        ',' => builder.push_ambiguous(AmbiguousSelector::Union { keys }),
        _ => {
            // No separator: a single direct key.
            let [key] = keys.as_slice() else {
                return Err(ParseError::Unexpected {
                    context: "bracket",
                    expected: "exactly one key",
                    found: format!("{} keys", keys.len()),
                });
            };
            builder.push_plain(
                PlainSelector::Child { key: key.clone() },
                SelectorMode::KeepErrors,
            );
        }
    }
    parse_segments(rest, host, builder)
}

/// Scans one bracket clause, collecting the comma-, colon- or
/// filter-separated key expressions. Returns the keys, the separator
/// character (`']'` when the bracket held a single bare key), and the
/// cursor after the closing `]`. Mixing separators is rejected, naming both.
fn scan_bracket<'a>(
    input: &'a str,
    host: &dyn ExpressionParser,
) -> Result<(Vec<Arc<dyn Evaluable>>, char, &'a str), ParseError> {
    let mut input = input;
    let mut keys: Vec<Arc<dyn Evaluable>> = Vec::new();
    let mut separator: Option<char> = None;
    loop {
        let t = input.trim_start();
        let Some(first) = t.chars().next() else {
            return Err(ParseError::Unexpected {
                context: "bracket",
                expected: "']'",
                found: found(t),
            });
        };

        // Scan one key (or a structural token standing in for one).
        let mut scanned: Option<char> = None;
        let mut cursor = t;
        match first {
            '?' => {
                scanned = Some('?');
                cursor = &t[1..];
            }
            ':' => {
                // An omitted range component defaults to 0 (min) or the
                // open upper bound (max).
                let default = if keys.len() == 1 {
                    i64::MAX as f64
                } else {
                    0.0
                };
                keys.push(constant(Value::Number(default)));
                scanned = Some(':');
                cursor = &t[1..];
            }
            '*' => {
                let u = t[1..].trim_start();
                let Some(rest) = u.strip_prefix(']') else {
                    return Err(ParseError::Unexpected {
                        context: "bracket star",
                        expected: "']'",
                        found: found(u),
                    });
                };
                return Ok((Vec::new(), '*', rest));
            }
            ']' if separator == Some(':') => {
                // A trailing omitted component, as in `[1:]`.
                scanned = Some(']');
                cursor = &t[1..];
            }
            _ => {
                let (key, rest) = host.parse_expression(cursor)?;
                keys.push(key);
                cursor = rest;
            }
        }

        // When the key came from an expression, the separator still has to
        // be scanned.
        let scanned = match scanned {
            Some(c) => c,
            None => {
                let u = cursor.trim_start();
                let Some(c) = u.chars().next() else {
                    return Err(ParseError::Unexpected {
                        context: "bracket",
                        expected: "':', ',' or ']'",
                        found: found(u),
                    });
                };
                cursor = &u[1..];
                c
            }
        };

        let first_separator = *separator.get_or_insert(scanned);
        match scanned {
            ':' | ',' => {}
            ']' => return Ok((keys, first_separator, cursor)),
            '?' => {
                if !keys.is_empty() {
                    return Err(ParseError::Unexpected {
                        context: "filter",
                        expected: "']'",
                        found: "'?'".to_string(),
                    });
                }
            }
            other => {
                return Err(ParseError::Unexpected {
                    context: "bracket separator",
                    expected: "':' or ','",
                    found: format!("'{other}'"),
                });
            }
        }
        if first_separator != scanned {
            return Err(ParseError::MixedSeparators {
                first: first_separator,
                second: scanned,
            });
        }
        input = cursor;
    }
}

/// Lexes a leading identifier: a letter or `_`, then letters, digits or `_`.
pub(crate) fn lex_identifier(input: &str) -> Option<(&str, &str)> {
    let result: nom::IResult<&str, &str> = recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input);
    match result {
        Ok((rest, ident)) => Some((ident, rest)),
        Err(_) => None,
    }
}

fn found(t: &str) -> String {
    match t.chars().next() {
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::BasicExpressions;

    fn compile(path: &str) -> Result<CompiledPath, ParseError> {
        let options = Options::default();
        let host = BasicExpressions::new(options.clone());
        let (compiled, rest) = parse_root_path(path, &host, &options)?;
        assert_eq!(rest.trim(), "", "unparsed remainder: {rest:?}");
        Ok(compiled)
    }

    #[test]
    fn test_parse_plain_chain() {
        let p = compile("$.store.book").unwrap();
        assert!(!p.is_ambiguous());

        let p = compile("$[3].a").unwrap();
        assert!(!p.is_ambiguous());
    }

    #[test]
    fn test_parse_fanouts() {
        assert!(compile("$.*").unwrap().is_ambiguous());
        assert!(compile("$[*]").unwrap().is_ambiguous());
        assert!(compile("$[1, 3]").unwrap().is_ambiguous());
        assert!(compile("$[2:6]").unwrap().is_ambiguous());
        assert!(compile("$[::2]").unwrap().is_ambiguous());
        assert!(compile("$..x").unwrap().is_ambiguous());
        assert!(compile("$..").unwrap().is_ambiguous());
        assert!(compile("$[?@.a]").unwrap().is_ambiguous());
    }

    #[test]
    fn test_parse_script_stage() {
        assert!(!compile("$(1 + 2)").unwrap().is_ambiguous());
        assert!(compile("$.*.value(@ == 'a')").unwrap().is_ambiguous());
    }

    #[test]
    fn test_incomplete_path_is_an_error() {
        assert_eq!(
            compile("$[3]."),
            Err(ParseError::Unexpected {
                context: "select",
                expected: "identifier, '.' or '*'",
                found: "end of input".to_string(),
            })
        );
    }

    #[test]
    fn test_mixed_separators_are_an_error() {
        assert_eq!(
            compile("$[3,5:1]"),
            Err(ParseError::MixedSeparators {
                first: ',',
                second: ':'
            })
        );
    }

    #[test]
    fn test_range_arity() {
        assert_eq!(compile("$[1:2:3:4]"), Err(ParseError::RangeArity));
    }

    #[test]
    fn test_mapper_rejects_range() {
        assert_eq!(compile("$..[1:2]"), Err(ParseError::MapperRange));
        // Union and wildcard after a mapper stay legal.
        assert!(compile("$..['x', 'a']").is_ok());
        assert!(compile("$..[*]").is_ok());
    }

    #[test]
    fn test_unterminated_bracket() {
        assert!(compile("$[1").is_err());
        assert!(compile("$[").is_err());
    }

    #[test]
    fn test_path_stops_at_foreign_input() {
        let options = Options::default();
        let host = BasicExpressions::new(options.clone());
        let (compiled, rest) = parse_root_path("$.a == 2", &host, &options).unwrap();
        assert!(!compiled.is_ambiguous());
        assert_eq!(rest, " == 2");
    }
}
