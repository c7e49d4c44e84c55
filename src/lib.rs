//! An embeddable JSONPath query engine.
//!
//! A textual path expression is compiled once into an immutable
//! [`CompiledPath`] and evaluated any number of times against a generic
//! [`Value`] tree, selecting zero, one or many sub-values — optionally
//! together with the full key path that reached each one.
//!
//! The engine distinguishes *plain* paths (at most one result) from
//! *ambiguous* paths (wildcards, unions, ranges, filters and recursive
//! descent fan out to a match set). Bracket keys, filter predicates and
//! script bodies are arbitrary expressions parsed by a pluggable host
//! engine; a basic one ships in [`lang`]. Traversal itself is pluggable
//! through [`VariableVisitor`], so hosts can intercept how children are
//! resolved or expose custom container types via [`Container`].
//!
//! ```
//! use jsonpath_embed::{Value, get};
//!
//! let data = Value::from(serde_json::json!({
//!     "welcome": { "message": ["Good Morning", "Hello World!"] }
//! }));
//! let greeting = get("$.welcome.message[1]", &data).unwrap();
//! assert_eq!(greeting, Value::from("Hello World!"));
//! ```

pub mod error;
pub mod expr;
pub mod functions;
pub mod lang;
pub mod parser;
pub mod path;
pub mod selector;
pub mod value;
pub mod visitor;

use std::sync::Arc;

// --- Public API ---
pub use error::{Error, EvalError, ParseError};
pub use expr::{Const, EvalContext, Evaluable, ExpressionParser, OutputMode, constant};
pub use functions::{FunctionRegistry, PathFunction};
pub use lang::BasicExpressions;
pub use parser::{parse_current_path, parse_root_path};
pub use path::{CompiledPath, Match, Origin, SelectorMode, render_path};
pub use value::{Container, Value};
pub use visitor::{DefaultVisitor, PathValue, VariableVisitor};

/// Construction-time configuration for a [`Language`].
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) allow_missing_keys: bool,
    pub(crate) placeholders: bool,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// When set, a missing key or out-of-range index on a direct child
    /// access drops the branch instead of failing the evaluation.
    pub fn allow_missing_keys(mut self, allow: bool) -> Self {
        self.allow_missing_keys = allow;
        self
    }

    /// Enables the `#` / `#i` placeholder extension in the basic expression
    /// language, referencing the wildcard-captured key segments of the
    /// current match positionally.
    pub fn placeholders(mut self, enable: bool) -> Self {
        self.placeholders = enable;
        self
    }
}

/// A configured path language: the host expression parser plus options.
///
/// Compiling through a language pairs the path grammar with the expression
/// engine used inside brackets, filters and scripts.
#[derive(Clone)]
pub struct Language {
    host: Arc<dyn ExpressionParser>,
    options: Options,
}

impl Language {
    /// A language backed by the built-in basic expression engine.
    pub fn new(options: Options) -> Self {
        Language {
            host: Arc::new(BasicExpressions::new(options.clone())),
            options,
        }
    }

    /// A language backed by a host-supplied expression engine.
    pub fn with_host(host: Arc<dyn ExpressionParser>, options: Options) -> Self {
        Language { host, options }
    }

    /// Compiles a complete path expression starting with `$` or `@`.
    /// Trailing input is a parse error.
    pub fn compile(&self, path: &str) -> Result<CompiledPath, ParseError> {
        let trimmed = path.trim_start();
        let (compiled, rest) = if trimmed.starts_with('$') {
            parse_root_path(trimmed, self.host.as_ref(), &self.options)?
        } else if trimmed.starts_with('@') {
            parse_current_path(trimmed, self.host.as_ref(), &self.options)?
        } else {
            return Err(ParseError::Unexpected {
                context: "path",
                expected: "'$' or '@'",
                found: trimmed
                    .chars()
                    .next()
                    .map(|c| format!("'{c}'"))
                    .unwrap_or_else(|| "end of input".to_string()),
            });
        };
        if !rest.trim().is_empty() {
            return Err(ParseError::TrailingInput(rest.trim().to_string()));
        }
        log::debug!("compiled path '{path}'");
        Ok(compiled)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::new(Options::default())
    }
}

/// Compiles a path with the default language.
pub fn compile(path: &str) -> Result<CompiledPath, ParseError> {
    Language::default().compile(path)
}

/// Compiles and evaluates a path against a value in one step.
pub fn get(path: &str, value: &Value) -> Result<Value, Error> {
    let compiled = compile(path)?;
    Ok(compiled.evaluate(value, &EvalContext::new())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_simple_select() {
        let data = Value::from(json!({ "customer": { "name": "ACME" } }));
        assert_eq!(
            get("$.customer.name", &data).unwrap(),
            Value::from("ACME")
        );
    }

    #[test]
    fn test_get_with_index() {
        let data = Value::from(json!({ "orders": [{ "id": "A" }, { "id": "B" }] }));
        assert_eq!(get("$.orders[1].id", &data).unwrap(), Value::from("B"));
    }

    #[test]
    fn test_compile_rejects_trailing_input() {
        assert_eq!(
            compile("$.a == 2"),
            Err(ParseError::TrailingInput("== 2".to_string()))
        );
    }

    #[test]
    fn test_compile_requires_prefix() {
        assert!(matches!(
            compile("store.book"),
            Err(ParseError::Unexpected { .. })
        ));
    }

    #[test]
    fn test_compiled_path_is_reusable() {
        let path = compile("$.a[0]").unwrap();
        let ctx = EvalContext::new();
        let one = Value::from(json!({ "a": [1] }));
        let two = Value::from(json!({ "a": [2] }));
        assert_eq!(path.evaluate(&one, &ctx).unwrap(), Value::Number(1.0));
        assert_eq!(path.evaluate(&two, &ctx).unwrap(), Value::Number(2.0));
        // Same tree again: structurally equal result.
        assert_eq!(path.evaluate(&one, &ctx).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_allow_missing_keys_option() {
        let data = Value::from(json!({ "a": 1 }));
        let strict = Language::default().compile("$.missing").unwrap();
        let ctx = EvalContext::new();
        assert!(strict.evaluate(&data, &ctx).is_err());

        let lenient = Language::new(Options::new().allow_missing_keys(true))
            .compile("$.missing")
            .unwrap();
        assert_eq!(lenient.evaluate(&data, &ctx).unwrap(), Value::Null);
    }
}
