//! Registry and built-in implementations for functions callable from the
//! basic expression language.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::expr::EvalContext;
use crate::value::Value;

/// The signature for a custom function implementation.
pub type PathFunction = fn(ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError>;

/// A registry holding the functions available to the expression evaluator.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, PathFunction>,
}

impl FunctionRegistry {
    /// Creates a new, empty function registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registers a new function (case-insensitive name).
    pub fn register(&mut self, name: &str, func: PathFunction) {
        self.functions.insert(name.to_lowercase(), func);
    }

    pub fn get(&self, name: &str) -> Option<PathFunction> {
        self.functions.get(&name.to_lowercase()).copied()
    }
}

fn coerce_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => crate::value::canonical_number(*n),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn arg_error(function: &str, message: &str) -> EvalError {
    EvalError::FunctionError {
        function: function.to_string(),
        message: message.to_string(),
    }
}

// --- Built-in implementations ---

fn length(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let n = match args.first() {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Custom(c)) => match c.len() {
            Some(n) => n,
            None => {
                let mut n: usize = 0;
                c.for_each(&mut |_, _| n += 1);
                n
            }
        },
        _ => return Err(arg_error("length", "expected a container or string")),
    };
    Ok(Value::from(n))
}

fn keys(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    match args.first() {
        Some(Value::Object(map)) => Ok(Value::Array(
            map.keys().map(|k| Value::from(k.clone())).collect(),
        )),
        Some(Value::Custom(c)) => {
            let mut out = Vec::new();
            c.for_each(&mut |k, _| out.push(Value::from(k)));
            Ok(Value::Array(out))
        }
        _ => Err(arg_error("keys", "expected an object")),
    }
}

fn contains(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    match (args.first(), args.get(1)) {
        (Some(Value::String(haystack)), Some(Value::String(needle))) => {
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        (Some(Value::Array(items)), Some(needle)) => {
            Ok(Value::Bool(items.iter().any(|v| v == needle)))
        }
        _ => Err(arg_error("contains", "expected (string, string) or (array, value)")),
    }
}

fn upper(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::from(s.to_uppercase())),
        _ => Err(arg_error("upper", "expected a string")),
    }
}

fn lower(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::from(s.to_lowercase())),
        _ => Err(arg_error("lower", "expected a string")),
    }
}

fn concat(_ctx: &EvalContext<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::from(
        args.iter().map(coerce_string).collect::<String>(),
    ))
}

impl Default for FunctionRegistry {
    /// Creates a registry populated with all built-in functions.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("length", length);
        registry.register("keys", keys);
        registry.register("contains", contains);
        registry.register("upper", upper);
        registry.register("lower", lower);
        registry.register("concat", concat);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins() {
        let ctx = EvalContext::new();
        let reg = FunctionRegistry::default();

        let length = reg.get("length").unwrap();
        assert_eq!(
            length(&ctx, vec![Value::from(json!([1, 2, 3]))]).unwrap(),
            Value::Number(3.0)
        );
        assert!(length(&ctx, vec![Value::Null]).is_err());

        let contains = reg.get("contains").unwrap();
        assert_eq!(
            contains(&ctx, vec![Value::from("haystack"), Value::from("hay")]).unwrap(),
            Value::Bool(true)
        );

        let keys = reg.get("keys").unwrap();
        assert_eq!(
            keys(&ctx, vec![Value::from(json!({ "b": 1, "a": 2 }))]).unwrap(),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let reg = FunctionRegistry::default();
        assert!(reg.get("UPPER").is_some());
        assert!(reg.get("nope").is_none());
    }
}
