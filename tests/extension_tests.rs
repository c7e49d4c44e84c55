//! The extension surfaces: custom containers, visitor overrides, the
//! placeholder option, host expression engines and cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jsonpath_embed::value::tests::{ArrayLike, ObjectLike};
use jsonpath_embed::{
    Const, DefaultVisitor, EvalContext, EvalError, Evaluable, ExpressionParser, Language,
    Options, ParseError, PathValue, Value, VariableVisitor, compile,
};
use serde_json::json;

fn custom_array() -> Value {
    let items = vec![
        Value::from("alpha"),
        Value::from("beta"),
        Value::from("gamma"),
    ];
    Value::Object(BTreeMap::from([(
        "seq".to_string(),
        Value::Custom(Arc::new(ArrayLike(items))),
    )]))
}

#[test]
fn custom_sequence_container_is_indexable() {
    let data = custom_array();
    let ctx = EvalContext::new();

    let direct = compile("$.seq[1]").unwrap();
    assert_eq!(direct.evaluate(&data, &ctx).unwrap(), Value::from("beta"));

    let negative = compile("$.seq[-1]").unwrap();
    assert_eq!(negative.evaluate(&data, &ctx).unwrap(), Value::from("gamma"));

    let out_of_range = compile("$.seq[7]").unwrap();
    assert_eq!(
        out_of_range.evaluate(&data, &ctx),
        Err(EvalError::IndexOutOfBounds(7))
    );
}

#[test]
fn custom_sequence_container_fans_out() {
    let data = custom_array();
    let ctx = EvalContext::new();

    let wildcard = compile("$.seq[*]").unwrap();
    assert_eq!(
        wildcard.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![
            Value::from("alpha"),
            Value::from("beta"),
            Value::from("gamma"),
        ])
    );

    let range = compile("$.seq[0:2]").unwrap();
    assert_eq!(
        range.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::from("alpha"), Value::from("beta")])
    );

    // Recursive descent crosses the capability boundary.
    let descend = compile("$..").unwrap();
    let matches = descend.matches(&data, &ctx).unwrap();
    assert!(
        matches
            .iter()
            .any(|m| m.value == Value::from("gamma") && m.path() == r#"$["seq"]["2"]"#)
    );
}

#[test]
fn custom_map_container_resolves_keys() {
    let map = BTreeMap::from([
        ("name".to_string(), Value::from("zoe")),
        ("age".to_string(), Value::from(11.0)),
    ]);
    let data = Value::Object(BTreeMap::from([(
        "rec".to_string(),
        Value::Custom(Arc::new(ObjectLike(map))),
    )]));
    let ctx = EvalContext::new();

    assert_eq!(
        compile("$.rec.name").unwrap().evaluate(&data, &ctx).unwrap(),
        Value::from("zoe")
    );
    assert_eq!(
        compile("$.rec.missing").unwrap().evaluate(&data, &ctx),
        Err(EvalError::UnknownKey("missing".to_string()))
    );
}

/// A visitor that transparently decodes `rev:`-prefixed leaf strings while
/// delegating everything else to the default semantics.
struct DecodingVisitor;

impl VariableVisitor for DecodingVisitor {
    fn visit_child(&self, value: &Value, key: &Value) -> Result<PathValue, EvalError> {
        let mut pv = DefaultVisitor.visit_child(value, key)?;
        if let Value::String(s) = &pv.value
            && let Some(encoded) = s.strip_prefix("rev:")
        {
            pv.value = Value::String(encoded.chars().rev().collect());
        }
        Ok(pv)
    }
}

#[test]
fn visitor_override_decodes_values() {
    let data = Value::from(json!({ "encoded": "rev:dlrow", "plain": "asis" }));
    let visitor = DecodingVisitor;
    let base = EvalContext::new();
    let ctx = base.with_visitor(&visitor);

    let path = compile("$.encoded").unwrap();
    assert_eq!(path.evaluate(&data, &ctx).unwrap(), Value::from("world"));

    let plain = compile("$.plain").unwrap();
    assert_eq!(plain.evaluate(&data, &ctx).unwrap(), Value::from("asis"));

    // The child hook also applies to wildcard fan-out.
    let star = compile("$.*").unwrap();
    assert_eq!(
        star.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::from("world"), Value::from("asis")])
    );
}

#[test]
fn placeholders_reference_captured_keys() {
    let lang = Language::new(Options::new().placeholders(true));
    let data = Value::from(json!({ "a": { "k": 1 }, "b": { "k": 2 } }));
    let ctx = EvalContext::new();

    // The script sees the wildcard-captured key of its branch.
    let keys = lang.compile("$.*(#0)").unwrap();
    assert_eq!(
        keys.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::from("a"), Value::from("b")])
    );

    // A filter can select on the captured key positionally.
    let filtered = lang.compile(r#"$.*[?(#0 == "a")]"#).unwrap();
    assert_eq!(
        filtered.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::Number(1.0)])
    );
}

#[test]
fn placeholders_are_rejected_when_disabled() {
    let lang = Language::default();
    assert!(lang.compile("$.*(#0)").is_err());
}

#[test]
fn cancellation_always_propagates() {
    let data = Value::from(json!({ "a": { "x": 1 }, "b": { "x": 2 } }));
    let flag = AtomicBool::new(true);
    let base = EvalContext::new();
    let ctx = base.with_cancellation(&flag);

    // Even drop-errors fan-outs do not swallow cancellation.
    let path = compile("$..x").unwrap();
    assert_eq!(path.evaluate(&data, &ctx), Err(EvalError::Cancelled));

    flag.store(false, Ordering::Relaxed);
    assert_eq!(
        path.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::Number(1.0), Value::Number(2.0)])
    );
}

/// A host engine that only understands unsigned integer literals. Exercises
/// the shared-cursor contract without the built-in language.
struct IntegersOnly;

impl ExpressionParser for IntegersOnly {
    fn parse_expression<'a>(
        &self,
        input: &'a str,
    ) -> Result<(Arc<dyn Evaluable>, &'a str), ParseError> {
        let t = input.trim_start();
        let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(ParseError::Unexpected {
                context: "expression",
                expected: "an integer",
                found: t
                    .chars()
                    .next()
                    .map(|c| format!("'{c}'"))
                    .unwrap_or_else(|| "end of input".to_string()),
            });
        }
        let n: f64 = digits.parse().map_err(|e| ParseError::Expression {
            at: digits.clone(),
            message: format!("{e}"),
        })?;
        Ok((Arc::new(Const(Value::Number(n))), &t[digits.len()..]))
    }
}

#[test]
fn host_expression_engine_is_pluggable() {
    let lang = Language::with_host(Arc::new(IntegersOnly), Options::default());
    let data = Value::from(json!(["a", "b", "c"]));
    let ctx = EvalContext::new();

    let path = lang.compile("$[1]").unwrap();
    assert_eq!(path.evaluate(&data, &ctx).unwrap(), Value::from("b"));

    let range = lang.compile("$[0:2]").unwrap();
    assert_eq!(
        range.evaluate(&data, &ctx).unwrap(),
        Value::Array(vec![Value::from("a"), Value::from("b")])
    );

    // The replacement host refuses what it can not parse.
    assert!(lang.compile("$['x']").is_err());
}
