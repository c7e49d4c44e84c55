//! The stateless traversal primitives a compiled path is built from.
//!
//! Plain selectors resolve to exactly one (key, value) pair or fail;
//! ambiguous selectors fan out to any number of pairs and never fail the
//! path at their own step — a candidate that does not resolve is simply not
//! a match. Cancellation is the one failure that always escapes.

use std::sync::Arc;

use crate::error::EvalError;
use crate::expr::{EvalContext, Evaluable};
use crate::value::Value;
use crate::visitor::{PathValue, Visit};

/// A selector stage guaranteed to produce at most one result.
#[derive(Debug, Clone)]
pub enum PlainSelector {
    /// `.x` or `[expr]`: resolve one key against the current value. The key
    /// expression is evaluated against the root, with the current value
    /// bound as `@`.
    Child { key: Arc<dyn Evaluable> },
    /// `(expr)`: derive one value from the current value; contributes no
    /// key segment.
    Script { script: Arc<dyn Evaluable> },
}

impl PlainSelector {
    pub fn resolve(
        &self,
        ctx: &EvalContext<'_>,
        root: &Value,
        value: &Value,
        keys: &[String],
    ) -> Result<PathValue, EvalError> {
        let bound = ctx.bind(value, keys);
        match self {
            PlainSelector::Child { key } => {
                let k = key.eval(&bound, root).map_err(|e| match e {
                    EvalError::Cancelled => EvalError::Cancelled,
                    other => EvalError::InvalidKey(other.to_string()),
                })?;
                bound.visitor.visit_child(value, &k)
            }
            PlainSelector::Script { script } => {
                let derived = script.eval(&bound, root)?;
                Ok(PathValue {
                    path: Vec::new(),
                    value: derived,
                })
            }
        }
    }
}

/// A selector stage that fans out to zero or more results.
#[derive(Debug, Clone)]
pub enum AmbiguousSelector {
    /// `*` / `[*]`
    Wildcard,
    /// `[k1, k2, ...]`
    Union { keys: Vec<Arc<dyn Evaluable>> },
    /// `[min:max:step]`
    Range {
        min: Arc<dyn Evaluable>,
        max: Arc<dyn Evaluable>,
        step: Arc<dyn Evaluable>,
    },
    /// `..`
    RecursiveDescent,
    /// `[?expr]`
    Filter { predicate: Arc<dyn Evaluable> },
}

impl AmbiguousSelector {
    pub fn each(
        &self,
        ctx: &EvalContext<'_>,
        root: &Value,
        value: &Value,
        keys: &[String],
        visit: &mut Visit<'_>,
    ) -> Result<(), EvalError> {
        let bound = ctx.bind(value, keys);
        match self {
            AmbiguousSelector::Wildcard => {
                drop_own_errors(bound.visitor.visit_wildcard(value, visit))
            }
            AmbiguousSelector::Union { keys: members } => {
                for key in members {
                    bound.check_cancelled()?;
                    let k = match key.eval(&bound, root) {
                        Ok(k) => k,
                        Err(EvalError::Cancelled) => return Err(EvalError::Cancelled),
                        Err(_) => continue,
                    };
                    match bound.visitor.visit_child(value, &k) {
                        Ok(pv) => visit(pv)?,
                        Err(EvalError::Cancelled) => return Err(EvalError::Cancelled),
                        Err(_) => continue,
                    }
                }
                Ok(())
            }
            AmbiguousSelector::Range { min, max, step } => {
                let bounds = (|| {
                    Ok::<_, EvalError>((
                        min.eval_int(&bound, root)?,
                        max.eval_int(&bound, root)?,
                        step.eval_int(&bound, root)?,
                    ))
                })();
                match bounds {
                    Ok((min, max, step)) => {
                        drop_own_errors(bound.visitor.visit_range(value, min, max, step, visit))
                    }
                    Err(EvalError::Cancelled) => Err(EvalError::Cancelled),
                    Err(_) => Ok(()),
                }
            }
            AmbiguousSelector::RecursiveDescent => {
                drop_own_errors(bound.visitor.visit_recursive_descent(value, visit))
            }
            AmbiguousSelector::Filter { predicate } => {
                let result = bound.visitor.visit_wildcard(value, &mut |pv| {
                    ctx.check_cancelled()?;
                    let mut wildcards = keys.to_vec();
                    wildcards.extend(pv.path.iter().cloned());
                    let child_ctx = ctx.bind(&pv.value, &wildcards);
                    match predicate.eval_bool(&child_ctx, root) {
                        Ok(true) => visit(pv),
                        Ok(false) => Ok(()),
                        Err(EvalError::Cancelled) => Err(EvalError::Cancelled),
                        // A predicate that fails for one child excludes that
                        // child; it does not abort the query.
                        Err(_) => Ok(()),
                    }
                });
                drop_own_errors(result)
            }
        }
    }
}

/// Fan-out stages are drop-errors at their own step: any resolution failure
/// removes the candidate rather than aborting. Cancellation passes through.
fn drop_own_errors(result: Result<(), EvalError>) -> Result<(), EvalError> {
    match result {
        Err(EvalError::Cancelled) => Err(EvalError::Cancelled),
        Err(_) => Ok(()),
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::constant;
    use serde_json::json;

    fn matches(
        selector: &AmbiguousSelector,
        root: &Value,
    ) -> Vec<(Vec<String>, Value)> {
        let ctx = EvalContext::new();
        let mut out = Vec::new();
        selector
            .each(&ctx, root, root, &[], &mut |pv| {
                out.push((pv.path, pv.value));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_direct_child() {
        let root = Value::from(json!({ "a": { "b": 7 } }));
        let ctx = EvalContext::new();
        let sel = PlainSelector::Child {
            key: constant(Value::from("a")),
        };
        let pv = sel.resolve(&ctx, &root, &root, &[]).unwrap();
        assert_eq!(pv.path, vec!["a".to_string()]);

        let missing = PlainSelector::Child {
            key: constant(Value::from("zz")),
        };
        assert_eq!(
            missing.resolve(&ctx, &root, &root, &[]),
            Err(EvalError::UnknownKey("zz".into()))
        );
    }

    #[test]
    fn test_union_skips_missing_keys() {
        let root = Value::from(json!({ "a": 1, "c": 3 }));
        let sel = AmbiguousSelector::Union {
            keys: vec![
                constant(Value::from("a")),
                constant(Value::from("b")),
                constant(Value::from("c")),
            ],
        };
        let got = matches(&sel, &root);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, vec!["a".to_string()]);
        assert_eq!(got[1].0, vec!["c".to_string()]);
    }

    #[test]
    fn test_range_over_scalar_is_empty() {
        let sel = AmbiguousSelector::Range {
            min: constant(Value::Number(0.0)),
            max: constant(Value::Number(5.0)),
            step: constant(Value::Number(1.0)),
        };
        assert!(matches(&sel, &Value::from("nope")).is_empty());
    }

    #[test]
    fn test_filter_keeps_true_children() {
        let root = Value::from(json!([1, 2, 3]));
        // A predicate that is only true for the current element 2.
        #[derive(Debug)]
        struct IsTwo;
        impl Evaluable for IsTwo {
            fn eval(&self, ctx: &EvalContext<'_>, _root: &Value) -> Result<Value, EvalError> {
                Ok(Value::Bool(ctx.current == Some(&Value::Number(2.0))))
            }
        }
        let sel = AmbiguousSelector::Filter {
            predicate: Arc::new(IsTwo),
        };
        let got = matches(&sel, &root);
        assert_eq!(got, vec![(vec!["1".to_string()], Value::Number(2.0))]);
    }

    #[test]
    fn test_script_has_no_key() {
        #[derive(Debug)]
        struct Len;
        impl Evaluable for Len {
            fn eval(&self, ctx: &EvalContext<'_>, _root: &Value) -> Result<Value, EvalError> {
                let n = ctx
                    .current
                    .and_then(Value::as_array)
                    .map(|a| a.len())
                    .unwrap_or(0);
                Ok(Value::from(n))
            }
        }
        let root = Value::from(json!([10, 20]));
        let ctx = EvalContext::new();
        let sel = PlainSelector::Script {
            script: Arc::new(Len),
        };
        let pv = sel.resolve(&ctx, &root, &root, &[]).unwrap();
        assert!(pv.path.is_empty());
        assert_eq!(pv.value, Value::Number(2.0));
    }
}
