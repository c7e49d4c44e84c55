//! The pluggable traversal strategy. Selectors never touch a value's shape
//! directly; they go through a [`VariableVisitor`], so a host can intercept
//! or augment how children are resolved (decode encoded leaves, support a
//! custom indexable type) while delegating everything else to the defaults.

use crate::error::EvalError;
use crate::value::Value;

/// One resolved step: the key segments that reached a value, and the value.
///
/// Most visits produce a single-segment path; recursive descent produces an
/// empty path for the visited node itself and multi-segment paths for its
/// descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct PathValue {
    pub path: Vec<String>,
    pub value: Value,
}

/// Continuation receiving resolved (key-path, value) pairs.
pub type Visit<'v> = dyn FnMut(PathValue) -> Result<(), EvalError> + 'v;

/// Strategy object for resolving traversal steps against a value.
///
/// Every method has a default body implementing the native semantics for
/// arrays, objects and [`Container`](crate::value::Container) capabilities.
/// The composite methods (`visit_wildcard`, `visit_range`,
/// `visit_recursive_descent`) recurse through `self`, so overriding
/// `visit_child` alone is enough to affect every fan-out kind.
pub trait VariableVisitor: Send + Sync {
    /// Resolves a single key against a value.
    ///
    /// Sequences take integer keys, negative values counting from the end;
    /// out-of-range indices are an error. Mappings take string keys (numbers
    /// are stringified canonically); an absent key is an error. Scalars and
    /// null cannot be selected into.
    fn visit_child(&self, value: &Value, key: &Value) -> Result<PathValue, EvalError> {
        match value {
            Value::Array(items) => {
                let i = key.as_index()?;
                let n = items.len() as i64;
                let p = if i < 0 { n + i } else { i };
                if p < 0 || p >= n {
                    return Err(EvalError::IndexOutOfBounds(i));
                }
                Ok(PathValue {
                    path: vec![p.to_string()],
                    value: items[p as usize].clone(),
                })
            }
            Value::Object(map) => {
                let k = key.as_key()?;
                match map.get(&k) {
                    Some(v) => Ok(PathValue {
                        path: vec![k],
                        value: v.clone(),
                    }),
                    None => Err(EvalError::UnknownKey(k)),
                }
            }
            Value::Custom(container) => {
                if let Some(len) = container.len() {
                    let i = key.as_index()?;
                    let n = len as i64;
                    let p = if i < 0 { n + i } else { i };
                    if p < 0 || p >= n {
                        return Err(EvalError::IndexOutOfBounds(i));
                    }
                    let k = p.to_string();
                    match container.select(&k) {
                        Some(v) => Ok(PathValue {
                            path: vec![k],
                            value: v,
                        }),
                        None => Err(EvalError::IndexOutOfBounds(i)),
                    }
                } else {
                    let k = key.as_key()?;
                    match container.select(&k) {
                        Some(v) => Ok(PathValue {
                            path: vec![k],
                            value: v,
                        }),
                        None => Err(EvalError::UnknownKey(k)),
                    }
                }
            }
            other => Err(EvalError::UnsupportedValue {
                kind: other.kind(),
                operation: "select",
            }),
        }
    }

    /// Visits every (key, child) pair of a value in native enumeration
    /// order. Non-container values yield nothing.
    fn visit_wildcard(&self, value: &Value, visit: &mut Visit<'_>) -> Result<(), EvalError> {
        match value {
            Value::Array(items) => {
                for i in 0..items.len() {
                    let pv = self.visit_child(value, &Value::from(i))?;
                    visit(pv)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                for k in map.keys() {
                    let pv = self.visit_child(value, &Value::String(k.clone()))?;
                    visit(pv)?;
                }
                Ok(())
            }
            Value::Custom(container) => {
                let mut keys = Vec::new();
                container.for_each(&mut |k, _| keys.push(k.to_string()));
                for k in keys {
                    let pv = self.visit_child(value, &Value::String(k))?;
                    visit(pv)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Visits the slice `[min:max:step]` of a sequence.
    ///
    /// Negative bounds are normalized by adding the length, then clamped to
    /// `[0, len]`; a normalized `min > max` yields nothing, as does ranging
    /// over anything that is not sequence-like. `step == 0` walks as `1`; a
    /// negative step walks the same half-open index range backwards.
    fn visit_range(
        &self,
        value: &Value,
        min: i64,
        max: i64,
        step: i64,
        visit: &mut Visit<'_>,
    ) -> Result<(), EvalError> {
        let len = match value {
            Value::Array(items) => items.len() as i64,
            Value::Custom(container) => match container.len() {
                Some(n) => n as i64,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        let min = negmax(min, len);
        let max = negmax(max, len);
        if min > max {
            return Ok(());
        }
        let step = if step == 0 { 1 } else { step };

        if step > 0 {
            let mut i = min;
            while i < max {
                let pv = self.visit_child(value, &Value::from(i))?;
                visit(pv)?;
                i += step;
            }
        } else {
            let mut i = max - 1;
            while i >= min {
                let pv = self.visit_child(value, &Value::from(i))?;
                visit(pv)?;
                i += step;
            }
        }
        Ok(())
    }

    /// Visits a value and all of its descendants in unconditional pre-order:
    /// the node itself first under the empty key path, then every child
    /// subtree with the child's key prefixed.
    fn visit_recursive_descent(
        &self,
        value: &Value,
        visit: &mut Visit<'_>,
    ) -> Result<(), EvalError> {
        visit(PathValue {
            path: Vec::new(),
            value: value.clone(),
        })?;

        let mut children = Vec::new();
        self.visit_wildcard(value, &mut |pv| {
            children.push(pv);
            Ok(())
        })?;

        for child in children {
            self.visit_recursive_descent(&child.value, &mut |mut sub| {
                let mut path = child.path.clone();
                path.append(&mut sub.path);
                sub.path = path;
                visit(sub)
            })?;
        }
        Ok(())
    }
}

/// The stock traversal semantics, also usable as a delegation target from a
/// partial override.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVisitor;

impl VariableVisitor for DefaultVisitor {}

fn negmax(n: i64, len: i64) -> i64 {
    if n < 0 { (len + n).max(0) } else { n.min(len) }
}
