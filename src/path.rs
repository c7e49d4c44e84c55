//! The composed path: how selector stages are assembled during parsing and
//! how the finished structure is evaluated against a value tree.
//!
//! A path is a tree. A run of deterministic stages is a [`PlainPath`]. The
//! first fan-out stage wraps it: the plain path becomes the *parent*, the
//! fan-out becomes the *branch*, and deterministic stages appended afterwards
//! collect in the *ending*. Further fan-outs nest, so nested ambiguity keeps
//! its ordering and its key-path prefixes compose by concatenation.

use std::collections::BTreeMap;

use crate::error::EvalError;
use crate::expr::{EvalContext, OutputMode};
use crate::selector::{AmbiguousSelector, PlainSelector};
use crate::value::Value;

/// Governs what a stage failure does to the evaluation: abort it, or drop
/// the failing branch from the match set. Once a drop-errors stage has run,
/// every later stage on that branch inherits drop-errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorMode {
    #[default]
    KeepErrors,
    DropErrors,
}

impl SelectorMode {
    pub fn coalesce(self, next: SelectorMode) -> SelectorMode {
        if self == SelectorMode::DropErrors {
            self
        } else {
            next
        }
    }
}

/// Where the path starts: the supplied root value (`$`) or the innermost
/// value bound as current (`@`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Root,
    Current,
}

#[derive(Debug, Clone)]
pub struct PlainStage {
    pub selector: PlainSelector,
    pub mode: SelectorMode,
}

/// A linear run of plain stages; produces at most one result.
#[derive(Debug, Clone, Default)]
pub struct PlainPath {
    stages: Vec<PlainStage>,
}

impl PlainPath {
    /// Folds the stages left to right. `Ok(None)` means the branch was
    /// dropped by a drop-errors stage. A stage failure is judged by the mode
    /// coalesced over all *preceding* stages, then the stage's own mode
    /// joins the chain.
    fn evaluate(
        &self,
        ctx: &EvalContext<'_>,
        root: &Value,
        start: &Value,
        keys: Vec<String>,
        mut mode: SelectorMode,
    ) -> Result<Option<(Vec<String>, Value)>, EvalError> {
        let mut keys = keys;
        let mut current = start.clone();
        for stage in &self.stages {
            ctx.check_cancelled()?;
            match stage.selector.resolve(ctx, root, &current, &keys) {
                Ok(mut pv) => {
                    keys.append(&mut pv.path);
                    current = pv.value;
                }
                Err(EvalError::Cancelled) => return Err(EvalError::Cancelled),
                Err(e) => {
                    if mode == SelectorMode::DropErrors {
                        return Ok(None);
                    }
                    return Err(e);
                }
            }
            mode = mode.coalesce(stage.mode);
        }
        Ok(Some((keys, current)))
    }
}

/// A fan-out node: parent match set, branching stage, and the plain ending
/// applied to every branched child.
#[derive(Debug, Clone)]
pub struct AmbiguousPath {
    parent: PathTree,
    branch: AmbiguousSelector,
    ending: PlainPath,
}

#[derive(Debug, Clone)]
pub enum PathTree {
    Plain(PlainPath),
    Ambiguous(Box<AmbiguousPath>),
}

impl PathTree {
    fn matches(
        &self,
        ctx: &EvalContext<'_>,
        root: &Value,
        start: &Value,
        mode: SelectorMode,
    ) -> Result<Vec<Match>, EvalError> {
        match self {
            PathTree::Plain(plain) => Ok(plain
                .evaluate(ctx, root, start, Vec::new(), mode)?
                .map(|(keys, value)| Match { keys, value })
                .into_iter()
                .collect()),
            PathTree::Ambiguous(node) => {
                let parents = node.parent.matches(ctx, root, start, mode)?;
                let mut out = Vec::new();
                for parent in &parents {
                    ctx.check_cancelled()?;
                    node.branch
                        .each(ctx, root, &parent.value, &parent.keys, &mut |pv| {
                            ctx.check_cancelled()?;
                            let mut keys = parent.keys.clone();
                            keys.extend(pv.path);
                            // Everything after a fan-out runs drop-errors.
                            if let Some((keys, value)) = node.ending.evaluate(
                                ctx,
                                root,
                                &pv.value,
                                keys,
                                SelectorMode::DropErrors,
                            )? {
                                out.push(Match { keys, value });
                            }
                            Ok(())
                        })?;
                }
                Ok(out)
            }
        }
    }
}

/// One result of an ambiguous path: the full key sequence that reached a
/// value, and the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub keys: Vec<String>,
    pub value: Value,
}

impl Match {
    /// The canonical path string for this match, e.g. `$["a"]["0"]`.
    pub fn path(&self) -> String {
        render_path(&self.keys)
    }
}

/// An immutable, reusable compiled path. Safe for concurrent evaluation.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    origin: Origin,
    tree: PathTree,
    mode: SelectorMode,
}

// `CompiledPath` holds `Arc<dyn Evaluable>` trait objects, so `PartialEq`
// cannot be derived. This equality is only needed so tests can compare a
// `Result<CompiledPath, ParseError>` with `assert_eq!`; it falls back to the
// structural `Debug` representation.
impl PartialEq for CompiledPath {
    fn eq(&self, other: &Self) -> bool {
        format!("{self:?}") == format!("{other:?}")
    }
}

impl CompiledPath {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// True when the path contains a fan-out stage and may produce any
    /// number of results.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.tree, PathTree::Ambiguous(_))
    }

    /// Evaluates the path and returns the underlying match set in traversal
    /// order. A plain path produces zero or one match.
    pub fn matches(
        &self,
        root: &Value,
        ctx: &EvalContext<'_>,
    ) -> Result<Vec<Match>, EvalError> {
        let start = match self.origin {
            Origin::Root => root,
            Origin::Current => ctx.current.ok_or(EvalError::NoCurrentElement)?,
        };
        let matches = self.tree.matches(ctx, root, start, self.mode)?;
        log::trace!("path produced {} match(es)", matches.len());
        Ok(matches)
    }

    /// Evaluates the path into the result shape requested by the context: a
    /// plain path yields its single value (`Null` when the branch was
    /// dropped); an ambiguous path yields the flat value sequence, or a
    /// mapping keyed by canonical path strings in full-path mode.
    pub fn evaluate(&self, root: &Value, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let matches = self.matches(root, ctx)?;
        let result = match (self.is_ambiguous(), ctx.output) {
            (false, OutputMode::FlatValues) => matches
                .into_iter()
                .next()
                .map(|m| m.value)
                .unwrap_or(Value::Null),
            (true, OutputMode::FlatValues) => {
                Value::Array(matches.into_iter().map(|m| m.value).collect())
            }
            (_, OutputMode::FullPaths) => {
                let mut map = BTreeMap::new();
                for m in matches {
                    map.insert(m.path(), m.value);
                }
                Value::Object(map)
            }
        };
        Ok(result)
    }
}

/// Accumulates selector stages during parsing and finalizes them into an
/// immutable [`CompiledPath`].
#[derive(Debug)]
pub struct PathBuilder {
    origin: Origin,
    tree: PathTree,
    mode: SelectorMode,
}

impl PathBuilder {
    pub fn new(origin: Origin, mode: SelectorMode) -> Self {
        PathBuilder {
            origin,
            tree: PathTree::Plain(PlainPath::default()),
            mode,
        }
    }

    /// Appends a plain stage: extends the plain path, or the ending of the
    /// innermost fan-out node.
    pub fn push_plain(&mut self, selector: PlainSelector, mode: SelectorMode) {
        let stage = PlainStage { selector, mode };
        match &mut self.tree {
            PathTree::Plain(plain) => plain.stages.push(stage),
            PathTree::Ambiguous(node) => node.ending.stages.push(stage),
        }
    }

    /// Appends a fan-out stage: wraps the path built so far as the parent of
    /// a new ambiguous node with an empty ending.
    pub fn push_ambiguous(&mut self, selector: AmbiguousSelector) {
        let parent = std::mem::replace(&mut self.tree, PathTree::Plain(PlainPath::default()));
        self.tree = PathTree::Ambiguous(Box::new(AmbiguousPath {
            parent,
            branch: selector,
            ending: PlainPath::default(),
        }));
    }

    pub fn finish(self) -> CompiledPath {
        CompiledPath {
            origin: self.origin,
            tree: self.tree,
            mode: self.mode,
        }
    }
}

/// Renders a key sequence as the canonical path string: `$` followed by each
/// key quoted in brackets.
pub fn render_path(keys: &[String]) -> String {
    let mut out = String::from("$");
    for key in keys {
        out.push_str("[\"");
        for c in key.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push_str("\"]");
    }
    out
}
