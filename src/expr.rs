//! The boundary between the path engine and the host expression engine:
//! compiled sub-expressions, the shared-cursor parser hook, and the explicit
//! evaluation context threaded through every call.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EvalError, ParseError};
use crate::value::Value;
use crate::visitor::{DefaultVisitor, VariableVisitor};

/// How an ambiguous path presents its match set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// A flat ordered sequence of matched values.
    #[default]
    FlatValues,
    /// A mapping from canonical path string to matched value.
    FullPaths,
}

/// All state carried through one evaluation call.
///
/// The context is a small copyable bundle of references: the innermost value
/// bound as "current" (`@`), the key segments captured so far on the current
/// branch, the traversal visitor, an optional cancellation flag, and the
/// requested output shape. A fresh context is derived per recursion frame;
/// nothing leaks across calls.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub current: Option<&'a Value>,
    pub wildcards: &'a [String],
    pub visitor: &'a dyn VariableVisitor,
    pub cancel: Option<&'a AtomicBool>,
    pub output: OutputMode,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        EvalContext {
            current: None,
            wildcards: &[],
            visitor: &DefaultVisitor,
            cancel: None,
            output: OutputMode::FlatValues,
        }
    }

    pub fn with_visitor(mut self, visitor: &'a dyn VariableVisitor) -> Self {
        self.visitor = visitor;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Derives the context for stepping into `current`, with the key
    /// segments that reached it.
    pub(crate) fn bind<'b>(&self, current: &'b Value, wildcards: &'b [String]) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            current: Some(current),
            wildcards,
            visitor: self.visitor,
            cancel: self.cancel,
            output: self.output,
        }
    }

    pub fn check_cancelled(&self) -> Result<(), EvalError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(EvalError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        EvalContext::new()
    }
}

/// A compiled sub-expression supplied by the host expression engine.
///
/// Key, filter and script expressions inside a path are compiled by the host
/// and evaluated through this trait. `root` is the originally supplied root
/// value; the value a selector is stepping into is bound as
/// [`EvalContext::current`].
pub trait Evaluable: fmt::Debug + Send + Sync {
    fn eval(&self, ctx: &EvalContext<'_>, root: &Value) -> Result<Value, EvalError>;

    fn eval_bool(&self, ctx: &EvalContext<'_>, root: &Value) -> Result<bool, EvalError> {
        Ok(self.eval(ctx, root)?.to_bool())
    }

    fn eval_int(&self, ctx: &EvalContext<'_>, root: &Value) -> Result<i64, EvalError> {
        self.eval(ctx, root)?.to_i64()
    }
}

/// A constant expression.
#[derive(Debug, Clone)]
pub struct Const(pub Value);

impl Evaluable for Const {
    fn eval(&self, _ctx: &EvalContext<'_>, _root: &Value) -> Result<Value, EvalError> {
        Ok(self.0.clone())
    }
}

pub fn constant(value: Value) -> Arc<dyn Evaluable> {
    Arc::new(Const(value))
}

/// The parser-side hook into the host expression engine.
///
/// The path parser and the host share one string cursor: when the path
/// grammar reaches a bracket key, filter or script body it hands the
/// remaining input to the host, which parses exactly one expression off the
/// front and returns the unconsumed remainder.
pub trait ExpressionParser: Send + Sync {
    fn parse_expression<'a>(
        &self,
        input: &'a str,
    ) -> Result<(Arc<dyn Evaluable>, &'a str), ParseError>;
}
