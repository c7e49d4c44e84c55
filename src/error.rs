use thiserror::Error;

/// Errors produced while compiling a path expression.
///
/// A parse error is always fatal to compilation; no partial path is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {found} in {context}, expected {expected}")]
    Unexpected {
        context: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("mixed '{first}' and '{second}' in bracket selector")]
    MixedSeparators { first: char, second: char },

    #[error("range query takes at most three parameters [min:max:step]")]
    RangeArity,

    #[error("filter needs exactly one expression")]
    FilterArity,

    #[error("recursive descent can not be combined with a range query")]
    MapperRange,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("invalid expression at '{at}': {message}")]
    Expression { at: String, message: String },

    #[error("trailing input after path: '{0}'")]
    TrailingInput(String),
}

/// Errors produced while evaluating a compiled path against a value.
///
/// Whether one of these aborts the whole evaluation or merely removes the
/// current branch from the match set depends on the coalesced selector mode
/// at the failing stage. `Cancelled` is never downgraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown key {0}")]
    UnknownKey(String),

    #[error("index {0} out of bounds")]
    IndexOutOfBounds(i64),

    #[error("unsupported value kind {kind} for {operation}")]
    UnsupportedValue {
        kind: &'static str,
        operation: &'static str,
    },

    #[error("could not select value, invalid key: {0}")]
    InvalidKey(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("function '{function}' error: {message}")]
    FunctionError { function: String, message: String },

    #[error("no current element bound")]
    NoCurrentElement,

    #[error("no captured wildcard #{0}")]
    UnknownPlaceholder(usize),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// Convenience wrapper for callers that compile and evaluate in one step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
