use thiserror::Error;

/// Failure while turning expression text into bytecode.
///
/// Compilation stops at the first error; nothing is partially emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("expression is {len} characters long, the maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("Unexpected token {kind} at '{text}'")]
    UnexpectedToken { kind: &'static str, text: String },

    #[error("Expected {expected} but found {found} at '{text}'")]
    Expected {
        expected: &'static str,
        found: &'static str,
        text: String,
    },

    #[error("Expected {expected} but reached the end of the expression")]
    UnexpectedEnd { expected: &'static str },

    #[error("Cannot assign to $parameter")]
    AssignToParameter,

    #[error("Cannot assign to $self")]
    AssignToSelf,

    #[error("{operator} operators are tokenized but not supported")]
    UnsupportedOperator { operator: &'static str },
}

/// Failure while executing bytecode.
///
/// Instructions that ran before the failure keep their effects on the
/// resource store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Jump target out of range: {target} (bytecode length {len})")]
    JumpOutOfRange { target: usize, len: usize },

    #[error("Malformed {op} instruction: {reason}")]
    MalformedInstruction {
        op: &'static str,
        reason: &'static str,
    },

    #[error("Attempted to divide by zero")]
    DivideByZero,

    #[error("Value was either too large or too small for {target}")]
    Overflow { target: &'static str },

    #[error("Cannot convert {from} to {to}")]
    Conversion {
        from: &'static str,
        to: &'static str,
    },

    #[error("Cannot convert {kind} to boolean")]
    BooleanConversion { kind: &'static str },

    #[error("Cannot {op} value of kind {kind}")]
    UnsupportedOperand {
        op: &'static str,
        kind: &'static str,
    },

    #[error("Resource '{key}' is not a command")]
    NotACommand { key: String },

    #[error("Resource '{key}' is not indexable")]
    NotIndexable { key: String },

    #[error("Index {index} is not valid for resource '{key}'")]
    InvalidIndex { key: String, index: String },

    #[error("Runtime stack is empty")]
    StackEmpty,

    #[error("Runtime stack exceeded maximum capacity of {max}")]
    StackOverflow { max: usize },

    #[error("Command failed: {0}")]
    Command(String),
}

/// Any failure produced by the crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
