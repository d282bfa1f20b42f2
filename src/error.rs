use thiserror::Error;

// One failure kind for the whole interpreter. The top-level loop catches
// every variant, prints "Error: <message>" and keeps reading.
#[derive(Error, Debug, Clone)]
pub enum SchemeError {
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("too few arguments provided")]
    TooFewArguments,
    #[error("too many arguments provided")]
    TooManyArguments,
    #[error("badly formed expression")]
    BadlyFormedExpression,
    #[error("too few operands in form")]
    TooFewOperands,
    #[error("too many operands in form")]
    TooManyOperands,
    #[error("malformed list: {0}")]
    MalformedList(String),
    #[error("malformed pair")]
    MalformedPair,
    #[error("unexpected EOF")]
    UnexpectedEof,
    #[error("not a procedure: {0}")]
    NotProcedure(String),
    #[error("Type Error: Expected {expected}, found {found}")]
    Type { expected: String, found: String },
    #[error("{op} received an incorrect number of arguments")]
    PrimitiveArity { op: &'static str },
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, SchemeError>;

impl SchemeError {
    pub fn message(msg: impl Into<String>) -> Self {
        SchemeError::Message(msg.into())
    }
}
