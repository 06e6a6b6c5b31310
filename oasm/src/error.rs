use ovm::ops::Bank;
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    UnknownMnemonic(String),
    BadRegister(String),
    OperandCount { expected: usize, found: usize },
    MissingDest,
    UnexpectedDest,
    BankMismatch { token: String, expected: Bank },
    BadLiteral(String),
    BadImmediate(String),
    UnknownName(String),
    BadDirective(String),
    DirectiveOutsideFunction(String),
    BadCount(String),
    TooManyLocals(String),
    TooManyParams(String),
    DuplicateFunction(String),
    PoolLimit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::UnknownMnemonic(mnemonic) => write!(f, "unknown mnemonic {}", mnemonic),
            ErrorKind::BadRegister(token) => write!(f, "invalid register {}", token),
            ErrorKind::OperandCount { expected, found } => {
                write!(f, "expected {} operand(s), found {}", expected, found)
            }
            ErrorKind::MissingDest => write!(f, "missing \"-> dest\" operand"),
            ErrorKind::UnexpectedDest => write!(f, "instruction takes no \"-> dest\" operand"),
            ErrorKind::BankMismatch { token, expected } => write!(
                f,
                "operand {} must be a %{} register",
                token,
                expected.selector()
            ),
            ErrorKind::BadLiteral(token) => write!(f, "invalid literal {}", token),
            ErrorKind::BadImmediate(token) => write!(f, "invalid immediate {}", token),
            ErrorKind::UnknownName(name) => write!(f, "unknown identifier {}", name),
            ErrorKind::BadDirective(directive) => write!(f, "unknown directive {}", directive),
            ErrorKind::DirectiveOutsideFunction(directive) => {
                write!(f, "{} outside of function", directive)
            }
            ErrorKind::BadCount(token) => write!(f, "invalid count {}", token),
            ErrorKind::TooManyLocals(name) => {
                write!(f, "too many named locals (var {})", name)
            }
            ErrorKind::TooManyParams(name) => {
                write!(f, "too many named params (param {})", name)
            }
            ErrorKind::DuplicateFunction(name) => write!(f, "duplicate function {}", name),
            ErrorKind::PoolLimit => write!(f, "constant pool index exceeds 16 bits"),
        }
    }
}

/// An assembly error, naming the offending 1-based source line.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub line: usize,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl StdError for Error {}

pub type Result<T> = std::result::Result<T, Error>;
