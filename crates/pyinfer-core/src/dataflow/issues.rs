//! Advisory issues reported after inference
//!
//! Issues never stop analysis; they are collected per module and handed to
//! the caller as data.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    IncompatibleOperands { op: String, left: String, right: String },
    BadOperand { op: String, operand: String },
    NotCallable { callee: String },
    ArgumentMismatch { callee: String },
    BadBaseClass { base: String },
    MissingAttribute { object: String, attr: String },
    NotIterable { value: String },
    NotIndexable { value: String },
    NotSearchable { container: String },
    NonIntegerIndex { index: String },
    ConstructorReturnsValue { class: String, value: String },
    UnresolvedImport { module: String },
    Construction { message: String },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::IncompatibleOperands { op, left, right } => {
                write!(f, "unsupported operand types for {op}: {left} and {right}")
            }
            DiagnosticKind::BadOperand { op, operand } => {
                write!(f, "bad operand type for unary {op}: {operand}")
            }
            DiagnosticKind::NotCallable { callee } => write!(f, "{callee} is not callable"),
            DiagnosticKind::ArgumentMismatch { callee } => {
                write!(f, "arguments do not match any signature of {callee}")
            }
            DiagnosticKind::BadBaseClass { base } => write!(f, "{base} cannot be used as a base class"),
            DiagnosticKind::MissingAttribute { object, attr } => {
                write!(f, "{object} has no attribute '{attr}'")
            }
            DiagnosticKind::NotIterable { value } => write!(f, "{value} is not iterable"),
            DiagnosticKind::NotIndexable { value } => write!(f, "{value} is not subscriptable"),
            DiagnosticKind::NotSearchable { container } => {
                write!(f, "{container} does not support membership tests")
            }
            DiagnosticKind::NonIntegerIndex { index } => {
                write!(f, "sequence indices must be integers or slices, not {index}")
            }
            DiagnosticKind::ConstructorReturnsValue { class, value } => {
                write!(f, "{class}.__init__ should return None, not {value}")
            }
            DiagnosticKind::UnresolvedImport { module } => write!(f, "cannot resolve module '{module}'"),
            DiagnosticKind::Construction { message } => write!(f, "{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub module: String,
    pub line: u32,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(module: impl Into<String>, line: u32, kind: DiagnosticKind) -> Self {
        let message = kind.to_string();
        Self {
            module: module.into(),
            line,
            kind,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.module, self.line, self.message)
    }
}
