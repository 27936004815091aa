//! Compile-time and run-time errors

use thiserror::Error;

use crate::token::Position;
use crate::value::DeclaredType;

/// Code generation failures. Execution never starts after one of these.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CompileError {
    #[error("function {0} is already declared")]
    DuplicateFunction(String),
    #[error("can't find {0} function")]
    UnresolvedCall(String),
    #[error("could not find the entry point (main)")]
    MissingEntryPoint,
    #[error("function {name} expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("label {0} is already bound")]
    DuplicateLabel(String),
}

/// Runtime failures. Each one aborts the run loop.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("undeclared variable: {0}")]
    UndeclaredVariable(String),
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: DeclaredType,
        got: DeclaredType,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("index {index} is out of range (length {length})")]
    IndexOutOfRange { index: i64, length: usize },
    #[error("can't find label: {0}")]
    UnresolvedLabel(String),
    #[error("expression stack is empty")]
    EmptyExpressionStack,
    #[error("missing argument: {0}")]
    MissingArgument(String),
    #[error("return outside of a function call")]
    UnexpectedReturn,
    #[error("no active scope")]
    NoActiveScope,
    #[error("step budget of {0} instructions exhausted")]
    StepBudgetExhausted(u64),
    #[error("{name}: {error:#}")]
    Builtin { name: String, error: anyhow::Error },
}

impl Fault {
    pub(crate) fn type_mismatch(expected: DeclaredType, got: DeclaredType) -> Self {
        Fault::TypeMismatch { expected, got }
    }
}

/// A fault annotated with the source position of the instruction that raised it
#[derive(Debug, Error)]
#[error("{position}: {fault}")]
pub struct ExecutionError {
    pub position: Position,
    pub fault: Fault,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn messages() {
        let err = ExecutionError {
            position: Position::new(3, 14),
            fault: Fault::UndeclaredVariable("a".into()),
        };
        assert_eq!(err.to_string(), "3:14: undeclared variable: a");

        let err = Fault::type_mismatch(DeclaredType::Int, DeclaredType::String);
        assert_eq!(err.to_string(), "type mismatch: expected int, got string");

        let err = Fault::Builtin {
            name: "readInt".into(),
            error: anyhow!("invalid digit").context("expected an integer"),
        };
        assert_eq!(err.to_string(), "readInt: expected an integer: invalid digit");

        assert_eq!(
            CompileError::UnresolvedCall("nope".into()).to_string(),
            "can't find nope function"
        );
    }
}
