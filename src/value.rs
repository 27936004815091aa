//! Runtime values and the types variables are declared with

use std::fmt;

use crate::ast::Literal;

/// Value held by a variable or an expression stack
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// Arrays are value-typed: assigning or reading one copies it.
    Array(Vec<Value>),
}

/// Type a variable, parameter or return value is declared with
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DeclaredType {
    Int,
    Float,
    String,
    Bool,
    Array,
}

impl Value {
    /// The declared type this value satisfies
    pub fn declared_type(&self) -> DeclaredType {
        match self {
            Value::Int(_) => DeclaredType::Int,
            Value::Float(_) => DeclaredType::Float,
            Value::String(_) => DeclaredType::String,
            Value::Bool(_) => DeclaredType::Bool,
            Value::Array(_) => DeclaredType::Array,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl DeclaredType {
    /// Keyword the type is spelled with in source
    pub fn name(self) -> &'static str {
        match self {
            DeclaredType::Int => "int",
            DeclaredType::Float => "float",
            DeclaredType::String => "string",
            DeclaredType::Bool => "bool",
            DeclaredType::Array => "array",
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
