//! Syntax tree consumed by the code generator

use crate::token::{Operator, Position};
use crate::value::DeclaredType;

/// A whole program: a list of functions, one of which is `main`
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub pos: Position,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub return_type: Option<DeclaredType>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub pos: Position,
    pub ty: DeclaredType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub pos: Position,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    If {
        condition: Expression,
        body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    /// `for init; condition; increment; { body }`
    For {
        init: Box<Statement>,
        condition: Expression,
        increment: Box<Statement>,
        body: Vec<Statement>,
    },
    /// `from start to end as variable { body }`
    RangeFor {
        start: Expression,
        end: Expression,
        variable: String,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    /// `name[index] = value`
    ArrayAssign {
        name: String,
        index: Expression,
        value: Expression,
    },
    /// `[type] name = value`
    Assign {
        ty: Option<DeclaredType>,
        name: String,
        value: Expression,
    },
    Call(Call),
    Expression(Expression),
}

/// Left-associative tree of binary operators over factors
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary {
        pos: Position,
        op: Operator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Factor(Factor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub pos: Position,
    pub kind: FactorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    Literal(Literal),
    Variable(String),
    Call(Call),
    ArrayIndex { name: String, index: Box<Expression> },
    ArrayLiteral(Vec<Expression>),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub pos: Position,
    pub name: String,
    pub arguments: Vec<Expression>,
}

impl Expression {
    pub fn pos(&self) -> Position {
        match self {
            Expression::Binary { pos, .. } => *pos,
            Expression::Factor(factor) => factor.pos,
        }
    }
}
