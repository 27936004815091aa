//! Bytecode representation

use std::{collections::HashMap, fmt};

use crate::{
    ast::Literal,
    error::CompileError,
    token::{Operator, Position},
    value::DeclaredType,
};

/// Label prefix of a function's entry instruction
pub const FUNCTION_LABEL_PREFIX: &str = "_function.";

/// Representation of bytecode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    /// Array of instructions from top to bottom
    pub instructions: Vec<Instruction>,
    /// Maps every bound label to the index of its instruction
    pub labels: HashMap<String, usize>,
    /// Index of the instruction execution starts at
    pub entry: usize,
}

/// One compiled unit
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub label: Option<String>,
    pub position: Position,
}

/// Supported operations of the bytecode
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Entry marker of a function
    Function,
    /// Bind the next passed argument to a parameter
    SetLocalVarArg { ty: DeclaredType, name: String },
    /// Bind the last expression result to a variable
    SetLocalVarExp {
        ty: Option<DeclaredType>,
        name: String,
    },
    /// Write the last expression result into an array element, the index is on the stack
    SetArrayVarExp(String),
    /// Return to the caller
    FunctionReturn,
    /// Hand the last expression result to the caller's scope
    PushBelow,
    /// Open an ephemeral scope
    AddScope,
    /// Close the innermost scope, its top value becomes the last expression result
    SubScope,
    /// Push a literal
    PushExp(Literal),
    /// Push the value of a variable
    PushExpVar(String),
    /// Push the last expression result
    PushLastExp,
    /// Apply a binary operator to the two topmost values
    ExpCall(Operator),
    /// Move the last expression result into the argument buffer
    PushFunctionArg,
    /// Call a built-in or user function
    CallFunction {
        name: String,
        argc: usize,
        return_type: Option<DeclaredType>,
    },
    /// Jump to the label if the condition is false
    If(String),
    /// End of an `if` body
    IfEnd,
    /// Start of a `while` condition
    WhileStart,
    /// Jump to the label if the condition is false
    While(String),
    /// End of a `while` loop
    WhileEnd,
    /// Start of a `for` condition
    ForStart,
    /// Jump to the label if the condition is false
    For(String),
    /// End of a `for` loop
    ForEnd,
    /// Jump to `end` if `var` reached `var_end`
    ForIncStart { var: String, end: String },
    /// Step `var` toward `var_end` and jump back to `start`
    ForInc { var: String, start: String },
    /// End of a range loop
    ForIncEnd,
    /// Unconditionally jump to the label
    Jmp(String),
    /// Push an empty array
    PushEmptyArr,
    /// Append the last expression result to the array on top of the stack
    PushArrExp,
    /// Push an element of an array, the index is the last expression result
    PushArrCall(String),
    /// Stop the program
    Exit,
}

/// An operand as it shows up in the instruction listing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Str(s) => f.write_str(s),
            Operand::Int(n) => write!(f, "{n}"),
            Operand::Float(x) => write!(f, "{x}"),
            Operand::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Op {
    /// Name of the operation in the listing
    pub fn name(&self) -> &'static str {
        match self {
            Op::Function => "function",
            Op::SetLocalVarArg { .. } => "set_local_var_arg",
            Op::SetLocalVarExp { .. } => "set_local_var_exp",
            Op::SetArrayVarExp(_) => "set_array_var_exp",
            Op::FunctionReturn => "function_return",
            Op::PushBelow => "push_bellow",
            Op::AddScope => "add_scope",
            Op::SubScope => "sub_scope",
            Op::PushExp(_) => "push_exp",
            Op::PushExpVar(_) => "push_exp_var",
            Op::PushLastExp => "push_last_exp",
            Op::ExpCall(_) => "exp_call",
            Op::PushFunctionArg => "push_function_arg",
            Op::CallFunction { .. } => "call_function",
            Op::If(_) => "if",
            Op::IfEnd => "if_else",
            Op::WhileStart => "while_start",
            Op::While(_) => "while",
            Op::WhileEnd => "while_else",
            Op::ForStart => "for_start",
            Op::For(_) => "for",
            Op::ForEnd => "for_end",
            Op::ForIncStart { .. } => "forinc_start",
            Op::ForInc { .. } => "forinc",
            Op::ForIncEnd => "forinc_end",
            Op::Jmp(_) => "jmp",
            Op::PushEmptyArr => "push_empty_arr",
            Op::PushArrExp => "push_arr_exp",
            Op::PushArrCall(_) => "push_arr_call",
            Op::Exit => "exit",
        }
    }

    /// Operands in listing order
    pub fn operands(&self) -> Vec<Operand<'_>> {
        match self {
            Op::SetLocalVarArg { ty, name } => vec![Operand::Str(ty.name()), Operand::Str(name)],
            Op::SetLocalVarExp { ty, name } => ty
                .iter()
                .map(|ty| Operand::Str(ty.name()))
                .chain([Operand::Str(name)])
                .collect(),
            Op::SetArrayVarExp(name) | Op::PushExpVar(name) | Op::PushArrCall(name) => {
                vec![Operand::Str(name)]
            }
            Op::PushExp(literal) => vec![match literal {
                Literal::Int(n) => Operand::Int(*n),
                Literal::Float(x) => Operand::Float(*x),
                Literal::String(s) => Operand::Str(s),
                Literal::Bool(b) => Operand::Bool(*b),
            }],
            Op::ExpCall(op) => vec![Operand::Str(op.symbol())],
            Op::CallFunction {
                name,
                argc,
                return_type,
            } => {
                let mut operands = vec![Operand::Str(name), Operand::Int(*argc as i64)];
                if let Some(ty) = return_type {
                    operands.push(Operand::Str(ty.name()));
                }
                operands
            }
            Op::If(label) | Op::While(label) | Op::For(label) | Op::Jmp(label) => {
                vec![Operand::Str(label)]
            }
            Op::ForIncStart { var, end: label } | Op::ForInc { var, start: label } => {
                vec![Operand::Str(var), Operand::Str(label)]
            }
            _ => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        f.write_str(self.op.name())?;

        let operands = self.op.operands();
        if !operands.is_empty() {
            f.write_str(" (")?;
            for operand in operands {
                write!(f, " {operand}")?;
            }
            f.write_str(" )")?;
        }
        Ok(())
    }
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn push(&mut self, op: Op, position: Position) {
        self.instructions.push(Instruction {
            op,
            label: None,
            position,
        });
    }

    /// Append an instruction and bind `label` to it
    pub fn push_labeled(
        &mut self,
        op: Op,
        label: String,
        position: Position,
    ) -> Result<(), CompileError> {
        if self.labels.contains_key(&label) {
            return Err(CompileError::DuplicateLabel(label));
        }
        self.labels.insert(label.clone(), self.instructions.len());
        self.instructions.push(Instruction {
            op,
            label: Some(label),
            position,
        });
        Ok(())
    }

    /// Index of the instruction `label` is bound to
    pub fn resolve(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn last(&self) -> Option<&Op> {
        self.instructions.last().map(|instruction| &instruction.op)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// One listing line per instruction
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}
