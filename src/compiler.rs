//! Code generator: syntax tree to labeled bytecode
//!
//! Expressions compile to postfix code, each one wrapped in an ephemeral
//! `add_scope`/`sub_scope` pair so its evaluation stack is isolated. The value
//! left on top when the scope closes is what the following instruction
//! (assignment, return, branch, argument push, array access) consumes.
//!
//! Labels are named after the kind of construct and the number of
//! instructions emitted so far, so compiling the same tree twice yields the
//! same bytecode.

use std::collections::HashMap;

use crate::{
    ast::{Call, Code, Expression, FactorKind, Function, Statement, StatementKind},
    builtins::Builtins,
    bytecode::{Bytecode, Op, FUNCTION_LABEL_PREFIX},
    error::CompileError,
    token::Position,
    value::DeclaredType,
};

/// Name of the function the program starts in
pub const ENTRY_POINT: &str = "main";

/// Compile `code`, resolving calls against user functions first and `builtins` second
pub fn compile(code: &Code, builtins: &Builtins) -> Result<Bytecode, CompileError> {
    Compiler::new(builtins).compile(code)
}

/// What a call site needs to know about a user function
#[derive(Debug, Clone, Copy)]
struct Signature {
    arity: usize,
    return_type: Option<DeclaredType>,
}

pub struct Compiler<'b> {
    builtins: &'b Builtins,
    functions: HashMap<String, Signature>,
    bytecode: Bytecode,
    // Unresolved calls do not stop generation; the first one is reported
    errors: Vec<CompileError>,
}

impl<'b> Compiler<'b> {
    pub fn new(builtins: &'b Builtins) -> Self {
        Compiler {
            builtins,
            functions: HashMap::new(),
            bytecode: Bytecode::new(),
            errors: Vec::new(),
        }
    }

    pub fn compile(mut self, code: &Code) -> Result<Bytecode, CompileError> {
        // First pass so call sites can refer to functions declared later
        for function in &code.functions {
            self.register(function)?;
        }

        if !self.functions.contains_key(ENTRY_POINT) {
            return Err(CompileError::MissingEntryPoint);
        }

        for function in &code.functions {
            self.emit_function(function)?;
        }

        self.bytecode.entry = self.bytecode.len();
        self.emit_call(&Call {
            pos: Position::default(),
            name: ENTRY_POINT.to_string(),
            arguments: Vec::new(),
        });
        self.bytecode.push(Op::Exit, Position::default());

        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(self.bytecode)
    }

    fn register(&mut self, function: &Function) -> Result<(), CompileError> {
        if self.functions.contains_key(&function.name) {
            return Err(CompileError::DuplicateFunction(function.name.clone()));
        }

        self.functions.insert(
            function.name.clone(),
            Signature {
                arity: function.arguments.len(),
                return_type: function.return_type,
            },
        );
        Ok(())
    }

    fn emit_function(&mut self, function: &Function) -> Result<(), CompileError> {
        let label = format!("{FUNCTION_LABEL_PREFIX}{}", function.name);
        if self.bytecode.resolve(&label).is_some() {
            return Err(CompileError::DuplicateFunction(function.name.clone()));
        }
        self.bytecode.push_labeled(Op::Function, label, function.pos)?;

        for argument in &function.arguments {
            self.bytecode.push(
                Op::SetLocalVarArg {
                    ty: argument.ty,
                    name: argument.name.clone(),
                },
                argument.pos,
            );
        }

        self.emit_body(&function.body)?;

        if self.bytecode.last() != Some(&Op::FunctionReturn) {
            self.bytecode.push(Op::FunctionReturn, function.pos);
        }
        Ok(())
    }

    fn emit_body(&mut self, statements: &[Statement]) -> Result<(), CompileError> {
        for statement in statements {
            self.emit_statement(statement)?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        let pos = statement.pos;
        match &statement.kind {
            StatementKind::If { condition, body } => {
                self.emit_scoped(condition);
                let end = self.new_label("if");
                self.bytecode.push(Op::If(end.clone()), pos);
                self.emit_body(body)?;
                self.bytecode.push_labeled(Op::IfEnd, end, pos)?;
            }
            StatementKind::While { condition, body } => {
                let start = self.new_label("while");
                self.bytecode
                    .push_labeled(Op::WhileStart, start.clone(), pos)?;
                self.emit_scoped(condition);

                let end = self.new_label("while");
                self.bytecode.push(Op::While(end.clone()), pos);
                self.emit_body(body)?;
                self.bytecode.push(Op::Jmp(start), pos);
                self.bytecode.push_labeled(Op::WhileEnd, end, pos)?;
            }
            StatementKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.emit_statement(init)?;

                let start = self.new_label("for");
                self.bytecode.push_labeled(Op::ForStart, start.clone(), pos)?;
                self.emit_scoped(condition);

                let end = self.new_label("for");
                self.bytecode.push(Op::For(end.clone()), pos);
                self.emit_body(body)?;
                self.emit_statement(increment)?;
                self.bytecode.push(Op::Jmp(start), pos);
                self.bytecode.push_labeled(Op::ForEnd, end, pos)?;
            }
            StatementKind::RangeFor {
                start,
                end,
                variable,
                body,
            } => {
                self.emit_scoped(start);
                self.bytecode.push(
                    Op::SetLocalVarExp {
                        ty: Some(DeclaredType::Int),
                        name: variable.clone(),
                    },
                    pos,
                );
                self.emit_scoped(end);
                self.bytecode.push(
                    Op::SetLocalVarExp {
                        ty: Some(DeclaredType::Int),
                        name: format!("{variable}_end"),
                    },
                    pos,
                );

                let start_label = self.new_label("forinc");
                let end_label = self.new_label("forinc_e");
                self.bytecode.push_labeled(
                    Op::ForIncStart {
                        var: variable.clone(),
                        end: end_label.clone(),
                    },
                    start_label.clone(),
                    pos,
                )?;
                self.emit_body(body)?;
                self.bytecode.push(
                    Op::ForInc {
                        var: variable.clone(),
                        start: start_label,
                    },
                    pos,
                );
                self.bytecode.push_labeled(Op::ForIncEnd, end_label, pos)?;
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.emit_scoped(value);
                    self.bytecode.push(Op::PushBelow, pos);
                }
                self.bytecode.push(Op::FunctionReturn, pos);
            }
            StatementKind::ArrayAssign { name, index, value } => {
                self.emit_scoped(index);
                self.bytecode.push(Op::PushLastExp, pos);
                self.emit_scoped(value);
                self.bytecode.push(Op::SetArrayVarExp(name.clone()), pos);
            }
            StatementKind::Assign { ty, name, value } => {
                self.emit_scoped(value);
                self.bytecode.push(
                    Op::SetLocalVarExp {
                        ty: *ty,
                        name: name.clone(),
                    },
                    pos,
                );
            }
            StatementKind::Call(call) => {
                // A discarded return value lands in this scope and goes away with it
                self.bytecode.push(Op::AddScope, pos);
                self.emit_call(call);
                self.bytecode.push(Op::SubScope, pos);
            }
            StatementKind::Expression(expression) => self.emit_scoped(expression),
        }
        Ok(())
    }

    /// Emit an expression inside its own ephemeral scope
    fn emit_scoped(&mut self, expression: &Expression) {
        let pos = expression.pos();
        self.bytecode.push(Op::AddScope, pos);
        self.emit_expression(expression);
        self.bytecode.push(Op::SubScope, pos);
    }

    fn emit_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Binary { pos, op, lhs, rhs } => {
                self.emit_expression(lhs);
                self.emit_expression(rhs);
                self.bytecode.push(Op::ExpCall(*op), *pos);
            }
            Expression::Factor(factor) => {
                let pos = factor.pos;
                match &factor.kind {
                    FactorKind::Literal(literal) => {
                        self.bytecode.push(Op::PushExp(literal.clone()), pos)
                    }
                    FactorKind::Variable(name) => {
                        self.bytecode.push(Op::PushExpVar(name.clone()), pos)
                    }
                    FactorKind::Call(call) => self.emit_call(call),
                    FactorKind::ArrayIndex { name, index } => {
                        self.emit_scoped(index);
                        self.bytecode.push(Op::PushArrCall(name.clone()), pos);
                    }
                    FactorKind::ArrayLiteral(items) => {
                        self.bytecode.push(Op::PushEmptyArr, pos);
                        for item in items {
                            self.emit_scoped(item);
                            self.bytecode.push(Op::PushArrExp, item.pos());
                        }
                    }
                    FactorKind::Parenthesized(inner) => self.emit_expression(inner),
                }
            }
        }
    }

    fn emit_call(&mut self, call: &Call) {
        for argument in &call.arguments {
            self.emit_scoped(argument);
            self.bytecode.push(Op::PushFunctionArg, call.pos);
        }

        let argc = call.arguments.len();
        let return_type = if let Some(signature) = self.functions.get(&call.name) {
            if signature.arity != argc {
                self.errors.push(CompileError::ArityMismatch {
                    name: call.name.clone(),
                    expected: signature.arity,
                    got: argc,
                });
            }
            signature.return_type
        } else {
            if !self.builtins.contains(&call.name) {
                self.errors
                    .push(CompileError::UnresolvedCall(call.name.clone()));
            }
            None
        };

        self.bytecode.push(
            Op::CallFunction {
                name: call.name.clone(),
                argc,
                return_type,
            },
            call.pos,
        );
    }

    fn new_label(&self, kind: &str) -> String {
        format!("_{}.{:x}", kind, self.bytecode.len())
    }
}
