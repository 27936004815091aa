//! Scope stack of the virtual machine
//!
//! Every function call opens a *final* scope and every expression is evaluated
//! inside an ephemeral scope of its own. Variable lookup walks from the
//! innermost scope outward and stops at the nearest final scope, so a callee
//! never sees its caller's locals.

use std::collections::HashMap;

use crate::error::Fault;
use crate::value::{DeclaredType, Value};

/// A variable together with the type it was declared with
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub ty: DeclaredType,
}

/// Lexical frame: an expression stack and the variables bound in it
#[derive(Debug, Default)]
pub struct Scope {
    stack: Vec<Value>,
    vars: HashMap<String, Binding>,
    is_final: bool,
}

impl Scope {
    pub fn new(is_final: bool) -> Self {
        Scope {
            is_final,
            ..Default::default()
        }
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::EmptyExpressionStack)
    }

    /// Consume the scope, keeping only the top of its expression stack
    pub fn into_result(mut self) -> Option<Value> {
        self.stack.pop()
    }
}

/// Stack of scopes owned by one program run
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn open(&mut self, is_final: bool) {
        self.scopes.push(Scope::new(is_final));
    }

    pub fn close(&mut self) -> Result<Scope, Fault> {
        self.scopes.pop().ok_or(Fault::NoActiveScope)
    }

    /// Innermost scope
    pub fn current(&mut self) -> Result<&mut Scope, Fault> {
        self.scopes.last_mut().ok_or(Fault::NoActiveScope)
    }

    /// The scope one level below the innermost one
    pub fn below_current(&mut self) -> Result<&mut Scope, Fault> {
        let depth = self.scopes.len();
        if depth < 2 {
            return Err(Fault::NoActiveScope);
        }
        Ok(&mut self.scopes[depth - 2])
    }

    /// Index of the first scope visible from the innermost one
    fn visible_from(&self) -> usize {
        self.scopes
            .iter()
            .rposition(Scope::is_final)
            .unwrap_or(0)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.scopes[self.visible_from()..]
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        let from = self.visible_from();
        self.scopes[from..]
            .iter_mut()
            .rev()
            .find_map(|scope| scope.vars.get_mut(name))
    }

    /// Read a variable visible from the innermost scope
    pub fn lookup(&self, name: &str) -> Result<&Value, Fault> {
        self.get(name)
            .map(|binding| &binding.value)
            .ok_or_else(|| Fault::UndeclaredVariable(name.to_string()))
    }

    /// Bind `name` to `value`.
    ///
    /// A visible binding with the same name is overwritten in the scope that
    /// holds it; otherwise a new binding is created in the innermost scope.
    /// Without a declared type the existing binding's type is kept, and a
    /// missing binding is an error. The value must match the resulting type.
    pub fn assign(
        &mut self,
        name: &str,
        value: Value,
        ty: Option<DeclaredType>,
    ) -> Result<(), Fault> {
        if let Some(binding) = self.get_mut(name) {
            let ty = ty.unwrap_or(binding.ty);
            check_type(&value, ty)?;
            *binding = Binding { value, ty };
            return Ok(());
        }

        let ty = ty.ok_or_else(|| Fault::UndeclaredVariable(name.to_string()))?;
        check_type(&value, ty)?;
        self.current()?
            .vars
            .insert(name.to_string(), Binding { value, ty });
        Ok(())
    }

    /// Mutable access to a visible array variable
    pub fn array_mut(&mut self, name: &str) -> Result<&mut Vec<Value>, Fault> {
        match self.get_mut(name) {
            Some(Binding {
                value: Value::Array(items),
                ..
            }) => Ok(items),
            Some(binding) => Err(Fault::type_mismatch(
                DeclaredType::Array,
                binding.value.declared_type(),
            )),
            None => Err(Fault::UndeclaredVariable(name.to_string())),
        }
    }
}

/// Fail unless `value` is of type `ty`
pub fn check_type(value: &Value, ty: DeclaredType) -> Result<(), Fault> {
    let got = value.declared_type();
    if got == ty {
        Ok(())
    } else {
        Err(Fault::type_mismatch(ty, got))
    }
}
