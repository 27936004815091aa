//! Host provided functions callable from scripts

use std::{
    collections::HashMap,
    io::{BufRead, Write},
};

use anyhow::Context;

use crate::{value::Value, vm::Vm};

/// A built-in receives exactly the arguments of its call site and may hand
/// back one value, which is pushed onto the caller's expression stack.
pub type BuiltinFn = for<'a> fn(&mut Vm<'a>, Vec<Value>) -> anyhow::Result<Option<Value>>;

/// Name to handler table shared by the compiler (to resolve call sites) and
/// the virtual machine (to run them)
#[derive(Debug, Clone, Default)]
pub struct Builtins {
    fns: HashMap<&'static str, BuiltinFn>,
}

impl Builtins {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// `out`, `readLine` and `readInt`
    pub fn standard() -> Self {
        let mut builtins = Self::new();
        builtins
            .register("out", out)
            .register("readLine", read_line)
            .register("readInt", read_int);
        builtins
    }

    pub fn register(&mut self, name: &'static str, f: BuiltinFn) -> &mut Self {
        self.fns.insert(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.fns.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }
}

/// Prints all arguments separated by spaces, then a newline.
fn out(vm: &mut Vm<'_>, args: Vec<Value>) -> anyhow::Result<Option<Value>> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(vm.output(), "{line}")?;
    Ok(None)
}

/// Reads one line without its terminator. End of input reads as "".
fn read_line(vm: &mut Vm<'_>, _args: Vec<Value>) -> anyhow::Result<Option<Value>> {
    Ok(Some(Value::String(next_line(vm)?)))
}

/// Reads one line and parses it as an integer.
fn read_int(vm: &mut Vm<'_>, _args: Vec<Value>) -> anyhow::Result<Option<Value>> {
    let line = next_line(vm)?;
    let number = line
        .trim()
        .parse::<i64>()
        .with_context(|| format!("expected an integer, got {:?}", line.trim()))?;
    Ok(Some(Value::Int(number)))
}

fn next_line(vm: &mut Vm<'_>) -> anyhow::Result<String> {
    let mut line = String::new();
    vm.input().read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}
