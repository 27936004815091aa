//! Virtual machine that runs the bytecode

use crate::{
    builtins::Builtins,
    bytecode::{Bytecode, Op, FUNCTION_LABEL_PREFIX},
    compiler::compile,
    error::{ExecutionError, Fault},
    parser::parse,
    scope::{check_type, ScopeStack},
    token::Operator,
    value::{DeclaredType, Value},
};
use anyhow::anyhow;
use std::{
    cmp::Ordering,
    collections::VecDeque,
    io::{self, BufRead, BufReader, Write},
};

/// Instructions a program may dispatch before it is stopped
pub const DEFAULT_STEP_BUDGET: u64 = 10_000_000;

/// Runtime knobs of the virtual machine
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VmConfig {
    /// Safety valve against runaway programs. `None` runs without a limit.
    pub step_budget: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            step_budget: Some(DEFAULT_STEP_BUDGET),
        }
    }
}

/// Pending user function call
#[derive(Debug)]
struct Call {
    return_address: usize,
    return_type: Option<DeclaredType>,
}

/// Virtual machine representation
pub struct Vm<'a> {
    bytecode: Bytecode,
    builtins: Builtins,
    config: VmConfig,

    pc: usize,     // program counter
    running: bool, // cleared by `exit`
    steps: u64,    // dispatched instructions

    calls: Vec<Call>,
    scopes: ScopeStack,
    arguments: Vec<Value>,     // evaluated call arguments not yet consumed
    incoming: VecDeque<Value>, // arguments of the call being entered
    result: Option<Value>,     // top value of the last closed scope

    input: Box<dyn BufRead + 'a>,
    output: Box<dyn Write + 'a>,
}

impl Vm<'static> {
    /// Parse and compile `program` against the standard built-ins
    pub fn load(program: &str) -> anyhow::Result<Self> {
        let code = parse(program)?;
        let builtins = Builtins::standard();
        let bytecode = compile(&code, &builtins)?;
        Ok(Vm::new(bytecode, builtins))
    }

    /// A machine reading stdin and writing stdout
    pub fn new(bytecode: Bytecode, builtins: Builtins) -> Self {
        Vm::with_io(
            bytecode,
            builtins,
            Box::new(BufReader::new(io::stdin())),
            Box::new(io::stdout()),
        )
    }
}

impl<'a> Vm<'a> {
    pub fn with_io(
        bytecode: Bytecode,
        builtins: Builtins,
        input: Box<dyn BufRead + 'a>,
        output: Box<dyn Write + 'a>,
    ) -> Self {
        let mut scopes = ScopeStack::new();
        // Receives the value `main` returns, if any
        scopes.open(true);

        Vm {
            pc: bytecode.entry,
            bytecode,
            builtins,
            config: VmConfig::default(),
            running: true,
            steps: 0,
            calls: Vec::new(),
            scopes,
            arguments: Vec::new(),
            incoming: VecDeque::new(),
            result: None,
            input,
            output,
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    pub fn input(&mut self) -> &mut (dyn BufRead + 'a) {
        self.input.as_mut()
    }

    pub fn output(&mut self) -> &mut (dyn Write + 'a) {
        self.output.as_mut()
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        if !self.running {
            return Err(anyhow!("Program is already ended."));
        }

        while self.running {
            self.next_instruction()?;
        }
        self.output.flush()?;
        Ok(())
    }

    /// Fetch, advance and dispatch one instruction
    pub fn next_instruction(&mut self) -> anyhow::Result<()> {
        let instruction = match self.bytecode.instructions.get(self.pc) {
            Some(instruction) => instruction.clone(),
            // Running off the end stops the program
            None => {
                self.running = false;
                return Ok(());
            }
        };

        if let Some(budget) = self.config.step_budget {
            if self.steps >= budget {
                self.running = false;
                return Err(ExecutionError {
                    position: instruction.position,
                    fault: Fault::StepBudgetExhausted(budget),
                }
                .into());
            }
        }
        self.steps += 1;
        self.pc += 1;

        self.dispatch(instruction.op).map_err(|fault| {
            self.running = false;
            ExecutionError {
                position: instruction.position,
                fault,
            }
            .into()
        })
    }

    fn dispatch(&mut self, op: Op) -> Result<(), Fault> {
        match op {
            // Markers carrying labels
            Op::Function
            | Op::IfEnd
            | Op::WhileStart
            | Op::WhileEnd
            | Op::ForStart
            | Op::ForEnd
            | Op::ForIncEnd => {}
            Op::SetLocalVarArg { ty, name } => {
                let value = match self.incoming.pop_front() {
                    Some(value) => value,
                    None => return Err(Fault::MissingArgument(name)),
                };
                self.scopes.assign(&name, value, Some(ty))?;
            }
            Op::SetLocalVarExp { ty, name } => {
                let value = self.take_result()?;
                self.scopes.assign(&name, value, ty)?;
            }
            Op::SetArrayVarExp(name) => self.ins_set_array_var(&name)?,
            Op::FunctionReturn => self.ins_function_return()?,
            Op::PushBelow => self.ins_push_below()?,
            Op::AddScope => self.scopes.open(false),
            Op::SubScope => self.result = self.scopes.close()?.into_result(),
            Op::PushExp(literal) => self.push(Value::from(&literal))?,
            Op::PushExpVar(name) => {
                let value = self.scopes.lookup(&name)?.clone();
                self.push(value)?;
            }
            Op::PushLastExp => {
                let value = self.take_result()?;
                self.push(value)?;
            }
            Op::ExpCall(operator) => {
                let scope = self.scopes.current()?;
                let rhs = scope.pop()?;
                let lhs = scope.pop()?;
                scope.push(apply(operator, lhs, rhs)?);
            }
            Op::PushFunctionArg => {
                let value = self.take_result()?;
                self.arguments.push(value);
            }
            Op::CallFunction {
                name,
                argc,
                return_type,
            } => self.ins_call(&name, argc, return_type)?,
            Op::If(label) | Op::While(label) | Op::For(label) => {
                self.ins_branch_unless(&label)?
            }
            Op::Jmp(label) => self.jump(&label)?,
            Op::ForIncStart { var, end } => {
                let (current, last) = self.range_bounds(&var)?;
                if current == last {
                    self.jump(&end)?;
                }
            }
            Op::ForInc { var, start } => {
                let (current, last) = self.range_bounds(&var)?;
                let next = match current.cmp(&last) {
                    Ordering::Less => current + 1,
                    Ordering::Greater => current - 1,
                    Ordering::Equal => current,
                };
                self.scopes.assign(&var, Value::Int(next), None)?;
                self.jump(&start)?;
            }
            Op::PushEmptyArr => self.push(Value::Array(Vec::new()))?,
            Op::PushArrExp => {
                let item = self.take_result()?;
                let scope = self.scopes.current()?;
                match scope.pop()? {
                    Value::Array(mut items) => {
                        items.push(item);
                        scope.push(Value::Array(items));
                    }
                    other => {
                        return Err(Fault::type_mismatch(
                            DeclaredType::Array,
                            other.declared_type(),
                        ))
                    }
                }
            }
            Op::PushArrCall(name) => {
                let index = self.take_result()?;
                let value = match self.scopes.lookup(&name)? {
                    Value::Array(items) => items[element_index(&index, items.len())?].clone(),
                    other => {
                        return Err(Fault::type_mismatch(
                            DeclaredType::Array,
                            other.declared_type(),
                        ))
                    }
                };
                self.push(value)?;
            }
            Op::Exit => self.running = false,
        }
        Ok(())
    }

    /// Push onto the innermost scope's expression stack
    fn push(&mut self, value: Value) -> Result<(), Fault> {
        self.scopes.current()?.push(value);
        Ok(())
    }

    /// Consume the value left by the last closed scope
    fn take_result(&mut self) -> Result<Value, Fault> {
        self.result.take().ok_or(Fault::EmptyExpressionStack)
    }

    fn resolve(&self, label: &str) -> Result<usize, Fault> {
        self.bytecode
            .resolve(label)
            .ok_or_else(|| Fault::UnresolvedLabel(label.to_string()))
    }

    fn jump(&mut self, label: &str) -> Result<(), Fault> {
        self.pc = self.resolve(label)?;
        Ok(())
    }

    /// Jump to `label` if the last result is false
    fn ins_branch_unless(&mut self, label: &str) -> Result<(), Fault> {
        match self.take_result()? {
            Value::Bool(true) => Ok(()),
            Value::Bool(false) => self.jump(label),
            other => Err(Fault::type_mismatch(
                DeclaredType::Bool,
                other.declared_type(),
            )),
        }
    }

    /// Current value of a range loop variable and its bound
    fn range_bounds(&self, var: &str) -> Result<(i64, i64), Fault> {
        let int = |name: &str| -> Result<i64, Fault> {
            let value = self.scopes.lookup(name)?;
            value
                .as_int()
                .ok_or_else(|| Fault::type_mismatch(DeclaredType::Int, value.declared_type()))
        };
        Ok((int(var)?, int(&format!("{var}_end"))?))
    }

    /// Write the last result into `name[index]`, the index waits on the stack
    fn ins_set_array_var(&mut self, name: &str) -> Result<(), Fault> {
        let value = self.take_result()?;
        let index = self.scopes.current()?.pop()?;
        let items = self.scopes.array_mut(name)?;
        let index = element_index(&index, items.len())?;
        items[index] = value;
        Ok(())
    }

    /// Move the returned value into the caller's scope before the callee's goes away
    fn ins_push_below(&mut self) -> Result<(), Fault> {
        let value = self.take_result()?;
        if let Some(ty) = self.calls.last().and_then(|call| call.return_type) {
            check_type(&value, ty)?;
        }
        self.scopes.below_current()?.push(value);
        Ok(())
    }

    fn ins_function_return(&mut self) -> Result<(), Fault> {
        self.scopes.close()?;
        let call = self.calls.pop().ok_or(Fault::UnexpectedReturn)?;
        self.pc = call.return_address;
        Ok(())
    }

    fn ins_call(
        &mut self,
        name: &str,
        argc: usize,
        return_type: Option<DeclaredType>,
    ) -> Result<(), Fault> {
        let label = format!("{FUNCTION_LABEL_PREFIX}{name}");

        // User functions shadow built-ins, the same way the compiler resolves them
        if self.bytecode.resolve(&label).is_none() {
            if let Some(builtin) = self.builtins.get(name) {
                let args = self.take_arguments(name, argc)?;
                let result = builtin(self, args).map_err(|error| Fault::Builtin {
                    name: name.to_string(),
                    error,
                })?;
                if let Some(value) = result {
                    self.push(value)?;
                }
                return Ok(());
            }
        }

        let target = self.resolve(&label)?;
        self.incoming = self.take_arguments(name, argc)?.into();
        self.calls.push(Call {
            return_address: self.pc,
            return_type,
        });
        self.pc = target;
        self.scopes.open(true);
        Ok(())
    }

    /// Remove the last `argc` arguments from the buffer, in call order
    fn take_arguments(&mut self, name: &str, argc: usize) -> Result<Vec<Value>, Fault> {
        if argc > self.arguments.len() {
            return Err(Fault::MissingArgument(name.to_string()));
        }
        Ok(self.arguments.split_off(self.arguments.len() - argc))
    }
}

/// Apply a binary operator. Both operands must be integers.
fn apply(operator: Operator, lhs: Value, rhs: Value) -> Result<Value, Fault> {
    let (l, r) = match (&lhs, &rhs) {
        (Value::Int(l), Value::Int(r)) => (*l, *r),
        (Value::Int(_), other) | (other, _) => {
            return Err(Fault::type_mismatch(
                DeclaredType::Int,
                other.declared_type(),
            ))
        }
    };

    let value = match operator {
        Operator::Add => Value::Int(l.checked_add(r).ok_or(Fault::Overflow)?),
        Operator::Sub => Value::Int(l.checked_sub(r).ok_or(Fault::Overflow)?),
        Operator::Mul => Value::Int(l.checked_mul(r).ok_or(Fault::Overflow)?),
        Operator::Div => {
            if r == 0 {
                return Err(Fault::DivisionByZero);
            }
            Value::Int(l.checked_div(r).ok_or(Fault::Overflow)?)
        }
        Operator::Eq => Value::Bool(l == r),
        Operator::Ne => Value::Bool(l != r),
        Operator::Gt => Value::Bool(l > r),
        Operator::Ge => Value::Bool(l >= r),
        Operator::Lt => Value::Bool(l < r),
        Operator::Le => Value::Bool(l <= r),
    };
    Ok(value)
}

/// Check an index value against an array length
fn element_index(index: &Value, length: usize) -> Result<usize, Fault> {
    let index = match index {
        Value::Int(n) => *n,
        other => {
            return Err(Fault::type_mismatch(
                DeclaredType::Int,
                other.declared_type(),
            ))
        }
    };

    match usize::try_from(index) {
        Ok(i) if i < length => Ok(i),
        _ => Err(Fault::IndexOutOfRange { index, length }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Position;

    fn run_with_input(program: &str, input: &str) -> (anyhow::Result<()>, String) {
        let code = parse(program).unwrap();
        let builtins = Builtins::standard();
        let bytecode = compile(&code, &builtins).unwrap();

        let mut output = Vec::new();
        let result = {
            let mut vm = Vm::with_io(
                bytecode,
                builtins,
                Box::new(input.as_bytes()),
                Box::new(&mut output),
            );
            vm.run()
        };
        (result, String::from_utf8(output).unwrap())
    }

    fn run_program(program: &str) -> String {
        let (result, output) = run_with_input(program, "");
        result.unwrap();
        output
    }

    fn run_fault(program: &str) -> ExecutionError {
        let (result, _) = run_with_input(program, "");
        result
            .unwrap_err()
            .downcast::<ExecutionError>()
            .unwrap()
    }

    fn lines(range: std::ops::Range<i32>) -> String {
        range.map(|i| format!("{i}\n")).collect()
    }

    #[test]
    fn expression() {
        assert_eq!(run_program("function main() { out(12 + 14); }"), "26\n");
    }

    #[test]
    fn function_return_value() {
        assert_eq!(
            run_program(
                "function main() { out(1000 + test() * 2 + 22); } function test() { return 100;}"
            ),
            "1222\n"
        );
        assert_eq!(
            run_program(
                "function main() { out(a1(), a2()); }function a1() { return 12; }function a2() { return 55; }"
            ),
            "12 55\n"
        );
    }

    #[test]
    fn function_with_argument() {
        assert_eq!(
            run_program(
                "function test(int test){return test + 200;} function main(){out(1000 + test(123)*2 + 22, test(123));}"
            ),
            "1668 323\n"
        );
    }

    #[test]
    fn nested_calls() {
        let program = r"
            function add(int a, int b) int { return a + b; }
            function main() { out(add(add(1, 2), add(3, 4)), add(10, 0 - 4)); }
        ";
        assert_eq!(run_program(program), "10 6\n");
    }

    #[test]
    fn recursion() {
        let program = r"
            function fact(int n) int {
                if n < 2 { return 1; }
                return n * fact(n - 1);
            }
            function main() { out(fact(10)); }
        ";
        assert_eq!(run_program(program), "3628800\n");
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            run_program("function main() { out(12 > 10, 10 == 10, 30 == 10, 10 != 10); }"),
            "true true false false\n"
        );
        assert_eq!(
            run_program("function main() { out(1 <= 1, 2 >= 3, 1 < 2); }"),
            "true false true\n"
        );
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(
            run_program("function main() { out(7 / 2, (0 - 7) / 2, 2 - 3 - 4); }"),
            "3 -3 -5\n"
        );
    }

    #[test]
    fn local_vars() {
        assert_eq!(
            run_program(
                "function test() { int a = 100; int aaa = 12 + a; return aaa;} function main() { out(test());}"
            ),
            "112\n"
        );
    }

    #[test]
    fn callee_cannot_see_caller_locals() {
        let err = run_fault("function test() { out(a); }function main() { int a = 10; test();}");

        assert!(matches!(&err.fault, Fault::UndeclaredVariable(name) if name == "a"));
        assert_eq!(err.position, Position::new(1, 23));
        assert_eq!(err.to_string(), "1:23: undeclared variable: a");
    }

    #[test]
    fn if_statement() {
        let program = r#"
            function main() {
                if (10 == 10) { out("10 == 10"); }
                if (500 < 200) { out("500 < 200"); }
                if (12 > 10) { out("12 > 10"); }
            }
        "#;
        assert_eq!(run_program(program), "10 == 10\n12 > 10\n");
    }

    #[test]
    fn while_loop() {
        let program = "function main() { int a = 0; while (a < 10) { out (a); a = a + 1; } }";
        assert_eq!(run_program(program), lines(0..10));
    }

    #[test]
    fn double_while() {
        let program = r"
            function main() {
                int a = 1;
                int b = 1;
                while (a < 3) {
                    b = 1;
                    while (b < 3) {
                        out (a, b);
                        b = b + 1;
                    }
                    a = a + 1;
                }
            }
        ";
        assert_eq!(run_program(program), "1 1\n1 2\n2 1\n2 2\n");
    }

    #[test]
    fn for_loop() {
        let program = "function main() { for int i=0; i<10; i=i+1; { out(i); } }";
        assert_eq!(run_program(program), lines(0..10));
    }

    #[test]
    fn range_loop() {
        assert_eq!(
            run_program("function main() { from 0 to 10 as i { out(i); } }"),
            lines(0..10)
        );
        assert_eq!(
            run_program("function main() { from 3 to 0 as i { out(i); } }"),
            "3\n2\n1\n"
        );
        assert_eq!(
            run_program("function main() { from 5 to 5 as i { out(i); } out(\"done\"); }"),
            "done\n"
        );
    }

    #[test]
    fn arrays() {
        let program = r"
            function main() {
                array a = [1, 2, 3];
                a[1] = 20;
                out(a, a[1], a[0] + a[2]);

                array b = a;
                b[0] = 5;
                out(a, b, [[1], []]);
            }
        ";
        assert_eq!(run_program(program), "[1 20 3] 20 4\n[1 20 3] [5 20 3] [[1] []]\n");
    }

    #[test]
    fn index_out_of_range() {
        let err = run_fault("function main() { array a = [1, 2, 3]; out(a[3]); }");
        assert!(matches!(
            err.fault,
            Fault::IndexOutOfRange {
                index: 3,
                length: 3
            }
        ));

        let err = run_fault("function main() { array a = []; a[0 - 1] = 1; }");
        assert!(matches!(
            err.fault,
            Fault::IndexOutOfRange {
                index: -1,
                length: 0
            }
        ));
    }

    #[test]
    fn division_by_zero() {
        let (result, output) =
            run_with_input("function main() { out(1); out(10 / 0); out(2); }", "");
        let err = result.unwrap_err().downcast::<ExecutionError>().unwrap();

        assert!(matches!(err.fault, Fault::DivisionByZero));
        assert_eq!(output, "1\n");
    }

    #[test]
    fn type_checks() {
        let err = run_fault("function main() { int a = \"x\"; }");
        assert!(matches!(
            err.fault,
            Fault::TypeMismatch {
                expected: DeclaredType::Int,
                got: DeclaredType::String
            }
        ));

        let err = run_fault("function f() int { return true; } function main() { out(f()); }");
        assert!(matches!(
            err.fault,
            Fault::TypeMismatch {
                expected: DeclaredType::Int,
                got: DeclaredType::Bool
            }
        ));

        let err = run_fault("function f(string s) { } function main() { f(1); }");
        assert!(matches!(
            err.fault,
            Fault::TypeMismatch {
                expected: DeclaredType::String,
                got: DeclaredType::Int
            }
        ));

        let err = run_fault("function main() { if 1 { } }");
        assert!(matches!(
            err.fault,
            Fault::TypeMismatch {
                expected: DeclaredType::Bool,
                got: DeclaredType::Int
            }
        ));

        let err = run_fault("function main() { out(\"a\" + \"b\"); }");
        assert!(matches!(err.fault, Fault::TypeMismatch { .. }));

        let err = run_fault("function main() { x = 1; }");
        assert!(matches!(err.fault, Fault::UndeclaredVariable(_)));
    }

    #[test]
    fn missing_return_value() {
        let err = run_fault("function v() { } function main() { int a = v(); }");
        assert!(matches!(err.fault, Fault::EmptyExpressionStack));
    }

    #[test]
    fn statement_calls() {
        let program = r#"
            function hello() { out("hi"); return; }
            function one() int { return 1; }
            function main() { hello(); one(); hello(); }
        "#;
        assert_eq!(run_program(program), "hi\nhi\n");
    }

    #[test]
    fn user_function_shadows_builtin() {
        let program = r#"
            function readInt() int { return 7; }
            function main() { out(readInt()); }
        "#;
        assert_eq!(run_program(program), "7\n");
    }

    #[test]
    fn builtin_input() {
        let program = r"
            function main() {
                string name = readLine();
                int n = readInt();
                out(name, n + 1);
            }
        ";
        let (result, output) = run_with_input(program, "bob\n41\n");
        result.unwrap();
        assert_eq!(output, "bob 42\n");

        let (result, _) = run_with_input("function main() { int n = readInt(); }", "abc\n");
        let err = result.unwrap_err().downcast::<ExecutionError>().unwrap();
        assert!(matches!(&err.fault, Fault::Builtin { name, .. } if name == "readInt"));
    }

    #[test]
    fn step_budget() {
        let code = parse("function main() { while true { } }").unwrap();
        let builtins = Builtins::standard();
        let bytecode = compile(&code, &builtins).unwrap();

        let mut vm = Vm::with_io(bytecode, builtins, Box::new(io::empty()), Box::new(io::sink()))
            .with_config(VmConfig {
                step_budget: Some(1000),
            });
        let err = vm.run().unwrap_err().downcast::<ExecutionError>().unwrap();
        assert!(matches!(err.fault, Fault::StepBudgetExhausted(1000)));
        assert!(!vm.is_running());
    }

    #[test]
    fn state_after_run() {
        let code = parse("function f(int n) int { return n; } function main() { out(f(1)); }").unwrap();
        let builtins = Builtins::standard();
        let bytecode = compile(&code, &builtins).unwrap();

        let mut vm = Vm::with_io(bytecode, builtins, Box::new(io::empty()), Box::new(io::sink()));
        vm.next_instruction().unwrap();
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.scope_depth(), 2);

        vm.run().unwrap();
        assert!(!vm.is_running());
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.scope_depth(), 1);
        assert!(vm.run().is_err());
    }

    #[test]
    fn unresolved_label() {
        let mut bytecode = Bytecode::new();
        bytecode.push(Op::Jmp("_nowhere.0".into()), Position::new(2, 5));

        let mut vm = Vm::with_io(
            bytecode,
            Builtins::new(),
            Box::new(io::empty()),
            Box::new(io::sink()),
        );
        let err = vm.run().unwrap_err();
        assert_eq!(err.to_string(), "2:5: can't find label: _nowhere.0");
    }

    #[test]
    fn apply_operators() {
        assert_eq!(
            apply(Operator::Sub, Value::Int(3), Value::Int(5)).unwrap(),
            Value::Int(-2)
        );
        assert!(matches!(
            apply(Operator::Mul, Value::Int(i64::MAX), Value::Int(2)),
            Err(Fault::Overflow)
        ));
        assert!(matches!(
            apply(Operator::Div, Value::Int(i64::MIN), Value::Int(-1)),
            Err(Fault::Overflow)
        ));
        assert!(matches!(
            apply(Operator::Eq, Value::Float(1.0), Value::Int(1)),
            Err(Fault::TypeMismatch {
                expected: DeclaredType::Int,
                got: DeclaredType::Float
            })
        ));
    }
}
