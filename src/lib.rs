//! Karbo is a compiler and stack-based virtual machine for KarboScript.
//!
//! A program is parsed into a syntax tree, compiled into a flat list of
//! labeled instructions and run by [`vm::Vm`].
//!
//! # Example
//!
//! ```text
//! function fact(int n) int {
//!     if n < 2 { return 1; }
//!     return n * fact(n - 1);
//! }
//!
//! function main() {
//!     array values = [1, 2, 3];
//!     values[0] = fact(5);
//!     from 0 to 3 as i {
//!         out(i, values[i]);
//!     }
//! }
//! ```
//!
//! # Instructions
//!
//! | Instruction        | Usage                           | Brief   |
//! |--------------------|---------------------------------|---------|
//! | function           | `_function.name: function`      | Entry marker of a function. |
//! | set_local_var_arg  | `set_local_var_arg ( ty name )` | Bind the next passed argument to a parameter. |
//! | set_local_var_exp  | `set_local_var_exp ( ty? name )`| Bind the last expression result to a variable. |
//! | set_array_var_exp  | `set_array_var_exp ( name )`    | Pop an index and store the last expression result at it. |
//! | function_return    | `function_return`               | Close the function scope and jump to the return address. |
//! | push_bellow        | `push_bellow`                   | Hand the last expression result to the caller's scope. |
//! | add_scope          | `add_scope`                     | Open an ephemeral scope. |
//! | sub_scope          | `sub_scope`                     | Close the innermost scope, keeping its top value as the last expression result. |
//! | push_exp           | `push_exp ( literal )`          | Push a literal. |
//! | push_exp_var       | `push_exp_var ( name )`         | Push the value of a variable. |
//! | push_last_exp      | `push_last_exp`                 | Push the last expression result. |
//! | exp_call           | `exp_call ( op )`               | Pop two values, apply `op` and push the result. |
//! | push_function_arg  | `push_function_arg`             | Move the last expression result into the argument buffer. |
//! | call_function      | `call_function ( name argc ty? )` | Call a built-in or a user function. |
//! | if / while / for   | `if ( label )`                  | Jump to `label` if the last expression result is `false`. |
//! | forinc_start       | `forinc_start ( var label )`    | Jump to `label` once `var` reached `var_end`. |
//! | forinc             | `forinc ( var label )`          | Step `var` toward `var_end` and jump back to `label`. |
//! | jmp                | `jmp ( label )`                 | Jump to `label`. |
//! | push_empty_arr     | `push_empty_arr`                | Push an empty array. |
//! | push_arr_exp       | `push_arr_exp`                  | Append the last expression result to the array on the stack. |
//! | push_arr_call      | `push_arr_call ( name )`        | Push `name[last expression result]`. |
//! | exit               | `exit`                          | Stop the program. |
//!
//! `if_else`, `while_start`, `while_else`, `for_start`, `for_end` and
//! `forinc_end` are markers that only carry labels.
//!
//! # Built-in functions
//!
//! ## out
//! Prints its arguments separated by spaces, followed by a newline.
//!
//! ## readLine
//! Reads a line from the input without its terminator. Returns `""` at end of input.
//!
//! ## readInt
//! Reads a line from the input and parses it as an integer.
//!
//! # Important notes
//!
//! - Entry point is the `main` function. Every program should implement it.
//! - Every piece of code should be written under a function. There is no global code/variable mechanism.
//! - A function only sees its own locals, never the ones of its caller.
//! - Arithmetic and comparisons are defined on integers only.
//! - Arrays are values. Assigning one copies it.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod error;
mod lexer;
pub mod parser;
pub mod scope;
pub mod token;
pub mod value;
pub mod vm;

pub use builtins::Builtins;
pub use bytecode::Bytecode;
pub use compiler::compile;
pub use error::{CompileError, ExecutionError, Fault};
pub use parser::parse;
pub use vm::{Vm, VmConfig};
