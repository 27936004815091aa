use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use karbo::{Vm, VmConfig};

/// Compile and run a KarboScript program
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source file to run
    file: PathBuf,

    /// Print the instruction listing instead of running the program
    #[arg(long)]
    opcode: bool,

    /// Maximum number of instructions to execute
    #[arg(long, value_name = "N", conflicts_with = "unbounded")]
    step_budget: Option<u64>,

    /// Run without an instruction limit
    #[arg(long)]
    unbounded: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let program = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let vm = Vm::load(&program)?;

    if args.opcode {
        print!("{}", vm.bytecode());
        return Ok(());
    }

    let mut config = VmConfig::default();
    if args.unbounded {
        config.step_budget = None;
    } else if let Some(budget) = args.step_budget {
        config.step_budget = Some(budget);
    }

    let mut vm = vm.with_config(config);
    vm.run()
}
