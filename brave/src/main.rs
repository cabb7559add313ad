use clap::Parser as ClapParser;
use std::{
    io::{self, BufRead, Write},
    process,
};

use brave::{AssignMode, Interpreter, MemoryResources, Outcome, Resources, Value, compile};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Expressions to evaluate in order
    #[arg(required = false, help = "Expressions evaluated against one store")]
    exprs: Vec<String>,

    /// Compile assignments in direct mode
    #[arg(long, help = "Assignments always write the local scope")]
    direct: bool,

    /// Print bytecode instead of executing
    #[arg(long, help = "Dump the compiled bytecode of each expression")]
    dump_bytecode: bool,

    /// Start REPL after evaluating expressions (default if none)
    #[arg(long, help = "Force REPL mode after evaluation")]
    repl: bool,

    /// Seed a resource before evaluation
    #[arg(long = "set", value_name = "KEY=EXPR", help = "Seed $KEY with the value of EXPR")]
    set: Vec<String>,

    /// The value `$parameter` reads
    #[arg(long, value_name = "EXPR", help = "Expression evaluated once for $parameter")]
    parameter: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mode = if cli.direct {
        AssignMode::Direct
    } else {
        AssignMode::Scoped
    };
    let store = MemoryResources::new();

    for seed in &cli.set {
        if let Err(err) = seed_resource(&store, seed) {
            eprintln!("Error seeding '{seed}': {err}");
            process::exit(1);
        }
    }

    let parameter = match &cli.parameter {
        Some(text) => match evaluate(&store, text, AssignMode::Direct, Value::Null) {
            Ok(outcome) => outcome.into_value(),
            Err(err) => {
                eprintln!("Error evaluating parameter: {err}");
                process::exit(1);
            }
        },
        None => Value::Null,
    };

    for expr in &cli.exprs {
        if cli.dump_bytecode {
            match compile(expr, mode) {
                Ok(code) => {
                    println!("== {expr} ==");
                    print!("{code}");
                }
                Err(err) => {
                    eprintln!("Error compiling '{expr}': {err}");
                    process::exit(1);
                }
            }
            continue;
        }

        match evaluate(&store, expr, mode, parameter.clone()) {
            Ok(outcome) => print_outcome(&outcome),
            Err(err) => {
                eprintln!("Error evaluating '{expr}': {err}");
                process::exit(1);
            }
        }
    }

    if cli.dump_bytecode {
        return;
    }

    if cli.repl || cli.exprs.is_empty() {
        run_repl(&store, mode, parameter);
    }
}

fn seed_resource(store: &MemoryResources, seed: &str) -> brave::Result<()> {
    let Some((key, expr)) = seed.split_once('=') else {
        let assignment = format!("${} = null", seed.trim().trim_start_matches('$'));
        evaluate(store, &assignment, AssignMode::Direct, Value::Null)?;
        return Ok(());
    };
    let key = key.trim().trim_start_matches('$');
    let value = evaluate(store, expr, AssignMode::Direct, Value::Null)?.into_value();
    store.set(&format!("${key}"), value);
    Ok(())
}

fn evaluate(
    store: &MemoryResources,
    text: &str,
    mode: AssignMode,
    parameter: Value,
) -> brave::Result<Outcome> {
    let code = compile(text, mode)?;
    let outcome = Interpreter::new(store).with_parameter(parameter).run(&code)?;
    Ok(outcome)
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Value(value) => println!("{value}"),
        Outcome::Void => println!("(void)"),
    }
}

/// What the REPL does after a line.
enum Step {
    Continue,
    Quit,
}

fn run_repl(store: &MemoryResources, mode: AssignMode, parameter: Value) {
    eprintln!("brave {} ({mode:?} assignments)", env!("CARGO_PKG_VERSION"));
    eprintln!(":keys lists resources, :clear empties the store, :dump EXPR shows bytecode, :quit exits");

    let mut lines = io::stdin().lock().lines();
    loop {
        print!("brave> ");
        if let Err(err) = io::stdout().flush() {
            eprintln!("Error flushing stdout: {err}");
            return;
        }

        let line = match lines.next() {
            None => return,
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                eprintln!("Error reading input: {err}");
                return;
            }
        };

        match handle_line(store, line.trim(), mode, &parameter) {
            Step::Continue => {}
            Step::Quit => return,
        }
    }
}

fn handle_line(store: &MemoryResources, line: &str, mode: AssignMode, parameter: &Value) -> Step {
    match line {
        "" => {}
        ":quit" | "exit" => return Step::Quit,
        ":keys" => print_resources(store),
        ":clear" => store.clear(),
        _ => {
            if let Some(expr) = line.strip_prefix(":dump") {
                match compile(expr.trim(), mode) {
                    Ok(code) => print!("{code}"),
                    Err(err) => eprintln!("Error: {err}"),
                }
            } else {
                match evaluate(store, line, mode, parameter.clone()) {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
        }
    }
    Step::Continue
}

fn print_resources(store: &MemoryResources) {
    let mut keys = store.keys();
    keys.sort();
    for key in keys {
        let value = store.get(&key).unwrap_or_default();
        println!("{key} = {value}");
    }
}
