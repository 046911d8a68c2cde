//! Calculator Example
//!
//! An interactive calculator showing the main pieces of Marshal:
//!
//! - groups with aliases (`math`, `m`)
//! - overloads tried best-first, with fallthrough (`add 1 2` vs `add 1 2.5`)
//! - remainder, list and constructible parameters
//! - services injected into handlers (`mem`)
//! - conditions on a group (`admin`, only for `--user admin`)
//!
//! # Usage
//!
//! ```bash
//! cargo run --package calculator
//! cargo run --package calculator -- m add 3 4
//! cargo run --package calculator -- --user admin admin reset
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use marshal::core::{BuildResult, ServiceLookup};
use marshal::prelude::*;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "calculator", about = "An interactive Marshal calculator")]
struct Cli {
    /// Configuration file; `marshal.toml` in the working directory otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Caller name. `admin` unlocks the admin commands.
    #[arg(short, long, default_value = "guest")]
    user: String,

    /// Run one command and exit instead of reading stdin.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

// ============================================================================
// Services
// ============================================================================

/// Named memory cells.
#[derive(Default)]
struct Memory(Mutex<BTreeMap<String, f64>>);

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    y: f64,
}

fn point(name: &str) -> ParameterSpec {
    ParameterSpec::constructible(
        name,
        vec![ParameterSpec::of::<f64>("x"), ParameterSpec::of::<f64>("y")],
        |args| {
            let coord = |i| args.value::<f64>(i).ok_or("missing coordinate");
            Ok(Point {
                x: coord(0)?,
                y: coord(1)?,
            })
        },
    )
}

// ============================================================================
// Output
// ============================================================================

struct Stdout;

#[async_trait]
impl ResponseSink for Stdout {
    async fn respond(&self, value: &Value) {
        match value.to_text() {
            Some(text) => println!("= {text}"),
            None => println!("= <{}>", value.type_key().short_name()),
        }
    }
}

/// Prints failures for the person at the keyboard.
struct PrintFailures;

#[async_trait]
impl ResultHandler for PrintFailures {
    fn priority(&self) -> i32 {
        -50
    }

    async fn handle(&self, _: &ExecutionContext, result: &ExecutionResult, _: &dyn ServiceLookup) -> Handled {
        if let Err(failure) = result {
            eprintln!("error: {failure}");
        }
        Handled::No
    }
}

// ============================================================================
// Commands
// ============================================================================

fn register(manager: &CommandManager) -> BuildResult<()> {
    let math = manager.add_group(GroupBuilder::new(["math", "m"]))?;
    math.add_command(
        CommandBuilder::new(["add", "+"])
            .params([ParameterSpec::of::<i64>("a"), ParameterSpec::of::<i64>("b")])
            .priority(1.0)
            .description("integer sum")
            .handler(|Arg(a): Arg<i64>, Arg(b): Arg<i64>| async move { a + b }),
    )?;
    math.add_command(
        CommandBuilder::new(["add", "+"])
            .params([ParameterSpec::of::<f64>("a"), ParameterSpec::of::<f64>("b")])
            .description("decimal sum")
            .handler(|Arg(a): Arg<f64>, Arg(b): Arg<f64>| async move { a + b }),
    )?;
    math.add_command(
        CommandBuilder::new(["sub", "-"])
            .params([ParameterSpec::of::<f64>("a"), ParameterSpec::of::<f64>("b")])
            .handler_sync(|Arg(a): Arg<f64>, Arg(b): Arg<f64>| a - b),
    )?;
    math.add_command(
        CommandBuilder::new(["mul", "*"])
            .params([ParameterSpec::of::<f64>("a"), ParameterSpec::of::<f64>("b")])
            .handler_sync(|Arg(a): Arg<f64>, Arg(b): Arg<f64>| a * b),
    )?;
    math.add_command(
        CommandBuilder::new(["div", "/"])
            .params([ParameterSpec::of::<f64>("a"), ParameterSpec::of::<f64>("b")])
            .handler_sync(|Arg(a): Arg<f64>, Arg(b): Arg<f64>| {
                if b == 0.0 {
                    return Err("division by zero");
                }
                Ok(a / b)
            }),
    )?;
    math.add_command(
        CommandBuilder::new(["round"])
            .params([ParameterSpec::of::<f64>("value"), ParameterSpec::of::<u32>("digits").optional()])
            .description("round to [digits] decimals")
            .handler_sync(|Arg(value): Arg<f64>, digits: Option<Arg<u32>>| {
                let factor = 10_f64.powi(digits.map_or(0, |Arg(d)| d.min(15) as i32));
                (value * factor).round() / factor
            }),
    )?;

    manager.add_command(
        CommandBuilder::new(["sum"])
            .param(ParameterSpec::list::<f64>("numbers"))
            .handler_sync(|Arg(numbers): Arg<Vec<f64>>| numbers.iter().sum::<f64>()),
    )?;
    manager.add_command(
        CommandBuilder::new(["avg", "mean"])
            .param(ParameterSpec::list::<f64>("numbers"))
            .handler_sync(|Arg(numbers): Arg<Vec<f64>>| numbers.iter().sum::<f64>() / numbers.len() as f64),
    )?;
    manager.add_command(
        CommandBuilder::new(["dist"])
            .params([point("from"), point("to")])
            .description("distance between two points")
            .handler_sync(|Arg(from): Arg<Point>, Arg(to): Arg<Point>| (to.x - from.x).hypot(to.y - from.y)),
    )?;
    manager.add_command(
        CommandBuilder::new(["echo"])
            .param(ParameterSpec::of::<String>("text").remainder())
            .handler_sync(|Arg(text): Arg<String>| text),
    )?;

    let mem = manager.add_group(GroupBuilder::new(["mem"]))?;
    mem.add_command(
        CommandBuilder::default_command()
            .description("list memory cells")
            .handler_sync(|Service(memory): Service<Memory>| {
                let cells = memory.0.lock();
                cells
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
    )?;
    mem.add_command(
        CommandBuilder::new(["set"])
            .params([ParameterSpec::of::<String>("name"), ParameterSpec::of::<f64>("value")])
            .handler_sync(
                |Service(memory): Service<Memory>, Arg(name): Arg<String>, Arg(value): Arg<f64>| {
                    memory.0.lock().insert(name, value);
                },
            ),
    )?;
    mem.add_command(
        CommandBuilder::new(["get"])
            .param(ParameterSpec::of::<String>("name"))
            .handler_sync(|Service(memory): Service<Memory>, Arg(name): Arg<String>| {
                memory
                    .0
                    .lock()
                    .get(&name)
                    .copied()
                    .ok_or_else(|| format!("no cell named '{name}'"))
            }),
    )?;

    let admin = manager.add_group(GroupBuilder::new(["admin"]).require(condition_fn("is-admin", |ctx| {
        match ctx.execution.caller() {
            Some("admin") => Ok(()),
            _ => Err(Unmet::new("admin only")),
        }
    })))?;
    admin.add_command(
        CommandBuilder::new(["reset"])
            .description("clear every memory cell")
            .handler_sync(|Service(memory): Service<Memory>| memory.0.lock().clear()),
    )?;

    let listing = manager
        .commands()
        .iter()
        .map(|entry| {
            let line = format!("{} {}", entry.display_path(), entry.command.usage());
            match entry.command.description() {
                Some(description) => format!("  {:<28} {description}", line.trim_end()),
                None => format!("  {}", line.trim_end()),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let help = format!("Commands:\n{listing}\n  help");
    manager.add_command(CommandBuilder::new(["help", "?"]).handler_sync(move || help.clone()))?;

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut builder = CommandHost::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile);
    }
    let host = builder.build()?;
    register(host.manager())?;
    host.manager().add_result_handler(PrintFailures);

    let services: Arc<dyn ServiceLookup> = Arc::new(ServiceMap::new().with(Arc::new(Memory::default())));
    let context = || {
        ExecutionContext::new(services.clone())
            .with_caller(cli.user.clone())
            .with_response(Arc::new(Stdout))
    };

    if !cli.command.is_empty() {
        let result = host.run_input(context(), Input::new(cli.command.clone())).await?;
        return Ok(if result.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    println!("Marshal calculator. Type `help` for commands, Ctrl+D to quit.");
    let stdin = BufReader::new(tokio::io::stdin()).lines();
    let lines = futures::stream::unfold(stdin, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                None
            }
        }
    });

    let stats = host.serve(lines, context).await;
    info!(lines = stats.lines, malformed = stats.malformed, "Bye");
    Ok(ExitCode::SUCCESS)
}
