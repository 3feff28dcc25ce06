use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use bookledger_core::{Identity, Ledger};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod driver;
mod script;

use script::Script;

#[derive(Parser)]
#[command(name = "bookledger", version, about = "Book inventory ledger driver")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a ledger and run the add/list/borrow/check/return/report flow.
    Interact(InteractArgs),
    /// Deploy a ledger and replay a JSON call script against it.
    Run(RunArgs),
    /// Print the fixed-width key for a book name.
    Normalize { name: String },
}

#[derive(Args)]
struct InteractArgs {
    #[arg(long)]
    book_name: String,
    #[arg(long)]
    book_copies: u64,
    /// Ledger owner; a random address when omitted.
    #[arg(long)]
    owner: Option<Identity>,
    /// Identity that borrows and returns; defaults to the owner.
    #[arg(long)]
    holder: Option<Identity>,
}

#[derive(Args)]
struct RunArgs {
    script: PathBuf,
    /// Overrides the owner named in the script.
    #[arg(long)]
    owner: Option<Identity>,
    /// Stop at the first failed call and exit non-zero.
    #[arg(long)]
    fail_fast: bool,
    /// Print each call's outcome and the final ledger snapshot as JSON.
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn interact_cmd(args: InteractArgs) -> Result<()> {
    let mut ledger = driver::bootstrap(args.owner);
    driver::run_book_interactions(&mut ledger, &args.book_name, args.book_copies, args.holder)
}

fn run_cmd(args: RunArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&raw)
        .with_context(|| format!("parsing script {}", args.script.display()))?;

    let mut ledger = driver::bootstrap(args.owner.or(script.owner));
    let outcomes = script::run(&mut ledger, &script.calls, args.fail_fast);
    if args.json {
        let report = serde_json::json!({
            "steps": script::steps(&script.calls, &outcomes),
            "snapshot": ledger.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (idx, (call, outcome)) in script.calls.iter().zip(&outcomes).enumerate() {
            println!("{:>3}. {call} -> {outcome}", idx + 1);
        }
    }

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    tracing::info!(
        calls = outcomes.len(),
        failed,
        height = ledger.height(),
        "script finished"
    );
    if args.fail_fast && failed > 0 {
        bail!("script stopped at call {}", outcomes.len());
    }
    Ok(())
}

fn normalize_cmd(name: &str) -> Result<()> {
    let key = Ledger::normalize(name)?;
    println!("{key}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Interact(args) => interact_cmd(args),
        Command::Run(args) => run_cmd(args),
        Command::Normalize { name } => normalize_cmd(&name),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn interact_flags_parse() {
        let cli = Cli::try_parse_from([
            "bookledger",
            "interact",
            "--book-name",
            "Mastering Ethereum",
            "--book-copies",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::Interact(args) => {
                assert_eq!(args.book_name, "Mastering Ethereum");
                assert_eq!(args.book_copies, 2);
                assert!(args.owner.is_none());
            }
            _ => panic!("expected interact"),
        }
    }
}
