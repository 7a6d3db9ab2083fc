// csweave CLI entry point
use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;

use csweave_cli::commands::{compile, explain};
use csweave_cli::{logging, Cli, Commands};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Compile(args) => report(compile::run(&args, true)?),
        Commands::Check(args) => report(compile::run(&args, false)?),
        Commands::Explain { code } => {
            print!("{}", explain::explain(&code)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(outcome: compile::CompileOutcome) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", outcome.rendered.trim_end())?;
    stdout.flush()?;
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
