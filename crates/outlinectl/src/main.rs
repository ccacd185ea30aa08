mod bindings;
mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Plan(args) => run::plan(args),
        Command::Simulate(args) => run::simulate(args),
        Command::Render(args) => run::render(args),
    }
}
