//! Sonata CLI - a build tool for modular Java projects

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use sonata::util::GlobalContext;

mod cli;
mod commands;

use cli::{Action, Cli};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("sonata=debug")
    } else {
        EnvFilter::new("sonata=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if cli.actions.is_empty() {
        eprintln!("Nothing to do. Run `sonata help` for usage, or `sonata build` to build.");
        return Ok(());
    }

    let mut ctx = match &cli.directory {
        Some(directory) => GlobalContext::with_root(directory)?,
        None => GlobalContext::new()?,
    };
    ctx.set_verbose(cli.verbose);

    // Execute actions in order
    for action in &cli.actions {
        match action {
            Action::Build => commands::build::execute(&ctx, &cli.build, !cli.no_color)?,
            Action::Clean => commands::clean::execute(&ctx, cli.all)?,
            Action::Help => Cli::command().print_help()?,
            Action::Version => println!("sonata {}", env!("CARGO_PKG_VERSION")),
        }
    }
    Ok(())
}
