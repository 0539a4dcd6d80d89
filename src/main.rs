mod cli;
mod commands;
mod config;
mod context;
mod paths;
mod progress;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use context::{GlobalOptions, RunContext};
use remote::SystemExecutor;
use std::io;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "rigger", &mut io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let roles = config.role_map().context("Could not load roles")?;
    let options = GlobalOptions {
        quiet: cli.quiet,
        yes: cli.yes,
        jobs: cli.jobs,
        host: cli.host.clone(),
    };
    let ctx = RunContext::new(config, roles, options, Arc::new(SystemExecutor::new()))?;

    let result = match cli.command {
        Command::Detect(args) => commands::detect::run(&ctx, &cli.roles, &args),
        Command::Pkg(cmd) => commands::pkg::run(&ctx, &cli.roles, cmd),
        Command::Service(cmd) => commands::service::run(&ctx, cmd),
        Command::Roles(cmd) => commands::roles::run(&ctx, &cli.roles, cmd),
        Command::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        ui::error(&format!("{e:#}"));
    }
    result
}
