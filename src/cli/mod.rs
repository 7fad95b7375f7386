use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::args::{Cli, Command};
use crate::cli::commands::{
    cleanup, dircontrol, exit_for_error, increment, marksnapshot, treestats, EX_USAGE,
};
use crate::error::Result as TardisResult;
use crate::util::paths::{config_path, install_root};

pub mod args;
pub mod commands;

/// Every external tool is reached through this fixed path; nothing from the
/// remote shell's environment survives.
const SAFE_PATH: &str = "/sbin:/bin:/usr/sbin:/usr/bin";
const SCRUBBED_VARS: [&str; 4] = ["IFS", "ENV", "BASH_ENV", "CDPATH"];

pub fn run() -> Result<()> {
    init_tracing();
    scrub_environment();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let rendered = err.to_string();
            let first = rendered.lines().next().unwrap_or("invalid arguments");
            eprintln!("ERROR: {}", first.trim_start_matches("error: "));
            std::process::exit(EX_USAGE);
        }
        Err(err) => {
            // --help / --version
            print!("{}", err);
            std::process::exit(0);
        }
    };

    let outcome = match &cli.command {
        Command::Dircontrol {
            config,
            dir_id,
            action,
        } => dircontrol::run(config, dir_id, action),
        Command::Increment {
            config,
            dir_id,
            bytes,
            inodes,
        } => increment::run(config, dir_id, bytes, inodes),
        Command::Marksnapshot {
            config,
            dir_id,
            timestamp,
        } => marksnapshot::run(config, dir_id, timestamp),
        Command::Cleanup { config, bytes } => cleanup::run(config, bytes),
        Command::Treestats { config, dir_id } => treestats::run(config, dir_id),
    };

    if let Err(err) = outcome {
        exit_for_error(&err);
    }
    Ok(())
}

/// Resolve `<install root>/config/<name>`; the name and the file's
/// permission mode are both validated before anything is read.
pub fn preflight_config(name: &str) -> TardisResult<PathBuf> {
    let root = install_root()?;
    config_path(&root, name)
}

fn scrub_environment() {
    env::set_var("PATH", SAFE_PATH);
    for var in SCRUBBED_VARS {
        env::remove_var(var);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
