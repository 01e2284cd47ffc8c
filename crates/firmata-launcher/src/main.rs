//! Firmata Launcher - command-line front end for owlcms-firmata installations.
//!
//! Thin layer over `firmata-core`: parses arguments, sets up logging, runs one
//! command and renders its outcome. `launch` stays in the foreground and
//! supervises the server until it exits or Ctrl-C is pressed.

mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Action, Args, LogFormat};
use firmata_core::config::ProcessConfig;
use firmata_core::{resolve_install_root, AppState, Command, ErrorCategory, FirmataError, Outcome};
use std::io::{BufRead, Write};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(args: &Args) {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FirmataError>().map(FirmataError::category) {
        Some(ErrorCategory::Validation) => 2,
        Some(ErrorCategory::Filesystem) => 3,
        Some(ErrorCategory::Network) => 4,
        Some(ErrorCategory::Process) => 5,
        Some(ErrorCategory::Internal) | None => 1,
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", output::render_json(outcome)?);
    } else {
        println!("{}", output::render(outcome));
    }
    Ok(())
}

/// Wait for the launched server to exit, stopping it on Ctrl-C.
async fn supervise(state: &mut AppState, json: bool) -> Result<()> {
    let mut ticker = tokio::time::interval(ProcessConfig::POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Interrupted, stopping owlcms-firmata");
                let outcome = state.execute(Command::Stop).await?;
                return print_outcome(&outcome, json);
            }
            _ = ticker.tick() => {
                if let Some(exit) = state.poll()? {
                    match exit.code {
                        Some(0) => info!("owlcms-firmata {} exited", exit.version),
                        Some(code) => warn!("owlcms-firmata {} exited with code {}", exit.version, code),
                        None => warn!("owlcms-firmata {} was terminated by a signal", exit.version),
                    }
                    return Ok(());
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let install_root = resolve_install_root(args.install_dir.clone())?;
    debug!("Installation root: {}", install_root.display());
    std::fs::create_dir_all(&install_root)
        .with_context(|| format!("cannot create {}", install_root.display()))?;

    let mut state = AppState::new(&install_root)?;

    if let Action::Remove { version, yes: false } = &args.action {
        if !confirm(&format!("Do you want to remove owlcms-firmata version {}?", version))? {
            println!("Cancelled");
            return Ok(());
        }
    }

    let outcome = state.execute(args.action.to_command()).await?;
    print_outcome(&outcome, args.json)?;

    match &outcome {
        Outcome::Files { path, .. } => {
            if let Err(e) = open::that(path) {
                warn!("Could not open {} in the file manager: {}", path.display(), e);
            }
        }
        Outcome::Launched { .. } => supervise(&mut state, args.json).await?,
        _ => {}
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
