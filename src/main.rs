use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use jsh::app::{Session, Shell};
use jsh::config::Config;
use jsh::config_io::DirectoryContext;
use jsh::services::child_status::{self, SystemReaper};
use jsh::services::line_editor::StdinLineEditor;
use jsh::services::tty::Tty;
use jsh::services::{log_dirs, signal_handler, tracing_setup};
use nix::unistd;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

/// An interactive shell with job control
#[derive(Parser, Debug)]
#[command(name = "jsh")]
#[command(about = "An interactive Unix shell with job control", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for shell diagnostics (default: XDG state dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the paths used by jsh and exit
    #[arg(long)]
    show_paths: bool,

    /// Never create process groups or touch the terminal
    #[arg(long)]
    no_job_control: bool,
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    if args.show_paths {
        log_dirs::print_all_paths(args.config.as_deref())?;
        return Ok(());
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(log_dirs::main_log_path);
    if let Err(e) = tracing_setup::init_global(&log_file) {
        eprintln!("jsh: logging disabled: {}: {}", log_file.display(), e);
    }
    log_dirs::cleanup_stale_logs();
    signal_handler::install_panic_hook();
    tracing::info!("jsh starting");

    let dir_context = DirectoryContext::from_system()
        .inspect_err(|e| tracing::warn!("no config directory: {}", e))
        .ok();
    let config = Config::load(args.config.as_deref(), dir_context.as_ref())
        .context("failed to load configuration")?;

    if args.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let status = run_shell(&args, config)?;
    tracing::info!(status, "jsh exiting");
    std::process::exit(status);
}

fn run_shell(args: &Args, config: Config) -> AnyhowResult<i32> {
    let interactive = io::stdin().is_terminal();
    let tty = if config.job_control && !args.no_job_control {
        Tty::from_stdin().context("failed to open the terminal")?
    } else {
        None
    };
    let shell_pgid = match &tty {
        Some(tty) => signal_handler::take_terminal(tty)?,
        None => unistd::getpgrp(),
    };
    child_status::install_sigchld_handler().context("failed to install SIGCHLD handler")?;
    tracing::info!(interactive, job_control = tty.is_some(), %shell_pgid, "session starting");

    let session = Session::new(
        tty,
        shell_pgid,
        SystemReaper::default(),
        config.report_signals,
    );
    let editor = StdinLineEditor::new().context("failed to read stdin")?;
    let mut shell = Shell::new(session, editor, config);
    shell.set_interactive(interactive);
    Ok(shell.run())
}
