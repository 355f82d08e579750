mod cli;
mod commands;
mod config;
mod engine;
mod kinds;
mod manifest;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use reconcile::CancelToken;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    /// Manifest path from the command line, overriding settings
    pub manifest: Option<PathBuf>,
    /// State path from the command line, overriding settings
    pub state: Option<PathBuf>,
    /// Cancelled on the first Ctrl-C
    pub cancel: CancelToken,
}

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

    let ctx = Context {
        quiet: cli.quiet,
        manifest: cli.manifest,
        state: cli.state,
        cancel: CancelToken::new(),
    };
    install_interrupt_handler(&ctx.cancel);

    match cli.command {
        Command::Plan(args) => commands::declarative::plan(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::declarative::apply(
            &ctx,
            args.target.as_deref(),
            args.dry_run,
            args.yes,
            args.jobs,
        ),
        Command::Destroy(args) => {
            commands::declarative::destroy(&ctx, args.target.as_deref(), args.yes)
        }
        Command::Import { address, identity } => {
            commands::tracked::import(&ctx, &address, &identity)
        }
        Command::Refresh(args) => commands::tracked::refresh(&ctx, args.target.as_deref()),
        Command::Show { address } => commands::tracked::show(&ctx, address.as_deref()),
        Command::Lookup(kind) => commands::lookup::run(&kind),
        Command::Kinds => {
            commands::kinds();
            Ok(())
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "gitform", &mut io::stdout());
            Ok(())
        }
    }
}

/// First Ctrl-C cancels the run so pending work is skipped and state is
/// still saved; a second one exits immediately.
fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("\nInterrupted - finishing in-flight requests, press Ctrl-C again to abort");
        cancel.cancel();
    });
    if let Err(e) = result {
        log::warn!("Could not install the Ctrl-C handler: {e}");
    }
}
