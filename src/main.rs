//! webjot - a static site template renderer.

mod build;
mod cli;
mod config;
mod document;
mod error;
mod init;
mod layout;
mod logger;
mod pipeline;
mod serve;
mod template;
mod utils;
mod vars;
mod watch;

use anyhow::Result;
use build::build_all;
use clap::Parser;
use cli::Cli;
use config::{SiteConfig, defaults};
use init::new_site;
use parking_lot::RwLock;
use serve::serve_site;
use std::{process::ExitCode, sync::Arc, thread};
use watch::watch_for_changes_blocking;

fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log!("error"; "{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.init {
        let delim = cli.vdelim.clone().unwrap_or_else(defaults::build::header_delim);
        return new_site(&cli.source, &delim);
    }

    let mut config = SiteConfig::discover(&cli.source)?;
    config.update_with_cli(cli);
    let config: &'static SiteConfig = Box::leak(Box::new(config));

    let report = build_all(config, &mut |e| log!("error"; "{e}"))?;
    log!("build"; "{report}");

    if config.watch_mode {
        let lock = Arc::new(RwLock::new(()));
        let watch_lock = Arc::clone(&lock);
        thread::spawn(move || {
            if let Err(e) = watch_for_changes_blocking(config, watch_lock) {
                log!("watch"; "{e:#}");
            }
        });
        serve_site(config, lock)?;
    }

    Ok(())
}
