//! Command-line interface definitions.
//!
//! Defines all CLI arguments using clap.

use clap::Parser;
use std::path::PathBuf;

/// Static site template renderer.
///
/// Templates under the site root are rendered into the `.pub` directory next
/// to the `.webjot` configuration directory.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Front matter / body delimiter line (empty: no front matter)
    #[arg(long, value_name = "STR")]
    pub vdelim: Option<String>,

    /// Print the effective vars of every rendered document
    #[arg(long)]
    pub vshow: bool,

    /// Rebuild on change and serve the publish dir
    #[arg(short, long)]
    pub watch: bool,

    /// Port of the watch-mode web server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface of the watch-mode web server
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Do not open a browser in watch mode
    #[arg(long)]
    pub no_open: bool,

    /// Create a new site inside SOURCE
    #[arg(long)]
    pub init: bool,

    /// Site source directory (or any directory below it)
    #[arg(value_name = "SOURCE", default_value = ".")]
    pub source: PathBuf,
}
