//! Site discovery and configuration.
//!
//! A site is any directory containing a `.webjot` configuration directory.
//! The configuration directory holds the layouts and an optional
//! `config.toml`:
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[build]`   | Header delimiter, front matter, template delims   |
//! | `[serve]`   | Watch-mode web server (port, interface, browser)  |
//!
//! # Example
//!
//! ```toml
//! [build]
//! header_delim = "---"
//! env_prefix = "SITE_"
//!
//! [serve]
//! port = 3000
//! ```

mod build;
pub mod defaults;
mod error;
mod serve;

pub use error::ConfigError;

use build::BuildConfig;
use serve::ServeConfig;

use crate::cli::Cli;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing `.webjot/config.toml`,
/// plus the resolved site paths and run flags.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Site root: parent of the configuration directory.
    #[serde(skip)]
    pub root: PathBuf,

    /// Configuration directory (`<root>/.webjot`).
    #[serde(skip)]
    pub conf_dir: PathBuf,

    /// Publish directory (`<root>/.pub` by default).
    #[serde(skip)]
    pub pub_dir: PathBuf,

    /// Print effective vars of each rendered document.
    #[serde(skip)]
    pub show_vars: bool,

    /// Running under the watcher.
    #[serde(skip)]
    pub watch_mode: bool,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Watch-mode web server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Locate the site containing `start` and load its configuration.
    ///
    /// A missing `config.toml` is not an error; defaults apply.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        let conf_dir = find_conf_dir(start)?;
        let conf_file = conf_dir.join(defaults::CONF_FILE);

        let mut config = if conf_file.is_file() {
            Self::from_path(&conf_file)?
        } else {
            Self::default()
        };

        config.root = conf_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| conf_dir.clone());
        config.conf_dir = conf_dir;
        config.update_paths();
        config.validate()?;
        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.build.header_delim, cli.vdelim.as_ref());
        Self::update_option(&mut self.serve.interface, cli.interface.as_ref());
        Self::update_option(&mut self.serve.port, cli.port.as_ref());
        if cli.no_open {
            self.serve.open_browser = false;
        }
        self.show_vars = cli.vshow;
        self.watch_mode = cli.watch;
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    fn update_paths(&mut self) {
        self.pub_dir = self.root.join(&self.build.publish_dir);
    }

    /// Validate values a config file can get wrong.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.ldelim.is_empty() || self.build.rdelim.is_empty() {
            return Err(ConfigError::Validation(
                "[build.ldelim] and [build.rdelim] must not be empty".into(),
            ));
        }
        if !is_inner_dir(Path::new(&self.build.publish_dir)) {
            return Err(ConfigError::Validation(
                "[build.publish_dir] must be a directory inside the site root".into(),
            ));
        }
        Ok(())
    }

    /// Whether `path` lies inside the publish directory.
    pub fn is_in_pub_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.pub_dir)
    }

    /// Whether `path` lies inside the configuration directory.
    pub fn is_in_conf_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.conf_dir)
    }
}

// ============================================================================
// Site Discovery
// ============================================================================

/// Search `start` and its ancestors for the configuration directory.
pub fn find_conf_dir(start: &Path) -> Result<PathBuf, ConfigError> {
    let start = normalize_path(start);
    let found = start
        .ancestors()
        .map(|dir| dir.join(defaults::CONF_DIR))
        .find(|candidate| candidate.is_dir());

    found.ok_or(ConfigError::NotFound {
        dir: defaults::CONF_DIR,
        start,
    })
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        // For non-existent paths, manually make them absolute
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Relative path naming a directory strictly below the site root and
/// outside the configuration directory.
fn is_inner_dir(dir: &Path) -> bool {
    let mut parts = dir.components().filter(|c| !matches!(c, Component::CurDir));
    match parts.next() {
        Some(Component::Normal(first)) => {
            first != defaults::CONF_DIR && parts.all(|c| matches!(c, Component::Normal(_)))
        }
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".webjot")).unwrap();
        dir
    }

    #[test]
    fn test_discover_from_root() {
        let dir = site();
        let config = SiteConfig::discover(dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.root, root);
        assert_eq!(config.conf_dir, root.join(".webjot"));
        assert_eq!(config.pub_dir, root.join(".pub"));
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let dir = site();
        let sub = dir.path().join("blog/2024");
        fs::create_dir_all(&sub).unwrap();

        let config = SiteConfig::discover(&sub).unwrap();
        assert_eq!(config.root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_discover_not_found() {
        let dir = TempDir::new().unwrap();
        let err = SiteConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_discover_reads_config_file() {
        let dir = site();
        fs::write(
            dir.path().join(".webjot/config.toml"),
            "[build]\npublish_dir = \"public\"\n[serve]\nport = 3000\n",
        )
        .unwrap();

        let config = SiteConfig::discover(dir.path()).unwrap();
        assert_eq!(config.pub_dir, dir.path().canonicalize().unwrap().join("public"));
        assert_eq!(config.serve.port, 3000);
    }

    #[test]
    fn test_discover_rejects_bad_config() {
        let dir = site();
        fs::write(dir.path().join(".webjot/config.toml"), "[base]\ntitle = 1\n").unwrap();
        assert!(matches!(
            SiteConfig::discover(dir.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_empty_delims() {
        let config = SiteConfig::from_str("[build]\nldelim = \"\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_publish_dir() {
        let check = |dir: &str| {
            let config = SiteConfig::from_str(&format!("[build]\npublish_dir = {dir:?}\n")).unwrap();
            config.validate().is_ok()
        };

        assert!(check("public"));
        assert!(check("out/site"));
        assert!(check("./dist"));
        assert!(!check(""));
        assert!(!check("."));
        assert!(!check("./"));
        assert!(!check("/var/www"));
        assert!(!check("a/../.."));
        assert!(!check("../elsewhere"));
        assert!(!check(".webjot"));
        assert!(!check(".webjot/out"));
    }

    #[test]
    fn test_update_with_cli() {
        let mut config = SiteConfig::default();
        let cli = Cli::parse_from(["webjot", "--vdelim", "", "--vshow", "-w", "-p", "9000"]);
        config.update_with_cli(&cli);

        assert_eq!(config.build.header_delim, "");
        assert!(config.show_vars);
        assert!(config.watch_mode);
        assert_eq!(config.serve.port, 9000);
        // not given on the command line
        assert_eq!(config.serve.interface, "127.0.0.1");
    }

    #[test]
    fn test_path_predicates() {
        let dir = site();
        let config = SiteConfig::discover(dir.path()).unwrap();
        assert!(config.is_in_pub_dir(&config.pub_dir.join("index.html")));
        assert!(config.is_in_conf_dir(&config.conf_dir.join("layout.html")));
        assert!(!config.is_in_conf_dir(&config.root.join("index.md")));
    }
}
