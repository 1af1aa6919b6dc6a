//! Document loading: header split, front matter, built-in vars.
//!
//! A templated source file looks like:
//!
//! ```text
//! title: Hello       ┐
//! layout: post.html  ├ header (front matter)
//! @@@@@@@            ┘ delimiter line
//! # {{ title }}      ─ body (template)
//! ```
//!
//! The delimiter must sit on a line of its own. Files without a delimiter
//! line, or loaded with an empty delimiter, are all body.

use crate::{
    config::{ConfigError, SiteConfig},
    error::BuildError,
    pipeline,
    template::DOC_KEY,
    vars::{FrontMatter, HeaderError, Vars, parse_header},
};
use chrono::{DateTime, Local};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Splits text at the first header delimiter line.
#[derive(Debug, Clone)]
pub struct HeaderSplitter {
    delim: Option<Regex>,
    mode: FrontMatter,
}

impl HeaderSplitter {
    /// Build a splitter; an empty `delim` disables header parsing.
    pub fn new(delim: &str, mode: FrontMatter) -> Result<Self, regex::Error> {
        let delim = match delim {
            "" => None,
            d => Some(Regex::new(&format!(
                r"(?:^|\r?\n){}(?:$|\r?\n)",
                regex::escape(d)
            ))?),
        };
        Ok(Self { delim, mode })
    }

    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigError> {
        Self::new(&config.build.header_delim, config.build.front_matter)
            .map_err(|e| ConfigError::Validation(format!("header delimiter: {e}")))
    }

    /// Split into `(header, body)`; `None` header when no delimiter is found.
    pub fn split<'a>(&self, text: &'a str) -> (Option<&'a str>, &'a str) {
        match self.delim.as_ref().and_then(|rx| rx.find(text)) {
            Some(m) => (Some(&text[..m.start()]), &text[m.end()..]),
            None => (None, text),
        }
    }

    /// Read `path` and parse its header.
    pub fn load(&self, path: &Path) -> Result<Source, BuildError> {
        let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| BuildError::io(path, e))?;

        let (header, body) = self.split(&text);
        let header = match header {
            Some(header) => parse_header(header, self.mode).map_err(|e| match e {
                HeaderError::Yaml(source) => BuildError::HeaderParse {
                    path: path.to_path_buf(),
                    source,
                },
                HeaderError::NotAMapping => BuildError::HeaderShape {
                    path: path.to_path_buf(),
                },
            })?,
            None => Default::default(),
        };

        Ok(Source {
            path: path.to_path_buf(),
            modified: DateTime::<Local>::from(modified),
            vars: header.vars,
            rejected: header.rejected,
            body: body.to_owned(),
        })
    }
}

/// A file split into front matter and body, before any site context.
#[derive(Debug, Clone)]
pub struct Source {
    pub path: PathBuf,
    pub modified: DateTime<Local>,
    pub vars: Vars,
    /// Front-matter keys dropped for not being lowercase identifiers.
    pub rejected: Vec<String>,
    pub body: String,
}

// ============================================================================
// Documents
// ============================================================================

/// A templated source file with its built-in vars filled in.
#[derive(Debug, Clone)]
pub struct Document {
    /// Template name: path relative to the site root, `/`-separated.
    pub key: String,
    /// Lowercased source extension.
    pub ext: String,
    /// Output path inside the publish directory.
    pub dest: PathBuf,
    pub src: Source,
}

impl Document {
    /// Load the document at `path` and inject the built-in vars.
    pub fn load(
        config: &SiteConfig,
        splitter: &HeaderSplitter,
        path: &Path,
    ) -> Result<Self, BuildError> {
        let rel = path
            .strip_prefix(&config.root)
            .map_err(|_| {
                BuildError::io(
                    path,
                    std::io::Error::other("document outside the site root"),
                )
            })?
            .to_path_buf();

        let mut src = splitter.load(path)?;
        let dest_rel = pipeline::dest_rel(&rel);
        let key = slash_path(&rel);

        if !src.vars.contains_key("title") {
            src.vars.set("title", title_from_path(path));
        }
        inject_auto_vars(&mut src.vars, config, path, &dest_rel, &key, &src.modified);

        Ok(Self {
            ext: pipeline::ext_of(path),
            dest: config.pub_dir.join(&dest_rel),
            key,
            src,
        })
    }

    pub fn vars(&self) -> &Vars {
        &self.src.vars
    }

    pub fn path(&self) -> &Path {
        &self.src.path
    }
}

/// Built-in, uppercase vars every document carries.
fn inject_auto_vars(
    vars: &mut Vars,
    config: &SiteConfig,
    path: &Path,
    dest_rel: &Path,
    key: &str,
    modified: &DateTime<Local>,
) {
    vars.set("URI_PATH", slash_path(dest_rel));
    vars.set("SRC", path.display().to_string());
    vars.set("SRCMOD", modified.to_rfc3339());
    vars.set("CFGDIR", config.conf_dir.display().to_string());
    vars.set("SRCDIR", config.root.display().to_string());
    vars.set("PUBDIR", config.pub_dir.display().to_string());
    vars.set(DOC_KEY, key);
    if config.watch_mode {
        vars.set("WATCHMODE", "enabled");
    }
}

/// Default title: file stem with its first letter capitalised.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Path with `/` separators on every platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
