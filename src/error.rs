//! Build error taxonomy.
//!
//! Every per-document failure is wrapped with the offending path and handed
//! to an [`ErrorSink`]; a single broken page never aborts the pass.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading, compiling, rendering or writing one entry.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("[{}] {source}", display_path(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{}] malformed front matter: {source}", display_path(.path))]
    HeaderParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("[{}] front matter is not a key/value mapping", display_path(.path))]
    HeaderShape { path: PathBuf },

    #[error("[{}] template syntax: {source:#}", display_path(.path))]
    TemplateSyntax {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("[{}] template execution: {source:#}", display_path(.path))]
    TemplateExec {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("[{}] layout `{layout}` not found", display_path(.path))]
    LayoutNotFound { layout: String, path: PathBuf },

    #[error("CMD ERROR on `{command}`: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("[{}] {message}", display_path(.path))]
    PostProcess { path: PathBuf, message: String },

    #[error("[{}] {source}", display_path(.path))]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl BuildError {
    /// Wrap an I/O failure with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Deferred error callback used by the build and render passes.
pub type ErrorSink<'a> = &'a mut dyn FnMut(BuildError);

/// Shorten paths under the home directory to `~/...` for display.
fn display_path(path: &Path) -> String {
    let shown = path.display().to_string();
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => {
            let home = home.to_string_lossy();
            match shown.strip_prefix(home.as_ref()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{rest}"),
                _ => shown,
            }
        }
        _ => shown,
    }
}
