//! Layout selection and loading.
//!
//! Layoutable documents are grouped by the layout they resolve to. Each
//! layout is loaded and compiled once per pass, then rendered once per
//! document of its group with that document's effective vars:
//!
//! ```text
//! effective vars = env globals < layout front matter < document front matter
//! ```
//!
//! Layout files live in the configuration directory. Their template names
//! are their paths relative to the site root (`.webjot/layout.html`), so they
//! can never collide with a document key.

use crate::{
    config::SiteConfig,
    document::{HeaderSplitter, Source, slash_path},
    error::BuildError,
    pipeline,
    template::Delims,
    vars::Vars,
};
use std::path::{Path, PathBuf};

/// Which layout a document asked for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayoutRef {
    /// Not layoutable, or `layout` set to an empty value.
    None,
    /// No `layout` key: the configured default, if the file exists.
    Default(String),
    /// `layout: name`: must exist.
    Explicit(String),
}

impl LayoutRef {
    /// Resolve the layout for a document from its (globals-merged) vars.
    pub fn select(vars: &Vars, ext: &str, default_layout: &str) -> Self {
        if !pipeline::is_layoutable_ext(ext) {
            return Self::None;
        }
        match vars.get("layout") {
            None => Self::Default(default_layout.to_owned()),
            Some(_) => match vars.get_str("layout") {
                name if name.is_empty() => Self::None,
                name => Self::Explicit(name),
            },
        }
    }

    /// Layout file name relative to the configuration directory.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Default(name) | Self::Explicit(name) => Some(name),
        }
    }
}

/// A layout loaded from the configuration directory.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Template name, relative to the site root.
    pub key: String,
    /// Delimiters the layout body is written with.
    pub delims: Delims,
    /// Front matter, delimiter overrides removed.
    pub vars: Vars,
    pub src: Source,
}

impl Layout {
    /// Load `layout` for a document.
    ///
    /// A missing default layout yields `Ok(None)`; a missing explicit layout
    /// is [`BuildError::LayoutNotFound`] reported against `doc_path`.
    pub fn resolve(
        config: &SiteConfig,
        splitter: &HeaderSplitter,
        layout: &LayoutRef,
        doc_path: &Path,
    ) -> Result<Option<Self>, BuildError> {
        let Some(name) = layout.name() else {
            return Ok(None);
        };

        let path = layout_path(config, name);
        if !path.is_file() {
            return match layout {
                LayoutRef::Explicit(name) => Err(BuildError::LayoutNotFound {
                    layout: name.clone(),
                    path: doc_path.to_path_buf(),
                }),
                _ => Ok(None),
            };
        }
        Self::load(config, splitter, &path).map(Some)
    }

    fn load(config: &SiteConfig, splitter: &HeaderSplitter, path: &Path) -> Result<Self, BuildError> {
        let src = splitter.load(path)?;
        let delims = src.vars.delims(&config.build.delims());

        let mut vars = src.vars.clone();
        vars.clear_delims();

        let key = path
            .strip_prefix(&config.root)
            .map(slash_path)
            .unwrap_or_else(|_| path.display().to_string());

        Ok(Self {
            key,
            delims,
            vars,
            src,
        })
    }
}

/// Absolute path of a layout file.
pub fn layout_path(config: &SiteConfig, name: &str) -> PathBuf {
    config.conf_dir.join(name)
}

/// Effective vars of a document: globals, then layout, then the document.
///
/// Delimiter overrides are per-template and never part of the result.
pub fn effective_vars(globals: &Vars, layout: Option<&Layout>, doc: &Vars) -> Vars {
    let mut vars = match layout {
        Some(layout) => Vars::merge(&[globals, &layout.vars, doc]),
        None => Vars::merge(&[globals, doc]),
    };
    vars.clear_delims();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::FrontMatter;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> Vars {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn site() -> (TempDir, SiteConfig, HeaderSplitter) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".webjot")).unwrap();
        let config = SiteConfig::discover(dir.path()).unwrap();
        let splitter = HeaderSplitter::new("@@@@@@@", FrontMatter::Yaml).unwrap();
        (dir, config, splitter)
    }

    #[test]
    fn test_select() {
        let none = Vars::new();
        assert_eq!(
            LayoutRef::select(&none, "md", "layout.html"),
            LayoutRef::Default("layout.html".into())
        );
        assert_eq!(LayoutRef::select(&none, "css", "layout.html"), LayoutRef::None);
        assert_eq!(LayoutRef::select(&none, "scss", "layout.html"), LayoutRef::None);

        let empty = vars(&[("layout", json!(""))]);
        assert_eq!(LayoutRef::select(&empty, "html", "layout.html"), LayoutRef::None);

        let named = vars(&[("layout", json!("post.html"))]);
        assert_eq!(
            LayoutRef::select(&named, "xml", "layout.html"),
            LayoutRef::Explicit("post.html".into())
        );
    }

    #[test]
    fn test_resolve_missing_default_is_silent() {
        let (_dir, config, splitter) = site();
        let layout = LayoutRef::Default("layout.html".into());
        let doc = config.root.join("index.md");
        assert!(Layout::resolve(&config, &splitter, &layout, &doc).unwrap().is_none());
    }

    #[test]
    fn test_resolve_missing_explicit_is_error() {
        let (_dir, config, splitter) = site();
        let layout = LayoutRef::Explicit("wide.html".into());
        let doc = config.root.join("index.md");
        let err = Layout::resolve(&config, &splitter, &layout, &doc).unwrap_err();
        assert!(matches!(
            err,
            BuildError::LayoutNotFound { ref layout, ref path } if layout == "wide.html" && *path == doc
        ));
    }

    #[test]
    fn test_resolve_loads_layout_delims_and_vars() {
        let (_dir, config, splitter) = site();
        fs::write(
            config.conf_dir.join("layout.html"),
            "ldelim: '<<'\nrdelim: '>>'\nsite: Jot\n@@@@@@@\n<< renderNamed(DOC_KEY) >>",
        )
        .unwrap();

        let layout = LayoutRef::Default("layout.html".into());
        let loaded = Layout::resolve(&config, &splitter, &layout, &config.root.join("a.md"))
            .unwrap()
            .unwrap();

        assert_eq!(loaded.key, ".webjot/layout.html");
        assert_eq!(loaded.delims, Delims::new("<<", ">>"));
        assert_eq!(loaded.vars, vars(&[("site", json!("Jot"))]));
        assert_eq!(loaded.src.body, "<< renderNamed(DOC_KEY) >>");
    }

    #[test]
    fn test_effective_vars_precedence() {
        let globals = vars(&[("author", json!("env")), ("site", json!("env"))]);
        let doc = vars(&[("author", json!("doc")), ("ldelim", json!("[["))]);
        let layout = Layout {
            key: ".webjot/layout.html".into(),
            delims: Delims::new("{{", "}}"),
            vars: vars(&[("site", json!("layout")), ("nav", json!(true))]),
            src: Source {
                path: PathBuf::new(),
                modified: chrono::Local::now(),
                vars: Vars::new(),
                rejected: Vec::new(),
                body: String::new(),
            },
        };

        let eff = effective_vars(&globals, Some(&layout), &doc);
        assert_eq!(eff.get_str("author"), "doc");
        assert_eq!(eff.get_str("site"), "layout");
        assert!(eff.is_truthy("nav"));
        assert!(!eff.contains_key("ldelim"));

        let eff = effective_vars(&globals, None, &doc);
        assert_eq!(eff.get_str("site"), "env");
    }
}
