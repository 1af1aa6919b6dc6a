//! Site initialization module.
//!
//! Creates a new site from the embedded starter files.

use crate::{config::defaults::CONF_DIR, log};
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Stand-in for the header delimiter in the starter documents.
const DELIM_PLACEHOLDER: &str = "@DELIM@";

/// Starter files, relative to the new site root.
const SCAFFOLD: &[(&str, &str)] = &[
    ("layout.html", include_str!("embed/init/layout.html")),
    ("index.md", include_str!("embed/init/index.md")),
    ("style.scss", include_str!("embed/init/style.scss")),
];

/// Create a new site in `root`.
///
/// Never overwrites: if any starter file already exists nothing is written.
pub fn new_site(root: &Path, header_delim: &str) -> Result<()> {
    let files: Vec<_> = SCAFFOLD
        .iter()
        .map(|(name, text)| (target_path(root, name), with_delimiter(text, header_delim)))
        .collect();

    if let Some((existing, _)) = files.iter().find(|(path, _)| path.exists()) {
        bail!(
            "`{}` already exists, refusing to overwrite",
            existing.display()
        );
    }

    for (path, content) in &files {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        log!("init"; "{}", path.strip_prefix(root).unwrap_or(path).display());
    }

    Ok(())
}

/// Layouts go to the configuration directory, everything else to the root.
fn target_path(root: &Path, name: &str) -> std::path::PathBuf {
    match name {
        "layout.html" => root.join(CONF_DIR).join(name),
        _ => root.join(name),
    }
}

/// Fill in the header delimiter; an empty one drops the header entirely.
fn with_delimiter(text: &str, delim: &str) -> String {
    match text.split_once(&format!("{DELIM_PLACEHOLDER}\n")) {
        Some((_, body)) if delim.is_empty() => body.to_owned(),
        Some((header, body)) => format!("{header}{delim}\n{body}"),
        None => text.to_owned(),
    }
}
