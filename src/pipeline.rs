//! Content pipeline: extension rules and post-render transforms.
//!
//! | Source ext       | Templated | Layout | Post-process | Output ext |
//! |------------------|-----------|--------|--------------|------------|
//! | `.htm` `.html`   | yes       | yes    | -            | same       |
//! | `.xml`           | yes       | yes    | -            | same       |
//! | `.md` `.mkd`     | yes       | yes    | markdown     | `.html`    |
//! | `.css`           | yes       | no     | -            | same       |
//! | `.scss`          | yes       | no     | scss         | `.css`     |
//! | anything else    | no        | no     | -            | same       |

use crate::utils::markdown;
use std::path::{Path, PathBuf};

/// Lowercased extension of `path`, without the dot.
pub fn ext_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Whether files with this extension are rendered through the engine.
pub fn is_template_ext(ext: &str) -> bool {
    matches!(ext, "htm" | "html" | "xml" | "md" | "mkd" | "css" | "scss")
}

/// Whether files with this extension are wrapped in a layout.
pub fn is_layoutable_ext(ext: &str) -> bool {
    matches!(ext, "htm" | "html" | "xml" | "md" | "mkd")
}

/// Output extension for a source extension.
fn dest_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "md" | "mkd" => Some("html"),
        "scss" => Some("css"),
        _ => None,
    }
}

/// Destination path (relative to the publish dir) for a source path
/// relative to the site root.
pub fn dest_rel(rel: &Path) -> PathBuf {
    match dest_ext(&ext_of(rel)) {
        Some(ext) => rel.with_extension(ext),
        None => rel.to_path_buf(),
    }
}

/// Apply the extension's post-render transform.
///
/// `base_dir` is the directory stylesheet imports are resolved against.
pub fn post_process(ext: &str, text: String, base_dir: Option<&Path>) -> Result<String, String> {
    match ext {
        "md" | "mkd" => Ok(markdown::to_html(&text)),
        "scss" => compile_scss(text, base_dir),
        _ => Ok(text),
    }
}

fn compile_scss(text: String, base_dir: Option<&Path>) -> Result<String, String> {
    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    if let Some(dir) = base_dir {
        options = options.load_path(dir);
    }
    grass::from_string(text, &options).map_err(|e| format!("scss: {e}"))
}
