//! Site building orchestration.
//!
//! Coordinates document rendering and asset copying.
//!
//! # Architecture
//!
//! ```text
//! build_all()
//!     │
//!     ├── walk_site() ──► classify() each entry
//!     │       ├── Mkdir     ──► ensure dir in publish dir
//!     │       ├── Asset     ──► copy (skipped when unchanged)
//!     │       └── Document  ──► collected for the render pass
//!     │
//!     └── render_documents()
//!             ├── load + compile every document
//!             ├── resolve + compile each layout once
//!             ├── Catalog (immutable, effective vars of every document)
//!             └── render + post-process + write
//! ```
//!
//! Errors tied to one entry go to the caller's sink and never stop the pass.
//! Only a failure to walk the site itself aborts.

use crate::{
    config::SiteConfig,
    document::{Document, HeaderSplitter},
    error::{BuildError, ErrorSink},
    layout::{Layout, LayoutRef, effective_vars},
    log, pipeline,
    template::{Catalog, DocEntry, EngineBuilder},
    utils::fs::{IGNORED_FILES, copy_file, ensure_dir, write_output},
    vars::Vars,
};
use anyhow::Result;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};
use walkdir::WalkDir;

/// Keys hidden from `--vshow` output.
static PPRINT_EXCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("DIR$|WATCHMODE").expect("valid exclude regex"));

/// Summary of one build pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Documents written to the publish directory.
    pub rendered: usize,
    /// Assets copied (unchanged ones are not counted).
    pub copied: usize,
    /// Front-matter keys ignored because they are not valid names.
    pub warnings: usize,
    /// Errors handed to the sink.
    pub errors: usize,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rendered, {} copied, {} warnings, {} errors",
            self.rendered, self.copied, self.warnings, self.errors
        )
    }
}

/// What a path under the site root is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Hidden, ignored, or inside the publish directory.
    Skip,
    /// Directory mirrored into the publish directory.
    Mkdir,
    /// File inside the configuration directory.
    LayoutSource,
    /// Templated file.
    Document,
    /// Copied as-is.
    Asset,
}

/// Classify a path under the site root.
pub fn classify(config: &SiteConfig, path: &Path, is_dir: bool) -> EntryKind {
    if config.is_in_pub_dir(path) {
        return EntryKind::Skip;
    }
    if config.is_in_conf_dir(path) {
        return match is_dir {
            true => EntryKind::Skip,
            false => EntryKind::LayoutSource,
        };
    }

    let Ok(rel) = path.strip_prefix(&config.root) else {
        return EntryKind::Skip;
    };
    let hidden = rel
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
    let ignored = path
        .file_name()
        .is_some_and(|name| IGNORED_FILES.iter().any(|f| name == *f));
    if hidden || ignored {
        return EntryKind::Skip;
    }

    if is_dir {
        EntryKind::Mkdir
    } else if pipeline::is_template_ext(&pipeline::ext_of(path)) {
        EntryKind::Document
    } else {
        EntryKind::Asset
    }
}

/// Walk the site root in file-name order, skipping hidden entries.
fn walk_site(config: &SiteConfig) -> Result<Vec<(PathBuf, EntryKind)>, BuildError> {
    let walker = WalkDir::new(&config.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_name().to_string_lossy().starts_with('.')
                    || config.is_in_pub_dir(e.path()))
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| BuildError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.root.clone()),
            source,
        })?;
        let kind = classify(config, entry.path(), entry.file_type().is_dir());
        entries.push((entry.into_path(), kind));
    }
    Ok(entries)
}

// ============================================================================
// Entry Points
// ============================================================================

/// Build the whole site: mirror directories, copy assets, render documents.
pub fn build_all(config: &SiteConfig, sink: ErrorSink<'_>) -> Result<BuildReport> {
    let mut report = BuildReport::default();
    let mut errors = 0;
    let mut sink = |e: BuildError| {
        errors += 1;
        sink(e);
    };

    let splitter = HeaderSplitter::from_config(config)?;
    ensure_dir(&config.pub_dir)?;

    let mut documents = Vec::new();
    for (path, kind) in walk_site(config)? {
        match kind {
            EntryKind::Mkdir => {
                if let Err(e) = ensure_dir(&config.pub_dir.join(rel_of(config, &path))) {
                    sink(e);
                }
            }
            EntryKind::Asset => {
                if copy_asset(config, &path, &mut sink) {
                    report.copied += 1;
                }
            }
            EntryKind::Document => documents.push(path),
            EntryKind::Skip | EntryKind::LayoutSource => {}
        }
    }

    render_documents(config, &splitter, &documents, &mut report, &mut sink);
    drop(sink);
    report.errors = errors;
    Ok(report)
}

/// Rebuild after the given paths changed.
///
/// Changed assets are copied. Any changed document or layout triggers a
/// full document pass, since any document may list or render any other.
pub fn build_paths(config: &SiteConfig, paths: &[PathBuf], sink: ErrorSink<'_>) -> Result<BuildReport> {
    let mut report = BuildReport::default();
    let mut errors = 0;
    let mut sink = |e: BuildError| {
        errors += 1;
        sink(e);
    };

    let splitter = HeaderSplitter::from_config(config)?;
    let mut documents_changed = false;

    for path in paths {
        match classify(config, path, path.is_dir()) {
            EntryKind::Mkdir => {
                if let Err(e) = ensure_dir(&config.pub_dir.join(rel_of(config, path))) {
                    sink(e);
                }
            }
            EntryKind::Asset if path.is_file() => {
                if copy_asset(config, path, &mut sink) {
                    report.copied += 1;
                }
            }
            EntryKind::Document | EntryKind::LayoutSource => documents_changed = true,
            EntryKind::Asset | EntryKind::Skip => {}
        }
    }

    if documents_changed {
        let documents: Vec<_> = walk_site(config)?
            .into_iter()
            .filter(|(_, kind)| *kind == EntryKind::Document)
            .map(|(path, _)| path)
            .collect();
        render_documents(config, &splitter, &documents, &mut report, &mut sink);
    }

    drop(sink);
    report.errors = errors;
    Ok(report)
}

fn rel_of<'a>(config: &SiteConfig, path: &'a Path) -> &'a Path {
    path.strip_prefix(&config.root).unwrap_or(path)
}

fn copy_asset(config: &SiteConfig, path: &Path, sink: ErrorSink<'_>) -> bool {
    let rel = rel_of(config, path);
    match copy_file(path, &config.pub_dir.join(rel), config.build.copy_on_dirty) {
        Ok(copied) => {
            if copied {
                log!("copy"; "{}", rel.display());
            }
            copied
        }
        Err(e) => {
            sink(e);
            false
        }
    }
}

// ============================================================================
// Render Pass
// ============================================================================

/// A layout as seen by the documents that asked for it.
enum LayoutSlot {
    /// No layout applies.
    Absent,
    Ready(Layout),
    /// Explicitly named file does not exist.
    Missing(String),
    /// Failed to load or compile; already reported.
    Broken,
}

/// A compiled document waiting for the render step.
struct Pending {
    doc: Document,
    /// Layout template to render through, if any.
    layout: Option<String>,
    /// Layout failed; the document must not be written.
    blocked: bool,
    /// `skip` is set in the effective vars (globals, layout or document).
    skipped: bool,
}

/// Load, compile and render `paths`, counting written files and ignored
/// front-matter keys into `report`.
fn render_documents(
    config: &SiteConfig,
    splitter: &HeaderSplitter,
    paths: &[PathBuf],
    report: &mut BuildReport,
    sink: ErrorSink<'_>,
) {
    let globals = Vars::env_globals(&config.build.env_prefix);
    let default_delims = config.build.delims();
    let mut builder = EngineBuilder::new();
    let mut slots: FxHashMap<LayoutRef, LayoutSlot> = FxHashMap::default();
    let mut pending = Vec::new();
    let mut table = FxHashMap::default();
    let mut collection = Vec::new();

    for path in paths {
        log!("source"; "{}", rel_of(config, path).display());
        let doc = match Document::load(config, splitter, path) {
            Ok(doc) => doc,
            Err(e) => {
                sink(e);
                continue;
            }
        };

        report.warnings += warn_rejected(config, path, &doc.src.rejected);
        let scoped = Vars::merge(&[&globals, doc.vars()]);
        if config.show_vars {
            show_vars(&scoped, &doc.src.rejected);
        }

        let delims = doc.vars().delims(&default_delims);
        if let Err(source) = builder.compile(&doc.key, doc.src.body.clone(), &delims) {
            sink(BuildError::TemplateSyntax {
                path: path.clone(),
                source,
            });
            continue;
        }

        let layout_ref = LayoutRef::select(&scoped, &doc.ext, &config.build.default_layout);
        if !slots.contains_key(&layout_ref) {
            let slot = load_layout(
                config,
                splitter,
                &layout_ref,
                path,
                &mut builder,
                report,
                sink,
            );
            slots.insert(layout_ref.clone(), slot);
        }

        let (layout, vars, blocked) = match &slots[&layout_ref] {
            LayoutSlot::Absent => (None, effective_vars(&globals, None, doc.vars()), false),
            LayoutSlot::Ready(layout) => (
                Some(layout.key.clone()),
                effective_vars(&globals, Some(layout), doc.vars()),
                false,
            ),
            LayoutSlot::Missing(name) => {
                sink(BuildError::LayoutNotFound {
                    layout: name.clone(),
                    path: path.clone(),
                });
                (None, effective_vars(&globals, None, doc.vars()), true)
            }
            LayoutSlot::Broken => (None, effective_vars(&globals, None, doc.vars()), true),
        };

        let skipped = vars.is_truthy("skip");
        if pipeline::is_layoutable_ext(&doc.ext) {
            collection.push(vars.clone());
        }
        table.insert(
            doc.key.clone(),
            DocEntry {
                ext: doc.ext.clone(),
                src_path: path.clone(),
                vars,
            },
        );
        pending.push(Pending {
            doc,
            layout,
            blocked,
            skipped,
        });
    }

    let catalog = Catalog::new(builder.finish(), table, collection, &config.build.env_prefix);

    for Pending {
        doc,
        layout,
        blocked,
        skipped,
    } in pending
    {
        if blocked || skipped {
            continue;
        }
        match render_one(&catalog, &doc, layout.as_deref()) {
            Ok(text) => match write_output(&doc.dest, &text) {
                Ok(()) => report.rendered += 1,
                Err(e) => sink(e),
            },
            Err(e) => sink(e),
        }
    }
}

/// Resolve and compile a layout the first time a document asks for it.
fn load_layout(
    config: &SiteConfig,
    splitter: &HeaderSplitter,
    layout_ref: &LayoutRef,
    doc_path: &Path,
    builder: &mut EngineBuilder,
    report: &mut BuildReport,
    sink: ErrorSink<'_>,
) -> LayoutSlot {
    let layout = match Layout::resolve(config, splitter, layout_ref, doc_path) {
        Ok(Some(layout)) => layout,
        Ok(None) => return LayoutSlot::Absent,
        Err(BuildError::LayoutNotFound { layout, .. }) => return LayoutSlot::Missing(layout),
        Err(e) => {
            sink(e);
            return LayoutSlot::Broken;
        }
    };

    log!("layout"; "{}", layout.key);
    report.warnings += warn_rejected(config, &layout.src.path, &layout.src.rejected);
    if config.show_vars {
        show_vars(&layout.vars, &layout.src.rejected);
    }

    match builder.compile(&layout.key, layout.src.body.clone(), &layout.delims) {
        Ok(()) => LayoutSlot::Ready(layout),
        Err(source) => {
            sink(BuildError::TemplateSyntax {
                path: layout.src.path.clone(),
                source,
            });
            LayoutSlot::Broken
        }
    }
}

/// Render one document, through its layout if it has one.
fn render_one(
    catalog: &Arc<Catalog>,
    doc: &Document,
    layout: Option<&str>,
) -> Result<String, BuildError> {
    let exec_err = |source| BuildError::TemplateExec {
        path: doc.path().to_path_buf(),
        source,
    };

    match layout {
        Some(layout) => catalog.render_layout(layout, &doc.key).map_err(exec_err),
        None => {
            let body = catalog.render_body(&doc.key, None).map_err(exec_err)?;
            let base_dir = doc.path().parent();
            pipeline::post_process(&doc.ext, body, base_dir).map_err(|message| {
                BuildError::PostProcess {
                    path: doc.path().to_path_buf(),
                    message,
                }
            })
        }
    }
}

/// Log every ignored front-matter key of `path`; returns how many there were.
fn warn_rejected(config: &SiteConfig, path: &Path, rejected: &[String]) -> usize {
    for key in rejected {
        log!("warn"; "[{}] ignored front matter key {key:?}", rel_of(config, path).display());
    }
    rejected.len()
}

fn show_vars(vars: &Vars, rejected: &[String]) {
    vars.pretty_print(&mut io::stdout().lock(), rejected, Some(&*PPRINT_EXCLUDE))
        .ok();
}

// ============================================================================
// Tests
// ============================================================================
