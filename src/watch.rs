//! File system watcher for live rebuilds.
//!
//! Watches the whole site root and rebuilds when sources change.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  config dir ─▶ full    │  │
//! │                                  │  otherwise  ─▶ paths   │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each rebuild holds the write half of the output lock, so the dev server
//! never answers from a half-written publish directory.

use crate::{
    build::{BuildReport, EntryKind, build_all, build_paths, classify},
    config::SiteConfig,
    error::BuildError,
    log,
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}

/// Whether a change at `path` can affect the output.
fn is_watched(path: &Path, config: &SiteConfig) -> bool {
    !is_temp_file(path) && classify(config, path, path.is_dir()) != EntryKind::Skip
}

fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events into one rebuild.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.pending.extend(paths);
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

/// What the event loop should do with one notify event.
#[derive(Debug, PartialEq, Eq)]
enum EventAction {
    Rebuild,
    /// Renames are reported; the write that usually follows rebuilds.
    LogRename,
    Ignore,
}

fn classify_event(event: &Event) -> EventAction {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) => EventAction::LogRename,
        EventKind::Modify(_) | EventKind::Create(_) => EventAction::Rebuild,
        _ => EventAction::Ignore,
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Rebuild after `paths` changed.
///
/// A change inside the configuration directory may touch any layout, so the
/// whole site is rebuilt; anything else goes through [`build_paths`].
fn handle_changes(paths: &[PathBuf], config: &SiteConfig, lock: &RwLock<()>) -> Result<BuildReport> {
    let _guard = lock.write();
    let mut sink = |e: BuildError| log!("error"; "{e}");

    if paths.iter().any(|p| config.is_in_conf_dir(p)) {
        log!("watch"; "configuration changed, rebuilding site...");
        return build_all(config, &mut sink);
    }

    let names: Vec<_> = paths.iter().map(|p| rel_path(p, &config.root)).collect();
    log!("watch"; "{} changed", names.join(", "));
    build_paths(config, paths, &mut sink)
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(config: &SiteConfig, lock: Arc<RwLock<()>>) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(&config.root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", config.root.display()))?;
    log!("watch"; "watching {}", config.root.display());

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) => match classify_event(&event) {
                EventAction::Rebuild => {
                    let paths = event.paths.into_iter().filter(|p| is_watched(p, config));
                    debouncer.add(paths);
                }
                EventAction::LogRename => log_rename(&event, config),
                EventAction::Ignore => {}
            },
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                match handle_changes(&debouncer.take(), config, &lock) {
                    Ok(report) => log!("watch"; "{report}"),
                    Err(e) => log!("error"; "rebuild failed: {e:#}"),
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    Ok(())
}

fn log_rename(event: &Event, config: &SiteConfig) {
    let watched: Vec<_> = event
        .paths
        .iter()
        .filter(|p| !config.is_in_pub_dir(p))
        .map(|p| rel_path(p, &config.root))
        .collect();
    if watched.is_empty() {
        return;
    }
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            log!("watch"; "renamed {}", watched.join(" -> "));
        }
        _ => log!("watch"; "renamed {}", watched.join(", ")),
    }
}
