//! Anchor slugification for generated heading ids.

use deunicode::deunicode;
use rustc_hash::{FxHashMap, FxHashSet};

/// Convert text to a lowercase ASCII anchor.
///
/// Non-ASCII text is transliterated, every run of other characters collapses
/// into a single `-`, and leading/trailing dashes are dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in deunicode(text).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Hands out unique anchors within one rendered document.
#[derive(Debug, Default)]
pub struct AnchorSet {
    taken: FxHashSet<String>,
    next_suffix: FxHashMap<String, usize>,
}

impl AnchorSet {
    /// Mark an id as used without generating it.
    pub fn reserve(&mut self, id: &str) {
        self.taken.insert(id.to_owned());
    }

    /// Unique anchor for `text`: `intro`, then `intro-1`, `intro-2`, ...
    pub fn anchor(&mut self, text: &str) -> String {
        let base = match slugify(text) {
            s if s.is_empty() => "section".to_owned(),
            s => s,
        };

        let suffix = self.next_suffix.entry(base.clone()).or_insert(0);
        loop {
            let candidate = match *suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            *suffix += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
