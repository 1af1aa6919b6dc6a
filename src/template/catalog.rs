//! Per-pass lookup table of compiled documents.
//!
//! A [`Catalog`] is assembled once all documents and layouts of a build pass
//! are compiled, and is never mutated afterwards. Every render goes through
//! it: the catalog puts a handle to itself into the render context, so the
//! template functions always see the pass they belong to and the variables
//! of the document being rendered at call time.

use super::Engine;
use crate::{pipeline, vars::Vars};
use minijinja::{
    ErrorKind, State, Value,
    value::{Object, ObjectRepr},
};
use rustc_hash::FxHashMap;
use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Context key holding the catalog handle.
const CATALOG_KEY: &str = "__catalog";

/// Context key holding the vars the current render runs with.
const RENDER_VARS_KEY: &str = "__render_vars";

/// Context key naming the document being rendered.
pub const DOC_KEY: &str = "DOC_KEY";

/// Nesting limit for documents rendering other documents.
const MAX_DEPTH: usize = 32;

/// One compiled document as seen by the render pass.
#[derive(Debug, Clone)]
pub struct DocEntry {
    /// Lowercased source extension without the dot (`md`, `html`, `scss`).
    pub ext: String,
    /// Source file, used to resolve stylesheet imports.
    pub src_path: PathBuf,
    /// Effective vars: globals < layout < document, delimiters cleared.
    pub vars: Vars,
}

/// Immutable table of every document compiled in a build pass.
pub struct Catalog {
    engine: Engine,
    docs: FxHashMap<String, DocEntry>,
    collection: Vec<Vars>,
    env_prefix: String,
    depth: AtomicUsize,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("docs", &self.docs.len())
            .field("collection", &self.collection.len())
            .finish_non_exhaustive()
    }
}

/// Handle stored in the render context.
#[derive(Debug)]
struct CatalogHandle(Arc<Catalog>);

impl Object for CatalogHandle {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}

/// Snapshot of the vars a render was started with.
#[derive(Debug)]
struct RenderVars(Vars);

impl Object for RenderVars {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}

impl Catalog {
    /// Build the catalog.
    ///
    /// `collection` is the list exposed through `docsAll`; it is sorted here
    /// by title, then by destination URI, so listings are deterministic.
    pub fn new(
        engine: Engine,
        docs: FxHashMap<String, DocEntry>,
        mut collection: Vec<Vars>,
        env_prefix: impl Into<String>,
    ) -> Arc<Self> {
        collection.sort_by(|a, b| {
            a.get_str("title")
                .cmp(&b.get_str("title"))
                .then_with(|| a.get_str("URI_PATH").cmp(&b.get_str("URI_PATH")))
        });

        Arc::new(Self {
            engine,
            docs,
            collection,
            env_prefix: env_prefix.into(),
            depth: AtomicUsize::new(0),
        })
    }

    /// Catalog of the pass `state` is rendering in.
    pub fn from_state(state: &State) -> Option<Arc<Catalog>> {
        state
            .lookup(CATALOG_KEY)?
            .downcast_object::<CatalogHandle>()
            .map(|handle| Arc::clone(&handle.0))
    }

    /// Vars of the render `state` belongs to: a document's own effective
    /// vars, or the data passed to `renderNamed`.
    pub fn vars_from_state(state: &State) -> Option<Vars> {
        state
            .lookup(RENDER_VARS_KEY)?
            .downcast_object::<RenderVars>()
            .map(|vars| vars.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&DocEntry> {
        self.docs.get(key)
    }

    /// Document-collection view used by `docsAll`.
    pub fn collection(&self) -> &[Vars] {
        &self.collection
    }

    /// Prefix used when exporting vars to child processes.
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    /// Render a document by name, including its extension post-processing.
    ///
    /// Without `data` the document renders against its own effective vars.
    pub fn render_doc(
        self: &Arc<Self>,
        key: &str,
        data: Option<Vars>,
    ) -> Result<String, minijinja::Error> {
        let rendered = self.render_body(key, data)?;
        let entry = self.entry(key)?;
        pipeline::post_process(&entry.ext, rendered, entry.src_path.parent())
            .map_err(|msg| minijinja::Error::new(ErrorKind::InvalidOperation, msg))
    }

    /// Render a document's template only, without post-processing.
    pub fn render_body(
        self: &Arc<Self>,
        key: &str,
        data: Option<Vars>,
    ) -> Result<String, minijinja::Error> {
        let entry = self.entry(key)?;
        let _guard = DepthGuard::enter(&self.depth)?;
        match data {
            Some(vars) => self.engine.render(key, self.context(&vars)),
            None => self.engine.render(key, self.context(&entry.vars)),
        }
    }

    /// Render the layout template `layout` around the document `key`.
    ///
    /// The layout sees the document's effective vars and is expected to call
    /// `renderNamed(DOC_KEY)` somewhere in its body.
    pub fn render_layout(
        self: &Arc<Self>,
        layout: &str,
        key: &str,
    ) -> Result<String, minijinja::Error> {
        let entry = self.entry(key)?;
        let _guard = DepthGuard::enter(&self.depth)?;
        self.engine.render(layout, self.context(&entry.vars))
    }

    fn entry(&self, key: &str) -> Result<&DocEntry, minijinja::Error> {
        self.docs.get(key).ok_or_else(|| {
            minijinja::Error::new(
                ErrorKind::TemplateNotFound,
                format!("document `{key}` not found"),
            )
        })
    }

    /// Template context: the vars, a snapshot of them for template
    /// functions, and a handle back to this catalog.
    fn context(self: &Arc<Self>, vars: &Vars) -> Value {
        let hidden = [
            (
                RENDER_VARS_KEY.to_owned(),
                Value::from_object(RenderVars(vars.clone())),
            ),
            (
                CATALOG_KEY.to_owned(),
                Value::from_object(CatalogHandle(Arc::clone(self))),
            ),
        ];
        vars.iter()
            .map(|(k, v)| (k.clone(), Value::from_serialize(v)))
            .chain(hidden)
            .collect()
    }
}

/// Bounds the recursion of documents rendering documents.
struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Result<Self, minijinja::Error> {
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            return Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                "documents render each other too deeply (recursive renderNamed?)",
            ));
        }
        Ok(Self(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
