//! Template engine adapter.
//!
//! Wraps `minijinja` so the rest of the builder only deals with three ideas:
//!
//! - [`Delims`]: the variable delimiters a template was written with
//! - [`EngineBuilder`]: compile phase, one template per document or layout
//! - [`Engine`]: render phase, immutable, looked up by template name
//!
//! # Architecture
//!
//! ```text
//! EngineBuilder::compile(name, body, delims)
//!     │
//!     ├── {{ }}  ──► Environment #1  (index.md, blog/a.md, .webjot/layout.html)
//!     └── << >>  ──► Environment #2  (feed.xml)
//!
//! EngineBuilder::finish() ──► Engine ──► Catalog (per build pass)
//! ```
//!
//! `minijinja` fixes the syntax per environment, so every distinct delimiter
//! pair gets its own environment. All of them share the same function table
//! (see [`functions`]); cross-environment calls go through the [`Catalog`].

mod catalog;
mod functions;

pub use catalog::{Catalog, DOC_KEY, DocEntry};

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value, syntax::SyntaxConfig};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, btree_map::Entry};

/// Left/right variable delimiters of a template.
///
/// Block (`{% %}`) and comment (`{# #}`) delimiters are fixed; only the
/// variable delimiters can be overridden per scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Delims {
    pub left: String,
    pub right: String,
}

impl Delims {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Compile phase: collects templates into per-delimiter environments.
#[derive(Default)]
pub struct EngineBuilder {
    envs: BTreeMap<Delims, Environment<'static>>,
    names: FxHashMap<String, Delims>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` and register it under `name`.
    ///
    /// Registering the same name again replaces the earlier template.
    pub fn compile(
        &mut self,
        name: &str,
        source: String,
        delims: &Delims,
    ) -> Result<(), minijinja::Error> {
        let env = match self.envs.entry(delims.clone()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(new_environment(delims)?),
        };

        env.add_template_owned(name.to_owned(), source)?;
        self.names.insert(name.to_owned(), delims.clone());
        Ok(())
    }

    /// Freeze the compiled templates for the render pass.
    pub fn finish(self) -> Engine {
        Engine {
            envs: self.envs,
            names: self.names,
        }
    }
}

/// Render phase: immutable set of compiled templates.
#[derive(Debug)]
pub struct Engine {
    envs: BTreeMap<Delims, Environment<'static>>,
    names: FxHashMap<String, Delims>,
}

impl Engine {
    /// Execute the template `name` against `ctx`.
    pub fn render(&self, name: &str, ctx: Value) -> Result<String, minijinja::Error> {
        let env = self
            .names
            .get(name)
            .and_then(|delims| self.envs.get(delims))
            .ok_or_else(|| {
                minijinja::Error::new(
                    minijinja::ErrorKind::TemplateNotFound,
                    format!("template `{name}` not found"),
                )
            })?;
        env.get_template(name)?.render(ctx)
    }
}

/// Create an environment for one delimiter pair with the shared function table.
fn new_environment(delims: &Delims) -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();

    let syntax = SyntaxConfig::builder()
        .variable_delimiters(delims.left.clone(), delims.right.clone())
        .build()?;
    env.set_syntax(syntax);

    // Text templates: output is post-processed per extension, never escaped
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.set_keep_trailing_newline(true);

    functions::register(&mut env);
    Ok(env)
}
