//! Variable store.
//!
//! [`Vars`] is the scope a template sees at render time. Scopes are composed
//! by layered merge, later layers winning:
//!
//! ```text
//! environment globals  <  layout front matter  <  document front matter
//! ```
//!
//! Keys written by the builder itself (`URI_PATH`, `SRC`, `DOC_KEY`, ...) are
//! uppercase. Front matter only accepts lowercase identifier keys, so the
//! built-ins can never be shadowed by a page.

use crate::template::Delims;
use colored::Colorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    io::{self, Write},
    ops::{Deref, DerefMut},
    sync::LazyLock,
};

/// Per-scope left template delimiter override.
pub const LDELIM: &str = "ldelim";
/// Per-scope right template delimiter override.
pub const RDELIM: &str = "rdelim";

/// Shape every front-matter key must have.
static KEY_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid key regex"));

/// How the header region above the delimiter is parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontMatter {
    /// Structured YAML mapping.
    #[default]
    Yaml,
    /// Plain `key: value` lines, values kept as strings.
    Lines,
}

/// Ordered mapping of variable name to scalar or structured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, Value>);

impl Deref for Vars {
    type Target = BTreeMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Vars {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, Value)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a string value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_owned(), Value::String(value.into()));
    }

    /// Merge layers into a fresh map; later layers overwrite earlier ones.
    pub fn merge(layers: &[&Vars]) -> Vars {
        let mut ret = Vars::new();
        for layer in layers {
            for (k, v) in layer.iter() {
                ret.0.insert(k.clone(), v.clone());
            }
        }
        ret
    }

    /// String form of a value; missing keys and nulls are empty.
    pub fn get_str(&self, key: &str) -> String {
        self.get(key).map(value_to_string).unwrap_or_default()
    }

    /// Truthiness used for flags such as `skip`.
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => {
                let s = s.trim().to_ascii_lowercase();
                !matches!(s.as_str(), "" | "false" | "no" | "0")
            }
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Template delimiters for this scope, falling back to `default`.
    pub fn delims(&self, default: &Delims) -> Delims {
        let pick = |key: &str, fallback: &str| match self.get_str(key) {
            s if s.is_empty() => fallback.to_owned(),
            s => s,
        };
        Delims::new(pick(LDELIM, &default.left), pick(RDELIM, &default.right))
    }

    /// Remove the per-scope delimiter overrides.
    pub fn clear_delims(&mut self) {
        self.0.remove(LDELIM);
        self.0.remove(RDELIM);
    }

    /// Host environment variables starting with `prefix`, prefix stripped
    /// and lowercased. Delimiter keys are dropped since they are per-template.
    pub fn env_globals(prefix: &str) -> Vars {
        Self::from_env_pairs(
            std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
            prefix,
        )
    }

    fn from_env_pairs(pairs: impl Iterator<Item = (String, String)>, prefix: &str) -> Vars {
        let mut ret = Vars::new();
        for (key, value) in pairs {
            let Some(name) = key.strip_prefix(prefix) else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if is_valid_key(&name) {
                ret.set(&name, value);
            }
        }
        ret.clear_delims();
        ret
    }

    /// Export as `PREFIX_KEY=value` pairs for child processes.
    ///
    /// User keys come first and built-in (uppercase) keys last, so a
    /// built-in wins when both map to the same variable name.
    pub fn to_env(&self, prefix: &str) -> Vec<(String, String)> {
        let (builtin, user): (Vec<_>, Vec<_>) =
            self.iter().partition(|(k, _)| k.chars().any(char::is_uppercase));
        user.into_iter()
            .chain(builtin)
            .map(|(k, v)| (format!("{prefix}{}", k.to_ascii_uppercase()), value_to_string(v)))
            .collect()
    }

    /// Print vars as an aligned `key: value` table.
    ///
    /// Keys matching `exclude` are hidden; `rejected` front-matter keys are
    /// listed after the table.
    pub fn pretty_print(
        &self,
        w: &mut impl Write,
        rejected: &[String],
        exclude: Option<&Regex>,
    ) -> io::Result<()> {
        let shown: Vec<_> = self
            .iter()
            .filter(|(k, _)| exclude.is_none_or(|rx| !rx.is_match(k)))
            .collect();
        let width = shown.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

        for (k, v) in shown {
            let label = format!("{k:>width$}");
            writeln!(w, "  {}: {}", label.bright_green().bold(), value_to_string(v))?;
        }
        for k in rejected {
            writeln!(w, "  {} {k:?}", "ignored key".bright_red().bold())?;
        }
        Ok(())
    }
}

/// Result of parsing a header region.
#[derive(Debug, Default)]
pub struct Header {
    pub vars: Vars,
    /// Keys dropped because they are not lowercase identifiers.
    pub rejected: Vec<String>,
}

/// Why a header region could not be turned into vars.
#[derive(Debug)]
pub enum HeaderError {
    Yaml(serde_yaml::Error),
    NotAMapping,
}

/// Whether `key` is acceptable as a front-matter variable name.
pub fn is_valid_key(key: &str) -> bool {
    KEY_SHAPE.is_match(key)
}

/// Parse the header region of a document.
///
/// Comment lines (`#`) are ignored in both modes. Keys that fail the
/// identifier check are reported in [`Header::rejected`] instead of failing
/// the whole header.
pub fn parse_header(header: &str, mode: FrontMatter) -> Result<Header, HeaderError> {
    let pairs = match mode {
        FrontMatter::Yaml => parse_yaml_pairs(header)?,
        FrontMatter::Lines => parse_line_pairs(header),
    };

    let mut ret = Header::default();
    for (key, value) in pairs {
        if is_valid_key(&key) {
            ret.vars.insert(key, value);
        } else {
            ret.rejected.push(key);
        }
    }
    Ok(ret)
}

fn parse_yaml_pairs(header: &str) -> Result<Vec<(String, Value)>, HeaderError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(header).map_err(HeaderError::Yaml)?;
    match doc {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Mapping(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (yaml_key(&k), yaml_to_json(v)))
            .collect()),
        _ => Err(HeaderError::NotAMapping),
    }
}

fn parse_line_pairs(header: &str) -> Vec<(String, Value)> {
    header
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), Value::String(v.trim().to_owned())))
        .collect()
}

fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_owned())
            .unwrap_or_default(),
    }
}

/// Convert a YAML value to JSON, stringifying anything JSON cannot express.
pub fn yaml_to_json(value: serde_yaml::Value) -> Value {
    serde_json::to_value(&value).unwrap_or_else(|_| {
        Value::String(
            serde_yaml::to_string(&value)
                .map(|s| s.trim().to_owned())
                .unwrap_or_default(),
        )
    })
}

/// Render a value the way a template or shell would print it.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> Vars {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let globals = vars(&[("title", json!("global")), ("site", json!("jot"))]);
        let layout = vars(&[("title", json!("layout")), ("nav", json!(true))]);
        let doc = vars(&[("title", json!("doc"))]);

        let merged = Vars::merge(&[&globals, &layout, &doc]);
        assert_eq!(merged.get_str("title"), "doc");
        assert_eq!(merged.get_str("site"), "jot");
        assert!(merged.is_truthy("nav"));
        // inputs are untouched
        assert_eq!(layout.get_str("title"), "layout");
    }

    #[test]
    fn test_merge_without_layout_layer() {
        let globals = vars(&[("a", json!("1"))]);
        let doc = vars(&[("b", json!("2"))]);
        let merged = Vars::merge(&[&globals, &doc]);
        assert_eq!(merged, vars(&[("a", json!("1")), ("b", json!("2"))]));
    }

    #[test]
    fn test_parse_yaml_header() {
        let header = "# a comment\ntitle: Home\nskip: true\ntags: [a, b]\n";
        let parsed = parse_header(header, FrontMatter::Yaml).unwrap();
        assert_eq!(parsed.vars.get_str("title"), "Home");
        assert!(parsed.vars.is_truthy("skip"));
        assert_eq!(parsed.vars["tags"], json!(["a", "b"]));
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn test_parse_header_rejects_bad_keys() {
        let header = "title: ok\nTitle: upper\nbad-key: dash\n2x: digit\n";
        let parsed = parse_header(header, FrontMatter::Yaml).unwrap();
        assert_eq!(parsed.vars.len(), 1);
        assert_eq!(parsed.vars.get_str("title"), "ok");
        let mut rejected = parsed.rejected.clone();
        rejected.sort();
        assert_eq!(rejected, vec!["2x", "Title", "bad-key"]);
    }

    #[test]
    fn test_parse_header_malformed_yaml() {
        let result = parse_header("title: [unclosed\n", FrontMatter::Yaml);
        assert!(matches!(result, Err(HeaderError::Yaml(_))));
    }

    #[test]
    fn test_parse_header_scalar_is_not_mapping() {
        let result = parse_header("just some words", FrontMatter::Yaml);
        assert!(matches!(result, Err(HeaderError::NotAMapping)));
    }

    #[test]
    fn test_parse_header_empty_yaml() {
        let parsed = parse_header("", FrontMatter::Yaml).unwrap();
        assert!(parsed.vars.is_empty());
    }

    #[test]
    fn test_parse_line_header() {
        let header = "# comment\r\ntitle: A: B\r\n\r\nno colon here\r\nlayout:\r\n";
        let parsed = parse_header(header, FrontMatter::Lines).unwrap();
        assert_eq!(parsed.vars.get_str("title"), "A: B");
        assert!(parsed.vars.contains_key("layout"));
        assert_eq!(parsed.vars.get_str("layout"), "");
    }

    #[test]
    fn test_is_truthy() {
        let v = vars(&[
            ("t", json!(true)),
            ("f", json!(false)),
            ("yes", json!("yes")),
            ("no", json!("no")),
            ("zero", json!(0)),
            ("one", json!(1)),
            ("empty", json!("")),
        ]);
        assert!(v.is_truthy("t"));
        assert!(!v.is_truthy("f"));
        assert!(v.is_truthy("yes"));
        assert!(!v.is_truthy("no"));
        assert!(!v.is_truthy("zero"));
        assert!(v.is_truthy("one"));
        assert!(!v.is_truthy("empty"));
        assert!(!v.is_truthy("missing"));
    }

    #[test]
    fn test_delims_override_and_clear() {
        let default = Delims::new("{{", "}}");
        let mut v = vars(&[(LDELIM, json!("<<")), (RDELIM, json!(""))]);
        let d = v.delims(&default);
        assert_eq!(d.left, "<<");
        assert_eq!(d.right, "}}");

        v.clear_delims();
        assert!(!v.contains_key(LDELIM));
        assert_eq!(v.delims(&default), default);
    }

    #[test]
    fn test_env_pairs_prefix_stripped_and_lowered() {
        let pairs = vec![
            ("JOT_AUTHOR".to_owned(), "Ann".to_owned()),
            ("JOT_LDELIM".to_owned(), "<<".to_owned()),
            ("JOT_".to_owned(), "empty".to_owned()),
            ("HOME".to_owned(), "/home/ann".to_owned()),
        ];
        let globals = Vars::from_env_pairs(pairs.into_iter(), "JOT_");
        assert_eq!(globals, vars(&[("author", json!("Ann"))]));
    }

    #[test]
    fn test_to_env_builtins_last() {
        let v = vars(&[("title", json!("user")), ("TITLE", json!("builtin")), ("n", json!(3))]);
        let env = v.to_env("JOT_");
        assert_eq!(env.last(), Some(&("JOT_TITLE".to_owned(), "builtin".to_owned())));
        assert!(env.contains(&("JOT_N".to_owned(), "3".to_owned())));
    }

    #[test]
    fn test_pretty_print_excludes_and_aligns() {
        colored::control::set_override(false);
        let v = vars(&[("title", json!("Home")), ("PUBDIR", json!("/x")), ("a", json!(1))]);
        let rx = Regex::new("DIR$").unwrap();
        let mut out = Vec::new();
        v.pretty_print(&mut out, &["Bad".to_owned()], Some(&rx)).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("  title: Home"));
        assert!(out.contains("      a: 1"));
        assert!(!out.contains("PUBDIR"));
        assert!(out.contains("ignored key \"Bad\""));
    }
}
