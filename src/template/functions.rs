//! Function table available to every template.
//!
//! | Function                     | Result                                   |
//! |------------------------------|------------------------------------------|
//! | `doCmd(cmd, args..)`         | merged command output, never fails       |
//! | `renderNamed(name, data?)`   | another document, post-processed         |
//! | `md2html(text)`              | markdown rendered to HTML                |
//! | `docsAll()`                  | vars of every layoutable document        |
//! | `docsSort(list, asc, keys..)`| list sorted by the first string key      |
//! | `docsGroup(list, key, sep)`  | map of group name to documents           |
//! | `parseYAML` / `toYAML`       | YAML text <-> value                      |
//! | `parseJSON` / `toJSON`       | JSON text <-> value                      |
//! | `toSlice(..)` / `toMap(..)`  | literal list / map from arguments        |
//! | `parseTime(text)`            | normalized RFC 3339 timestamp            |

use super::catalog::Catalog;
use crate::{
    utils::exec,
    vars::{Vars, yaml_to_json},
};
use chrono::{DateTime, NaiveDate};
use minijinja::{Environment, Error, ErrorKind, State, Value, value::Rest};
use std::{collections::BTreeMap, sync::Arc};

/// Register the whole function table on `env`.
pub fn register(env: &mut Environment<'static>) {
    env.add_function("doCmd", do_cmd);
    env.add_function("renderNamed", render_named);
    env.add_function("md2html", md2html);
    env.add_function("docsAll", docs_all);
    env.add_function("docsSort", docs_sort);
    env.add_function("docsGroup", docs_group);
    env.add_function("parseYAML", parse_yaml);
    env.add_function("toYAML", to_yaml);
    env.add_function("parseJSON", parse_json);
    env.add_function("toJSON", to_json);
    env.add_function("toSlice", to_slice);
    env.add_function("toMap", to_map);
    env.add_function("parseTime", parse_time);
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn catalog(state: &State) -> Result<Arc<Catalog>, Error> {
    Catalog::from_state(state).ok_or_else(|| invalid("no document catalog in this render"))
}

// ============================================================================
// Documents
// ============================================================================

/// Run a command with the vars of the running render exported to its env.
fn do_cmd(state: &State, cmd: String, args: Rest<String>) -> String {
    let env = Catalog::from_state(state)
        .zip(Catalog::vars_from_state(state))
        .map(|(cat, vars)| vars.to_env(cat.env_prefix()))
        .unwrap_or_default();

    exec::merged_output(&cmd, &args, &env)
}

fn render_named(state: &State, name: String, data: Option<Value>) -> Result<Value, Error> {
    let cat = catalog(state)?;
    let data = match data {
        Some(v) if !(v.is_undefined() || v.is_none()) => Some(value_to_vars(&v)?),
        _ => None,
    };
    cat.render_doc(&name, data).map(Value::from_safe_string)
}

fn value_to_vars(value: &Value) -> Result<Vars, Error> {
    let json = serde_json::to_value(value).map_err(|e| invalid(e.to_string()))?;
    match json {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(invalid("renderNamed: data must be a map")),
    }
}

fn md2html(text: String) -> Value {
    Value::from_safe_string(crate::utils::markdown::to_html(&text))
}

fn docs_all(state: &State) -> Result<Value, Error> {
    Ok(Value::from_serialize(catalog(state)?.collection()))
}

/// First string-valued key of `doc` among `keys`; empty if none.
fn sort_key(doc: &Value, keys: &[String]) -> String {
    keys.iter()
        .filter_map(|k| doc.get_attr(k).ok())
        .find_map(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn docs_sort(list: Vec<Value>, asc: bool, keys: Rest<String>) -> Vec<Value> {
    if keys.is_empty() {
        return list;
    }
    let mut keyed: Vec<_> = list.into_iter().map(|d| (sort_key(&d, &keys), d)).collect();
    keyed.sort_by(|(a, _), (b, _)| match asc {
        true => a.cmp(b),
        false => b.cmp(a),
    });
    keyed.into_iter().map(|(_, d)| d).collect()
}

/// Group documents by the values of `key`.
///
/// String fields are split on `sep` (an empty `sep` keeps the whole string as
/// one group); list fields contribute one group per string item. Documents
/// without the key are left out.
fn docs_group(list: Vec<Value>, key: String, sep: String) -> Result<Value, Error> {
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for doc in list {
        let field = doc.get_attr(&key)?;
        let names: Vec<String> = if let Some(s) = field.as_str() {
            if sep.is_empty() {
                vec![s.trim().to_owned()]
            } else {
                s.split(sep.as_str()).map(|g| g.trim().to_owned()).collect()
            }
        } else if field.kind() == minijinja::value::ValueKind::Seq {
            field
                .try_iter()?
                .filter_map(|v| v.as_str().map(|s| s.trim().to_owned()))
                .collect()
        } else {
            continue;
        };

        for name in names.into_iter().filter(|n| !n.is_empty()) {
            groups.entry(name).or_default().push(doc.clone());
        }
    }
    Ok(Value::from_serialize(&groups))
}

// ============================================================================
// Data formats
// ============================================================================

fn parse_yaml(text: String) -> Result<Value, Error> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| invalid(format!("parseYAML: {e}")))?;
    Ok(Value::from_serialize(yaml_to_json(doc)))
}

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value).map_err(|e| invalid(format!("toYAML: {e}")))
}

fn parse_json(text: String) -> Result<Value, Error> {
    let doc: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| invalid(format!("parseJSON: {e}")))?;
    Ok(Value::from_serialize(doc))
}

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid(format!("toJSON: {e}")))
}

fn to_slice(values: Rest<Value>) -> Value {
    Value::from(values.0)
}

/// Build a map from alternating key/value arguments; a trailing key is ignored.
fn to_map(values: Rest<Value>) -> Value {
    values
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].clone()))
        .collect()
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC).
fn parse_time(text: String) -> Result<String, Error> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.to_rfc3339());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc().to_rfc3339())
        .ok_or_else(|| invalid(format!("parseTime: cannot parse `{text}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DOC_KEY, Delims, DocEntry, EngineBuilder};
    use rustc_hash::FxHashMap;
    use serde_json::json;
    use std::path::PathBuf;

    fn order_of(list: &[Value], key: &str) -> Vec<String> {
        list.iter().map(|d| sort_key(d, &[key.to_owned()])).collect()
    }

    fn doc(title: &str, extra: serde_json::Value) -> Value {
        let mut map = json!({ "title": title });
        if let (Some(m), serde_json::Value::Object(e)) = (map.as_object_mut(), extra) {
            m.extend(e);
        }
        Value::from_serialize(map)
    }

    /// Compile `(key, body, vars)` documents and return a catalog over them.
    fn catalog(docs: &[(&str, &str, serde_json::Value)]) -> Arc<Catalog> {
        let mut builder = EngineBuilder::new();
        let mut table = FxHashMap::default();
        for (key, body, vars) in docs {
            builder
                .compile(key, (*body).to_owned(), &Delims::new("{{", "}}"))
                .unwrap();
            let mut vars: Vars = serde_json::from_value(vars.clone()).unwrap();
            vars.set(DOC_KEY, *key);
            table.insert(
                (*key).to_owned(),
                DocEntry {
                    ext: key.rsplit('.').next().unwrap_or_default().to_owned(),
                    src_path: PathBuf::from(key),
                    vars,
                },
            );
        }
        let collection = table.values().map(|e| e.vars.clone()).collect();
        Catalog::new(builder.finish(), table, collection, "JOT_")
    }

    #[test]
    fn test_docs_sort_first_string_key() {
        let list = vec![
            doc("b", json!({ "date": "2024-02-01" })),
            doc("a", json!({})),
            doc("c", json!({ "date": "2024-01-01" })),
        ];
        let keys = Rest(vec!["date".to_owned(), "title".to_owned()]);
        let sorted = docs_sort(list, true, keys);
        assert_eq!(order_of(&sorted, "title"), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_docs_sort_descending_and_no_keys() {
        let list = vec![doc("a", json!({})), doc("b", json!({}))];
        let sorted = docs_sort(list.clone(), false, Rest(vec!["title".into()]));
        assert_eq!(order_of(&sorted, "title"), vec!["b", "a"]);

        let same = docs_sort(list, false, Rest(vec![]));
        assert_eq!(order_of(&same, "title"), vec!["a", "b"]);
    }

    #[test]
    fn test_docs_group_string_and_list_fields() {
        let list = vec![
            doc("a", json!({ "tags": "rust, web" })),
            doc("b", json!({ "tags": ["web", "go"] })),
            doc("c", json!({})),
        ];
        let groups = docs_group(list, "tags".into(), ",".into()).unwrap();
        let web = groups.get_attr("web").unwrap();
        assert_eq!(web.len(), Some(2));
        assert_eq!(groups.get_attr("rust").unwrap().len(), Some(1));
        assert_eq!(groups.get_attr("go").unwrap().len(), Some(1));
    }

    #[test]
    fn test_docs_group_empty_sep_single_group() {
        let list = vec![doc("a", json!({ "section": "Guides" }))];
        let groups = docs_group(list, "section".into(), String::new()).unwrap();
        assert_eq!(groups.get_attr("Guides").unwrap().len(), Some(1));
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("2024-03-05".into()).unwrap(), "2024-03-05T00:00:00+00:00");
        assert_eq!(
            parse_time("2024-03-05T10:20:30+02:00".into()).unwrap(),
            "2024-03-05T10:20:30+02:00"
        );
        assert!(parse_time("yesterday".into()).is_err());
    }

    #[test]
    fn test_to_map_pairs() {
        let map = to_map(Rest(vec![
            Value::from("a"),
            Value::from(1),
            Value::from("b"),
            Value::from(2),
            Value::from("dangling"),
        ]));
        assert_eq!(map.get_attr("a").unwrap(), Value::from(1));
        assert_eq!(map.get_attr("b").unwrap(), Value::from(2));
        assert!(map.get_attr("dangling").unwrap().is_undefined());
    }

    #[test]
    fn test_data_formats_in_templates() {
        let cat = catalog(&[(
            "a.html",
            "{% set d = parseYAML('{n: 3, l: [x, y]}') %}{{ d.n }}|{{ d.l[1] }}|{{ toJSON(parseJSON('[1,2]')) }}|{{ toSlice(1, 2)|length }}",
            json!({}),
        )]);
        assert_eq!(cat.render_doc("a.html", None).unwrap(), "3|y|[1,2]|2");
    }

    #[test]
    fn test_render_named_and_docs_all() {
        let cat = catalog(&[
            (
                "index.html",
                "{% for d in docsAll() %}[{{ d.title }}]{% endfor %}{{ renderNamed('part.html', toMap('who', 'you')) }}",
                json!({ "title": "Home" }),
            ),
            ("part.html", "hi {{ who }}", json!({ "title": "Part" })),
        ]);
        assert_eq!(cat.render_doc("index.html", None).unwrap(), "[Home][Part]hi you");
    }

    #[test]
    fn test_render_named_without_data_uses_target_vars() {
        let cat = catalog(&[
            ("a.html", "{{ renderNamed('b.md') }}", json!({ "title": "A" })),
            ("b.md", "# {{ title }}", json!({ "title": "Bee" })),
        ]);
        let out = cat.render_doc("a.html", None).unwrap();
        assert_eq!(out, "<h1 id=\"bee\">Bee</h1>\n");
    }

    #[test]
    fn test_render_named_unknown_is_error() {
        let cat = catalog(&[("a.html", "{{ renderNamed('nope.html') }}", json!({}))]);
        let err = cat.render_doc("a.html", None).unwrap_err();
        assert!(format!("{err:#}").contains("nope.html"));
    }

    #[test]
    fn test_do_cmd_missing_binary_inline() {
        let cat = catalog(&[(
            "a.html",
            "x{{ doCmd('webjot-no-such-binary', 'arg') }}y",
            json!({}),
        )]);
        let out = cat.render_doc("a.html", None).unwrap();
        assert!(out.starts_with("xCMD ERROR on `webjot-no-such-binary arg`:"));
        assert!(out.ends_with('y'));
    }

    #[cfg(unix)]
    #[test]
    fn test_do_cmd_exports_doc_vars() {
        let cat = catalog(&[(
            "a.html",
            "{{ doCmd('sh', '-c', 'printf %s \"$JOT_TITLE/$JOT_DOC_KEY\"') }}",
            json!({ "title": "Env" }),
        )]);
        assert_eq!(cat.render_doc("a.html", None).unwrap(), "Env/a.html");
    }

    #[cfg(unix)]
    #[test]
    fn test_do_cmd_sees_render_named_data() {
        let cat = catalog(&[
            (
                "index.html",
                "{{ renderNamed('part.html') }}{{ renderNamed('part.html', toMap('who', 'you', 'title', 'Given')) }}",
                json!({ "title": "Home" }),
            ),
            (
                "part.html",
                "[{{ who }}|{{ doCmd('sh', '-c', 'printf %s \"$JOT_TITLE\"') }}]",
                json!({ "title": "Part" }),
            ),
        ]);
        assert_eq!(cat.render_doc("index.html", None).unwrap(), "[|Part][you|Given]");
    }

    #[test]
    fn test_md2html_function() {
        let cat = catalog(&[("a.html", "{{ md2html('*hi*') }}", json!({}))]);
        assert_eq!(cat.render_doc("a.html", None).unwrap(), "<p><em>hi</em></p>\n");
    }
}
