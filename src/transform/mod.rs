//! Tree Transformer Primitives
//!
//! Path-addressed operations over a `serde_json::Value` document. A path is a
//! dot-separated list of object keys. A segment written as `name[]` fans out
//! over every element of the array stored under `name`, so
//! `webhooks[].rules[].apiGroups` addresses every `apiGroups` list of every
//! rule of every webhook.
//!
//! The reserved [`ROOT`] path addresses the whole document. It is how a JSON
//! patch (an array of operations) is mapped over.
//!
//! Absent and `null` values are no-ops everywhere. A present value of an
//! incompatible type is a malformed-input error.

pub mod pointer;

use crate::error::{Error, Result};
use serde_json::{Map, Value};

pub use pointer::JsonPointer;

/// Path addressing the whole document
pub const ROOT: &str = "";

// =============================================================================
// Control Signal
// =============================================================================

/// Outcome of a per-element closure passed to [`map_array`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the element (possibly modified)
    Keep,
    /// Delete the element from its array
    Skip,
}

// =============================================================================
// Path Segments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Field(&'a str),
    Array(&'a str),
}

fn segments(path: &str) -> Vec<Segment<'_>> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_suffix("[]") {
            Some(name) => Segment::Array(name),
            None => Segment::Field(s),
        })
        .collect()
}

fn walk(
    cur: &mut Value,
    segs: &[Segment<'_>],
    path: &str,
    f: &mut dyn FnMut(&mut Value) -> Result<()>,
) -> Result<()> {
    let Some((seg, rest)) = segs.split_first() else {
        return if cur.is_null() { Ok(()) } else { f(cur) };
    };

    let obj = match cur {
        Value::Object(obj) => obj,
        Value::Null => return Ok(()),
        _ => return Err(Error::unexpected(path, "object")),
    };

    match seg {
        Segment::Field(name) => match obj.get_mut(*name) {
            Some(next) => walk(next, rest, path, f),
            None => Ok(()),
        },
        Segment::Array(name) => match obj.get_mut(*name) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Array(items)) => {
                for item in items {
                    walk(item, rest, path, f)?;
                }
                Ok(())
            }
            Some(_) => Err(Error::unexpected(path, "array")),
        },
    }
}

// =============================================================================
// Read Access
// =============================================================================

/// Get the value at a path. Numeric segments index into arrays.
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(doc, |cur, seg| match cur {
            Value::Object(obj) => obj.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Get the string at a path, or `""` when absent or not a string
pub fn get_str<'a>(doc: &'a Value, path: &str) -> &'a str {
    get(doc, path).and_then(Value::as_str).unwrap_or("")
}

/// Get the array of strings at a path. Absent and `null` yield `None`.
pub fn get_strings(doc: &Value, path: &str) -> Result<Option<Vec<String>>> {
    match get(doc, path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::unexpected(path, "array of strings"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(_) => Err(Error::unexpected(path, "array of strings")),
    }
}

/// Append `path` to a parent path. The parent may be [`ROOT`].
pub fn join(parent: &str, path: &str) -> String {
    if parent.is_empty() {
        path.to_string()
    } else {
        format!("{parent}.{path}")
    }
}

// =============================================================================
// Write Access
// =============================================================================

/// Set the value at a path, creating intermediate objects as needed
pub fn set(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let keys: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = keys.split_last() else {
        *doc = value;
        return Ok(());
    };

    let mut cur = doc;
    for key in parents {
        if cur.is_null() {
            *cur = Value::Object(Map::new());
        }
        cur = match cur {
            Value::Object(obj) => obj.entry(*key).or_insert(Value::Null),
            _ => return Err(Error::unexpected(path, "object")),
        };
    }

    if cur.is_null() {
        *cur = Value::Object(Map::new());
    }
    match cur {
        Value::Object(obj) => {
            obj.insert((*last).to_string(), value);
            Ok(())
        }
        _ => Err(Error::unexpected(path, "object")),
    }
}

/// Apply `f` to every non-null value addressed by `path`
pub fn transform_value(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&mut Value) -> Result<()>,
) -> Result<()> {
    walk(doc, &segments(path), path, &mut f)
}

/// Apply `f` to every object addressed by `path`
pub fn transform_object(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&mut Value) -> Result<()>,
) -> Result<()> {
    transform_value(doc, path, |value| {
        if !value.is_object() {
            return Err(Error::unexpected(path, "object"));
        }
        f(value)
    })
}

/// Replace every string addressed by `path` with `f(string)`
pub fn transform_string(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&str) -> String,
) -> Result<()> {
    transform_value(doc, path, |value| match value {
        Value::String(s) => {
            let new = f(s);
            if new != *s {
                *s = new;
            }
            Ok(())
        }
        _ => Err(Error::unexpected(path, "string")),
    })
}

/// Replace every element of the string arrays addressed by `path`
pub fn transform_array_of_strings(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&str) -> String,
) -> Result<()> {
    transform_value(doc, path, |value| {
        let Value::Array(items) = value else {
            return Err(Error::unexpected(path, "array of strings"));
        };
        for item in items {
            let Value::String(s) = item else {
                return Err(Error::unexpected(path, "array of strings"));
            };
            let new = f(s);
            if new != *s {
                *s = new;
            }
        }
        Ok(())
    })
}

/// Replace every string map (labels, annotations, selectors) addressed by
/// `path` with `f(map)`
pub fn transform_map(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&Map<String, Value>) -> Map<String, Value>,
) -> Result<()> {
    transform_value(doc, path, |value| match value {
        Value::Object(map) => {
            let new = f(map);
            if new != *map {
                *map = new;
            }
            Ok(())
        }
        _ => Err(Error::unexpected(path, "object")),
    })
}

/// Map `f` over the elements of every array addressed by `path`, deleting
/// elements for which `f` returns [`Verdict::Skip`]
///
/// The first error aborts the walk and is returned; the document should be
/// discarded by the caller in that case.
pub fn map_array(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(&mut Value) -> Result<Verdict>,
) -> Result<()> {
    transform_value(doc, path, |value| {
        let Value::Array(items) = value else {
            return Err(Error::unexpected(path, "array"));
        };

        let mut failure = None;
        items.retain_mut(|item| {
            if failure.is_some() {
                return true;
            }
            match f(item) {
                Ok(verdict) => verdict == Verdict::Keep,
                Err(err) => {
                    failure = Some(err);
                    true
                }
            }
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

/// Replace each element of every array addressed by `path` with the elements
/// `f` returns for it: none deletes it, several split it
pub fn flat_map_array(
    doc: &mut Value,
    path: &str,
    mut f: impl FnMut(Value) -> Result<Vec<Value>>,
) -> Result<()> {
    transform_value(doc, path, |value| {
        let Value::Array(items) = value else {
            return Err(Error::unexpected(path, "array"));
        };

        let mut mapped = Vec::with_capacity(items.len());
        for item in std::mem::take(items) {
            mapped.extend(f(item)?);
        }
        *items = mapped;
        Ok(())
    })
}

/// Apply `f` to every item of a list document, or to the document itself when
/// it has no `items` array
///
/// A skipped item is deleted from the list. A skipped single document is
/// reported to the caller.
pub fn rewrite_resource_or_list(
    doc: &mut Value,
    mut f: impl FnMut(&mut Value) -> Result<Verdict>,
) -> Result<Verdict> {
    if get(doc, "items").is_some_and(Value::is_array) {
        map_array(doc, "items", f)?;
        return Ok(Verdict::Keep);
    }
    f(doc)
}

// =============================================================================
// Patch Dialects
// =============================================================================

/// Dialect of a PATCH body, chosen by its first non-whitespace byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// `{`: merge patch or strategic merge patch, a partial object
    Merge,
    /// `[`: JSON patch, an ordered list of operations
    Json,
    /// Anything else, passed through untouched
    Unknown,
}

impl PatchKind {
    /// Peek at the first non-whitespace byte of `body`
    pub fn detect(body: &[u8]) -> Self {
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => PatchKind::Merge,
            Some(b'[') => PatchKind::Json,
            _ => PatchKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_get_and_get_str() {
        let doc = json!({"metadata": {"name": "a", "finalizers": ["x", "y"]}});
        assert_eq!(get_str(&doc, "metadata.name"), "a");
        assert_eq!(get_str(&doc, "metadata.finalizers.1"), "y");
        assert_eq!(get_str(&doc, "metadata.missing"), "");
        assert_eq!(get(&doc, ROOT), Some(&doc));
    }

    #[test]
    fn test_get_strings() {
        let doc = json!({"rule": {"apiGroups": ["a", "b"], "verbs": null, "bad": [1]}});
        assert_eq!(get_strings(&doc, "rule.apiGroups").unwrap(), Some(vec!["a".into(), "b".into()]));
        assert_eq!(get_strings(&doc, "rule.verbs").unwrap(), None);
        assert_eq!(get_strings(&doc, "rule.missing").unwrap(), None);
        assert!(get_strings(&doc, "rule.bad").is_err());
        assert_eq!(join(ROOT, "metadata"), "metadata");
        assert_eq!(join("spec.template", "metadata"), "spec.template.metadata");
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({"kind": "Pod"});
        set(&mut doc, "metadata.labels.app", json!("web")).unwrap();
        assert_eq!(doc, json!({"kind": "Pod", "metadata": {"labels": {"app": "web"}}}));

        let err = set(&mut doc, "kind.name", json!("x")).unwrap_err();
        assert_matches!(err, Error::UnexpectedType { .. });
    }

    #[test]
    fn test_transform_string_absent_and_null_are_noops() {
        let mut doc = json!({"a": null});
        transform_string(&mut doc, "a", |_| "changed".to_string()).unwrap();
        transform_string(&mut doc, "b.c", |_| "changed".to_string()).unwrap();
        assert_eq!(doc, json!({"a": null}));
    }

    #[test]
    fn test_transform_string_rejects_wrong_type() {
        let mut doc = json!({"apiVersion": 42});
        let err = transform_string(&mut doc, "apiVersion", str::to_uppercase).unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_array_fan_out() {
        let mut doc = json!({
            "webhooks": [
                {"rules": [{"apiGroups": ["a"]}, {"apiGroups": ["b", "c"]}]},
                {"rules": null},
                {}
            ]
        });
        transform_array_of_strings(&mut doc, "webhooks[].rules[].apiGroups", str::to_uppercase)
            .unwrap();
        assert_eq!(
            doc["webhooks"][0]["rules"],
            json!([{"apiGroups": ["A"]}, {"apiGroups": ["B", "C"]}])
        );
    }

    #[test]
    fn test_map_array_skip_deletes_elements() {
        let mut doc = json!({"items": [{"n": 1}, {"n": 2}, {"n": 3}]});
        map_array(&mut doc, "items", |item| {
            Ok(if item["n"] == 2 { Verdict::Skip } else { Verdict::Keep })
        })
        .unwrap();
        assert_eq!(doc, json!({"items": [{"n": 1}, {"n": 3}]}));
    }

    #[test]
    fn test_map_array_on_root() {
        let mut doc = json!([{"op": "add"}, {"op": "remove"}]);
        map_array(&mut doc, ROOT, |op| {
            op["seen"] = json!(true);
            Ok(Verdict::Keep)
        })
        .unwrap();
        assert_eq!(doc, json!([{"op": "add", "seen": true}, {"op": "remove", "seen": true}]));
    }

    #[test]
    fn test_map_array_propagates_errors() {
        let mut doc = json!({"items": [{}, {}]});
        let mut calls = 0;
        let err = map_array(&mut doc, "items", |_| {
            calls += 1;
            Err(Error::MalformedPatch("boom".to_string()))
        })
        .unwrap_err();
        assert_matches!(err, Error::MalformedPatch(_));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_flat_map_array_splits_and_deletes() {
        let mut doc = json!({"webhooks": [{"rules": [{"n": 1}, {"n": 2}, {"n": 3}]}, {"rules": null}]});
        flat_map_array(&mut doc, "webhooks[].rules", |rule| {
            Ok(match rule["n"].as_i64() {
                Some(1) => vec![],
                Some(2) => vec![json!({"n": 20}), json!({"n": 21})],
                _ => vec![rule],
            })
        })
        .unwrap();
        assert_eq!(
            doc["webhooks"][0]["rules"],
            json!([{"n": 20}, {"n": 21}, {"n": 3}])
        );
        assert_eq!(doc["webhooks"][1]["rules"], Value::Null);

        let mut doc = json!({"rules": {"n": 1}});
        assert!(flat_map_array(&mut doc, "rules", |rule| Ok(vec![rule])).is_err());
    }

    #[test]
    fn test_rewrite_resource_or_list() {
        let mut single = json!({"kind": "Role"});
        let verdict = rewrite_resource_or_list(&mut single, |_| Ok(Verdict::Skip)).unwrap();
        assert_eq!(verdict, Verdict::Skip);

        let mut list = json!({"kind": "RoleList", "items": [{"a": 1}]});
        let verdict = rewrite_resource_or_list(&mut list, |_| Ok(Verdict::Skip)).unwrap();
        assert_eq!(verdict, Verdict::Keep);
        assert_eq!(list["items"], json!([]));
    }

    #[test]
    fn test_transform_map() {
        let mut doc = json!({"metadata": {"labels": {"a": "1"}}});
        transform_map(&mut doc, "metadata.labels", |labels| {
            labels.iter().map(|(k, v)| (format!("x-{k}"), v.clone())).collect()
        })
        .unwrap();
        assert_eq!(doc, json!({"metadata": {"labels": {"x-a": "1"}}}));
    }

    #[test]
    fn test_patch_kind_detect() {
        assert_eq!(PatchKind::detect(b"  \n{\"a\":1}"), PatchKind::Merge);
        assert_eq!(PatchKind::detect(b"\t[]"), PatchKind::Json);
        assert_eq!(PatchKind::detect(b"null"), PatchKind::Unknown);
        assert_eq!(PatchKind::detect(b""), PatchKind::Unknown);
    }
}
