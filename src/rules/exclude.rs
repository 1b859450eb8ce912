//! Exclusion rules applied on restore

use crate::transform;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Hides matching objects from clients of the original API
///
/// Every non-empty criterion must match. Empty criteria match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExcludeRule {
    pub kinds: Vec<String>,
    pub match_names: Vec<String>,
    pub match_labels: BTreeMap<String, String>,
}

impl ExcludeRule {
    /// Match an object. `kind` overrides the object's own kind, for list items
    /// that carry none.
    pub fn matches(&self, obj: &Value, kind: &str) -> bool {
        let kind = if kind.is_empty() {
            transform::get_str(obj, "kind")
        } else {
            kind
        };
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == kind) {
            return false;
        }

        if !self.match_labels.is_empty() {
            let labels = transform::get(obj, "metadata.labels").and_then(Value::as_object);
            let contains_all = self.match_labels.iter().all(|(key, expected)| {
                labels
                    .and_then(|labels| labels.get(key))
                    .and_then(Value::as_str)
                    .is_some_and(|value| value == expected)
            });
            if !contains_all {
                return false;
            }
        }

        if !self.match_names.is_empty() {
            let name = transform::get_str(obj, "metadata.name");
            if !self.match_names.iter().any(|n| n == name) {
                return false;
            }
        }

        true
    }
}
