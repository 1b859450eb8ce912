//! Generic custom resources: `apiVersion`, `kind` and managed fields
//!
//! This is the fallback for every kind without a dedicated strategy. A kind
//! absent from the rules is left untouched, which is what makes unrelated
//! traffic pass through byte-identical.

use super::metadata::{group_part, rewrite_reference};
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

pub fn rewrite(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    if rewrite_type_meta(rules, doc, action)?.is_none() {
        return Ok(());
    }

    if transform::get(doc, "items").is_some_and(Value::is_array) {
        transform::map_array(doc, "items", |item| {
            rewrite_type_meta(rules, item, action)?;
            Ok(Verdict::Keep)
        })?;
    }
    Ok(())
}

/// Rewrite `apiVersion`, `kind` and managed fields of one object or list item
fn rewrite_type_meta(rules: &RuleSet, obj: &mut Value, action: Action) -> Result<Option<(String, String)>> {
    let groups = rewrite_reference(rules, obj, "apiVersion", action)?;
    if let Some(groups) = &groups {
        rewrite_managed_fields(obj, groups)?;
    }
    Ok(groups)
}

/// Swap the group of `metadata.managedFields[].apiVersion` entries written
/// against the object's own group
fn rewrite_managed_fields(obj: &mut Value, (from, to): &(String, String)) -> Result<()> {
    transform::transform_string(obj, "metadata.managedFields[].apiVersion", |api_version| {
        if group_part(api_version) != from.as_str() {
            return api_version.to_string();
        }
        match api_version.split_once('/') {
            Some((_, version)) => format!("{to}/{version}"),
            None => to.clone(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures::test_rule_set;
    use serde_json::json;

    #[test]
    fn test_rename_and_restore_resource() {
        let rules = test_rule_set();
        let original = json!({
            "apiVersion": "original.group.io/v1",
            "kind": "SomeResource",
            "metadata": {
                "name": "a",
                "managedFields": [
                    {"apiVersion": "original.group.io/v1", "manager": "kubectl"},
                    {"apiVersion": "v1", "manager": "other"}
                ]
            },
            "spec": {"kind": "SomeResource"}
        });

        let mut doc = original.clone();
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc["apiVersion"], "prefixed.resources.group.io/v1");
        assert_eq!(doc["kind"], "PrefixedSomeResource");
        assert_eq!(doc["metadata"]["managedFields"][0]["apiVersion"], "prefixed.resources.group.io/v1");
        assert_eq!(doc["metadata"]["managedFields"][1]["apiVersion"], "v1");
        assert_eq!(doc["spec"], original["spec"]);

        rewrite(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_rewrite_list_items() {
        let rules = test_rule_set();
        let mut doc = json!({
            "apiVersion": "other.prefixed.resources.group.io/v1",
            "kind": "PrefixedOtherResourceList",
            "items": [
                {"apiVersion": "other.prefixed.resources.group.io/v1", "kind": "PrefixedOtherResource"},
                {"metadata": {"name": "no-type-meta"}}
            ]
        });
        rewrite(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(
            doc,
            json!({
                "apiVersion": "other.group.io/v1",
                "kind": "OtherResourceList",
                "items": [
                    {"apiVersion": "other.group.io/v1", "kind": "OtherResource"},
                    {"metadata": {"name": "no-type-meta"}}
                ]
            })
        );
    }

    #[test]
    fn test_unknown_kind_untouched() {
        let rules = test_rule_set();
        let original = json!({"apiVersion": "example.com/v1", "kind": "Widget", "items": [{"kind": "SomeResource"}]});
        let mut doc = original.clone();
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc, original);
    }
}
