//! Object metadata, label selectors and object references
//!
//! These pieces are shared by every per-kind strategy: the universal pass
//! that runs after routing rewrites `metadata` of every object, and most
//! strategies embed label selectors or references to other objects.

use crate::error::Result;
use crate::names::PrefixedNameRewriter;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

// =============================================================================
// Metadata
// =============================================================================

/// Rewrite labels, annotations, finalizers and owner references of the
/// metadata object at `path`
pub fn rewrite_metadata_at(rules: &RuleSet, obj: &mut Value, path: &str, action: Action) -> Result<()> {
    transform::transform_map(obj, &transform::join(path, "labels"), |labels| {
        rules.labels().rewrite_map(labels, action)
    })?;
    transform::transform_map(obj, &transform::join(path, "annotations"), |annotations| {
        rules.annotations().rewrite_map(annotations, action)
    })?;
    transform::transform_array_of_strings(obj, &transform::join(path, "finalizers"), |finalizer| {
        rules.finalizers().rewrite(finalizer, action)
    })?;
    transform::map_array(obj, &transform::join(path, "ownerReferences"), |owner| {
        rewrite_reference(rules, owner, "apiVersion", action)?;
        Ok(Verdict::Keep)
    })
}

/// Universal pass over `metadata` of one object
pub fn rewrite_metadata(rules: &RuleSet, obj: &mut Value, action: Action) -> Result<()> {
    rewrite_metadata_at(rules, obj, "metadata", action)
}

// =============================================================================
// Label Selectors
// =============================================================================

/// Rewrite every `LabelSelector` object addressed by `path`: `matchLabels`
/// and the keys and values of `matchExpressions`
pub fn rewrite_label_selector(rules: &RuleSet, obj: &mut Value, path: &str, action: Action) -> Result<()> {
    transform::transform_object(obj, path, |selector| {
        transform::transform_map(selector, "matchLabels", |labels| {
            rules.labels().rewrite_map(labels, action)
        })?;
        rewrite_match_expressions(rules.labels(), selector, "matchExpressions", action)
    })
}

/// Rewrite `{key, operator, values}` requirements in every array addressed
/// by `path`
pub fn rewrite_match_expressions(
    names: &PrefixedNameRewriter,
    obj: &mut Value,
    path: &str,
    action: Action,
) -> Result<()> {
    transform::map_array(obj, path, |expr| {
        let key = transform::get_str(expr, "key").to_string();
        if key.is_empty() {
            return Ok(Verdict::Keep);
        }
        let values = transform::get_strings(expr, "values")?;

        let (new_key, new_values) =
            names.rewrite_name_values(&key, values.as_deref().unwrap_or_default(), action);
        if new_key != key {
            transform::set(expr, "key", Value::String(new_key))?;
        }
        if let Some(values) = values {
            if new_values != values {
                transform::set(expr, "values", new_values.into())?;
            }
        }
        Ok(Verdict::Keep)
    })
}

// =============================================================================
// Object References
// =============================================================================

/// Renamed `(apiVersion, kind)` of a reference to an original kind
pub fn rename_reference(rules: &RuleSet, api_version: &str, kind: &str) -> Option<(String, String)> {
    rules.kind_rules(api_version, kind)?;
    Some((rules.rename_api_version(api_version), rules.rename_kind(kind)))
}

/// Original `(apiVersion, kind)` of a reference to a renamed kind
///
/// The kind decides the original group, so a renamed group shared by several
/// original groups restores correctly. A kind that is unknown, or known under
/// another renamed group, is left alone.
pub fn restore_reference(rules: &RuleSet, api_version: &str, kind: &str) -> Option<(String, String)> {
    if !rules.is_renamed_group(api_version) {
        return None;
    }
    let (renamed_group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, Some(version)),
        None => (api_version, None),
    };

    let kind = rules.restore_kind(kind);
    let found = rules.resource_by_kind(&kind)?;
    let (group_rule, _) = rules.resource_rules(found.group, found.resource)?;
    if group_rule.renamed != renamed_group {
        return None;
    }

    let api_version = match version {
        Some(version) => format!("{}/{version}", found.group),
        None => found.group.to_string(),
    };
    Some((api_version, kind))
}

/// Rewrite the group and `kind` of a reference object in place
///
/// `group_key` names the field holding the group: `apiVersion` for owner
/// references and event subjects, `apiGroup` for typed local references,
/// `group` for admission `GroupVersionKind`s.
///
/// Returns the `(from, to)` groups when the reference was rewritten.
pub fn rewrite_reference(
    rules: &RuleSet,
    obj: &mut Value,
    group_key: &str,
    action: Action,
) -> Result<Option<(String, String)>> {
    let (from, rewritten) = {
        let api_version = transform::get_str(obj, group_key);
        let kind = transform::get_str(obj, "kind");
        if kind.is_empty() || api_version.is_empty() {
            return Ok(None);
        }
        let rewritten = match action {
            Action::Rename => rename_reference(rules, api_version, kind),
            Action::Restore => restore_reference(rules, api_version, kind),
        };
        (group_part(api_version).to_string(), rewritten)
    };

    let Some((api_version, kind)) = rewritten else {
        return Ok(None);
    };
    let to = group_part(&api_version).to_string();
    transform::set(obj, group_key, Value::String(api_version))?;
    transform::set(obj, "kind", Value::String(kind))?;
    Ok(Some((from, to)))
}

/// Group part of `group/version`
pub fn group_part(api_version: &str) -> &str {
    api_version.split_once('/').map_or(api_version, |(group, _)| group)
}
