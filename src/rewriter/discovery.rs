//! Discovery documents
//!
//! Discovery is only ever restored: clients of the original API discover the
//! renamed groups under their original names.
//!
//! One renamed group may hold resources of several original groups. A
//! renamed group in `/apis` is therefore fanned out into all of its original
//! groups, and an aggregated discovery group is regrouped resource by
//! resource:
//!
//! ```text
//! prefixed.resources.group.io          original.group.io
//!   v1: prefixedsomeresources     ->     v1: someresources
//!       prefixedotherresources         other.group.io
//!                                        v1: otherresources
//! ```
//!
//! Original groups still served by the cluster would show up twice, so they
//! are dropped.

use crate::error::{Error, Result};
use crate::rules::{Action, ResourceRule, RuleSet};
use crate::transform::{self, Verdict};
use indexmap::IndexMap;
use serde_json::{json, Value};

/// Replace the group of `group/version`, keeping the version
fn with_group(group_version: &str, group: &str) -> String {
    match group_version.split_once('/') {
        Some((_, version)) => format!("{group}/{version}"),
        None => group.to_string(),
    }
}

/// Take the array under `key`, leaving an empty array in its place
fn take_array(doc: &mut Value, key: &str) -> Result<Option<Vec<Value>>> {
    match doc.get_mut(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(std::mem::take(items))),
        Some(_) => Err(Error::unexpected(key, "array")),
    }
}

// =============================================================================
// APIGroupList, APIGroup
// =============================================================================

/// `/apis`: drop duplicates of original groups, fan renamed groups out
pub fn restore_api_group_list(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    if action != Action::Restore {
        return Ok(());
    }
    let Some(groups) = take_array(doc, "groups")? else {
        return Ok(());
    };

    let mut restored = Vec::with_capacity(groups.len());
    for group in groups {
        let name = transform::get_str(&group, "name");
        if rules.has_group(name) {
            continue;
        }
        if !rules.is_renamed_group(name) {
            restored.push(group);
            continue;
        }
        for original in rules.original_groups(name) {
            let mut copy = group.clone();
            restore_group_versions(&mut copy, original)?;
            restored.push(copy);
        }
    }

    transform::set(doc, "groups", Value::Array(restored))
}

/// `/apis/GROUP`
pub fn restore_api_group(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    if action != Action::Restore {
        return Ok(());
    }
    restore_api_group_as(rules, doc, None)
}

/// `/apis/GROUP` requested under the original group `requested`. Without a
/// requested group a shared renamed group restores to its first original
/// group.
pub fn restore_api_group_as(rules: &RuleSet, doc: &mut Value, requested: Option<&str>) -> Result<()> {
    let name = transform::get_str(doc, "name").to_string();
    if !rules.is_renamed_group(&name) {
        return Ok(());
    }
    let original = original_group(rules, &name, requested);
    restore_group_versions(doc, &original)
}

/// Original group a renamed group is restored to: the requested one when it
/// is behind the renamed group
fn original_group(rules: &RuleSet, renamed_group_version: &str, requested: Option<&str>) -> String {
    match requested {
        Some(group) if rules.original_groups(renamed_group_version).iter().any(|g| g == group) => {
            group.to_string()
        }
        _ => {
            let restored = rules.restore_api_version(renamed_group_version);
            restored.split_once('/').map_or(restored.as_str(), |(g, _)| g).to_string()
        }
    }
}

fn restore_group_versions(group: &mut Value, original: &str) -> Result<()> {
    transform::set(group, "name", Value::String(original.to_string()))?;
    transform::transform_string(group, "versions[].groupVersion", |gv| with_group(gv, original))?;
    transform::transform_string(group, "preferredVersion.groupVersion", |gv| with_group(gv, original))
}

// =============================================================================
// APIResourceList
// =============================================================================

/// `/apis/GROUP/VERSION`: restore `groupVersion` and the resources of the
/// restored group. Resources of other original groups sharing the renamed
/// group are dropped, resources without rules are kept as is.
pub fn restore_api_resource_list(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    if action != Action::Restore {
        return Ok(());
    }
    restore_api_resource_list_as(rules, doc, None)
}

/// `/apis/GROUP/VERSION` requested under the original group `requested`
pub fn restore_api_resource_list_as(rules: &RuleSet, doc: &mut Value, requested: Option<&str>) -> Result<()> {
    let group_version = transform::get_str(doc, "groupVersion").to_string();
    if !rules.is_renamed_group(&group_version) {
        return Ok(());
    }
    let original = original_group(rules, &group_version, requested);
    transform::set(doc, "groupVersion", Value::String(with_group(&group_version, &original)))?;

    transform::map_array(doc, "resources", |resource| {
        let name = transform::get_str(resource, "name").to_string();
        let Some((group_rule, rule)) = rules.restored_resource_rules(&group_version, &name) else {
            return Ok(Verdict::Keep);
        };
        if group_rule.group != original {
            return Ok(Verdict::Skip);
        }

        transform::set(resource, "name", Value::String(rules.restore_resource(&name)))?;
        transform::transform_string(resource, "kind", |kind| rules.restore_kind(kind))?;
        transform::transform_string(resource, "singularName", |singular| rules.restore_resource(singular))?;
        transform::transform_array_of_strings(resource, "shortNames", |short| rules.restore_short_name(short))?;
        restore_categories(rules, rule, resource)?;
        Ok(Verdict::Keep)
    })
}

fn restore_categories(rules: &RuleSet, rule: &ResourceRule, resource: &mut Value) -> Result<()> {
    if resource.get("categories").is_some() {
        transform::set(resource, "categories", rules.restore_categories(Some(rule)).into())?;
    }
    Ok(())
}

// =============================================================================
// APIGroupDiscoveryList
// =============================================================================

/// Restored resources of one version
#[derive(Debug, Default)]
struct VersionResources {
    resources: Vec<Value>,
    freshness: Option<Value>,
}

/// Aggregated discovery (`/apis` with `Accept: application/json;g=apidiscovery.k8s.io`)
pub fn restore_api_group_discovery_list(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    if action != Action::Restore {
        return Ok(());
    }
    let Some(items) = take_array(doc, "items")? else {
        return Ok(());
    };

    let mut restored = Vec::with_capacity(items.len());
    for item in items {
        let name = transform::get_str(&item, "metadata.name");
        if !rules.is_renamed_group(name) {
            if !rules.has_group(name) {
                restored.push(item);
            }
            continue;
        }
        match restore_group_discovery(rules, &item)? {
            Some(groups) => restored.extend(groups),
            None => restored.push(item),
        }
    }

    transform::set(doc, "items", Value::Array(restored))
}

/// Regroup the resources of one renamed `APIGroupDiscovery` by original
/// group. `None` when the group lists no versions.
fn restore_group_discovery(rules: &RuleSet, item: &Value) -> Result<Option<Vec<Value>>> {
    let renamed_group = transform::get_str(item, "metadata.name");
    let versions = match transform::get(item, "versions") {
        Some(Value::Array(versions)) if !versions.is_empty() => versions,
        Some(Value::Array(_)) | Some(Value::Null) | None => return Ok(None),
        Some(_) => return Err(Error::unexpected("versions", "array")),
    };

    let mut index: IndexMap<String, IndexMap<String, VersionResources>> = IndexMap::new();
    for version in versions {
        let version_name = transform::get_str(version, "version");
        if version_name.is_empty() {
            continue;
        }
        let Some(resources) = transform::get(version, "resources").and_then(Value::as_array) else {
            continue;
        };

        for resource in resources {
            let Some((group, restored)) = restore_discovery_resource(rules, renamed_group, resource)? else {
                continue;
            };
            index
                .entry(group)
                .or_default()
                .entry(version_name.to_string())
                .or_insert_with(|| VersionResources {
                    resources: Vec::new(),
                    freshness: version.get("freshness").cloned(),
                })
                .resources
                .push(restored);
        }
    }

    let groups = index
        .into_iter()
        .map(|(group, versions)| {
            let versions: Vec<Value> = versions
                .into_iter()
                .map(|(version, entry)| {
                    let mut obj = json!({"version": version, "resources": entry.resources});
                    if let (Some(freshness), Some(obj)) = (entry.freshness, obj.as_object_mut()) {
                        obj.insert("freshness".to_string(), freshness);
                    }
                    obj
                })
                .collect();
            json!({
                "metadata": {"name": group, "creationTimestamp": null},
                "versions": versions,
            })
        })
        .collect();

    Ok(Some(groups))
}

/// Restore one `APIResourceDiscovery`. Returns its original group, or `None`
/// for a resource without rules.
fn restore_discovery_resource(
    rules: &RuleSet,
    renamed_group: &str,
    resource: &Value,
) -> Result<Option<(String, Value)>> {
    let name = transform::get_str(resource, "resource");
    let Some((group_rule, rule)) = rules.restored_resource_rules(renamed_group, name) else {
        return Ok(None);
    };

    let mut restored = resource.clone();
    transform::set(&mut restored, "resource", Value::String(rules.restore_resource(name)))?;
    restore_response_kind(rules, &mut restored, &group_rule.group, &rule.kind)?;
    transform::transform_string(&mut restored, "singularResource", |singular| {
        rules.restore_resource(singular)
    })?;
    transform::transform_array_of_strings(&mut restored, "shortNames", |short| {
        rules.restore_short_name(short)
    })?;
    restore_categories(rules, rule, &mut restored)?;
    transform::transform_object(&mut restored, "subresources[]", |subresource| {
        restore_response_kind(rules, subresource, &group_rule.group, &rule.kind)
    })?;

    Ok(Some((group_rule.group.clone(), restored)))
}

/// Restore `responseKind` when it points into a renamed group. Subresources
/// such as `scale` answer with kinds of other groups.
fn restore_response_kind(rules: &RuleSet, obj: &mut Value, group: &str, kind: &str) -> Result<()> {
    transform::transform_object(obj, "responseKind", |response_kind| {
        if !rules.is_renamed_group(transform::get_str(response_kind, "group")) {
            return Ok(());
        }
        transform::set(response_kind, "group", Value::String(group.to_string()))?;
        transform::set(response_kind, "kind", Value::String(kind.to_string()))
    })
}
