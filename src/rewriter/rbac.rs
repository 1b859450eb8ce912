//! Roles and ClusterRoles
//!
//! ```text
//! rules:
//! - apiGroups: [original.group.io]           -> [prefixed.resources.group.io]
//!   resources: [someresources, someresources/status]
//!                                            -> [prefixedsomeresources, prefixedsomeresources/status]
//! ```
//!
//! Wildcards and the core group are never rewritten.

use super::metadata::rewrite_label_selector;
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

const WILDCARD: &str = "*";

pub fn rewrite_role(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |role| {
        rewrite_policy_rules(rules, role, "rules", action)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

pub fn rewrite_cluster_role(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |role| {
        rewrite_policy_rules(rules, role, "rules", action)?;
        rewrite_label_selector(rules, role, "aggregationRule.clusterRoleSelectors[]", action)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

/// Rewrite every `{apiGroups, resources}` rule in the arrays addressed by
/// `path`. Shared by RBAC, webhook and admission policy rules.
///
/// On restore a rule may be split in several: a renamed group can hold
/// resources of more than one original group.
pub fn rewrite_policy_rules(rules: &RuleSet, obj: &mut Value, path: &str, action: Action) -> Result<()> {
    match action {
        Action::Rename => transform::map_array(obj, path, |rule| {
            rename_policy_rule(rules, rule)?;
            Ok(Verdict::Keep)
        }),
        Action::Restore => transform::flat_map_array(obj, path, |rule| restore_policy_rule(rules, rule)),
    }
}

fn rename_policy_rule(rules: &RuleSet, rule: &mut Value) -> Result<()> {
    let groups = transform::get_strings(rule, "apiGroups")?.unwrap_or_default();

    // Resources first: their rules are looked up with the groups as they were.
    transform::transform_array_of_strings(rule, "resources", |resource| {
        if resource == WILDCARD {
            return resource.to_string();
        }
        if groups.iter().any(|group| rules.resource_rules(group, resource).is_some()) {
            return rules.rename_resource(resource);
        }
        resource.to_string()
    })?;

    transform::transform_array_of_strings(rule, "apiGroups", |group| {
        if group == WILDCARD || group.is_empty() {
            return group.to_string();
        }
        rules.rename_api_version(group)
    })
}

/// Restore one rule, one output rule per original group its resources
/// belong to
fn restore_policy_rule(rules: &RuleSet, rule: Value) -> Result<Vec<Value>> {
    let groups = transform::get_strings(&rule, "apiGroups")?.unwrap_or_default();
    if !groups.iter().any(|group| rules.is_renamed_group(group)) {
        return Ok(vec![rule]);
    }
    let Some(resources) = transform::get_strings(&rule, "resources")? else {
        let mut rule = rule;
        transform::set(&mut rule, "apiGroups", restore_groups(rules, &groups, None).into())?;
        return Ok(vec![rule]);
    };

    // Each resource with the original group it restores into. Wildcards and
    // resources without rules have none.
    let resolved: Vec<(Option<&str>, String)> = resources
        .iter()
        .map(|resource| {
            let restored = (resource.as_str() != WILDCARD)
                .then(|| {
                    groups
                        .iter()
                        .find_map(|group| rules.restored_resource_rules(group, resource))
                })
                .flatten();
            match restored {
                Some((group_rule, _)) => (Some(group_rule.group.as_str()), rules.restore_resource(resource)),
                None => (None, resource.clone()),
            }
        })
        .collect();

    // A rule is only split when its resources span several original groups.
    let mut by_group: IndexMap<Option<&str>, Vec<String>> = IndexMap::new();
    let originals: IndexSet<&str> = resolved.iter().filter_map(|(group, _)| *group).collect();
    for (group, resource) in resolved {
        let key = if originals.len() == 1 { originals.first().copied() } else { group };
        by_group.entry(key).or_default().push(resource);
    }
    if by_group.is_empty() {
        by_group.insert(originals.first().copied(), Vec::new());
    }

    let mut restored = Vec::with_capacity(by_group.len());
    for (group_rule, resources) in by_group {
        let mut split = rule.clone();
        transform::set(&mut split, "apiGroups", restore_groups(rules, &groups, group_rule).into())?;
        transform::set(&mut split, "resources", resources.into())?;
        restored.push(split);
    }
    Ok(restored)
}

/// Restore `apiGroups` for resources of `original`. Without a known original
/// group a shared renamed group falls back to its first original group.
fn restore_groups(rules: &RuleSet, groups: &[String], original: Option<&str>) -> Vec<String> {
    let original = original.and_then(|group| rules.group_rule(group)).map(|rule| &rule.group_rule);
    let mut restored: Vec<String> = Vec::with_capacity(groups.len());
    for group in groups {
        let group = match original {
            _ if group == WILDCARD || group.is_empty() => group.clone(),
            Some(original) if original.renamed == *group => original.group.clone(),
            _ => rules.restore_api_version(group),
        };
        if !restored.contains(&group) {
            restored.push(group);
        }
    }
    restored
}
