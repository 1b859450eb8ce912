//! Compiled rule set with derived reverse indices

use super::{ApiGroupRule, ExcludeRule, GroupRule, ResourceRule, RewriteRules, WebhookRule};
use crate::names::PrefixedNameRewriter;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Location of a kind in the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindRef<'a> {
    /// Original group
    pub group: &'a str,
    /// Original resource plural
    pub resource: &'a str,
    /// The kind is the list kind of the resource
    pub is_list: bool,
}

#[derive(Debug, Clone)]
struct KindEntry {
    group: String,
    resource: String,
    is_list: bool,
}

/// Indexed, read-only rewrite rules
///
/// All lookups are total: an unknown name is returned unchanged or yields
/// `None`, never an error. Nothing is mutated after [`RuleSet::new`].
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: RewriteRules,
    /// Renamed group to original groups, sorted
    renamed_groups: HashMap<String, Vec<String>>,
    /// Renamed group, renamed plural to original group
    renamed_resources: HashMap<String, HashMap<String, String>>,
    /// Original plural to original group
    plurals: HashMap<String, String>,
    /// Original kind or list kind to its resource
    kinds: HashMap<String, KindEntry>,
    /// Original group, kind or list kind to original plural
    group_kinds: HashMap<String, HashMap<String, String>>,
    /// Original webhook path to renamed webhook path
    webhook_paths: HashMap<String, String>,
    labels: PrefixedNameRewriter,
    annotations: PrefixedNameRewriter,
    finalizers: PrefixedNameRewriter,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(RewriteRules::default())
    }
}

impl RuleSet {
    /// Build indices for the rules.
    ///
    /// An exclude rule listing every original kind and list kind is appended:
    /// such objects in the renamed world have no original identity.
    pub fn new(mut rules: RewriteRules) -> Self {
        let mut renamed_groups: HashMap<String, Vec<String>> = HashMap::new();
        let mut renamed_resources: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut plurals = HashMap::new();
        let mut kinds = HashMap::new();
        let mut group_kinds: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut original_kinds = Vec::new();

        for (group_name, group) in &rules.rules {
            renamed_groups
                .entry(group.group_rule.renamed.clone())
                .or_default()
                .push(group_name.clone());

            for (plural, resource) in &group.resource_rules {
                renamed_resources
                    .entry(group.group_rule.renamed.clone())
                    .or_default()
                    .entry(format!("{}{}", rules.resource_type_prefix, plural))
                    .or_insert_with(|| group_name.clone());
                plurals
                    .entry(plural.clone())
                    .or_insert_with(|| group_name.clone());

                for (kind, is_list) in [(&resource.kind, false), (&resource.list_kind, true)] {
                    if kind.is_empty() {
                        continue;
                    }
                    original_kinds.push(kind.clone());
                    group_kinds
                        .entry(group_name.clone())
                        .or_default()
                        .entry(kind.clone())
                        .or_insert_with(|| plural.clone());
                    kinds.entry(kind.clone()).or_insert_with(|| KindEntry {
                        group: group_name.clone(),
                        resource: plural.clone(),
                        is_list,
                    });
                }
            }
        }

        let webhook_paths = rules
            .webhooks
            .iter()
            .map(|(renamed, webhook)| (webhook.path.clone(), renamed.clone()))
            .collect();

        if !original_kinds.is_empty() {
            rules.excludes.push(ExcludeRule {
                kinds: original_kinds,
                ..Default::default()
            });
        }

        debug!(
            groups = rules.rules.len(),
            kinds = kinds.len(),
            webhooks = rules.webhooks.len(),
            excludes = rules.excludes.len(),
            "Rewrite rules indexed"
        );

        Self {
            labels: PrefixedNameRewriter::new(&rules.labels),
            annotations: PrefixedNameRewriter::new(&rules.annotations),
            finalizers: PrefixedNameRewriter::new(&rules.finalizers),
            rules,
            renamed_groups,
            renamed_resources,
            plurals,
            kinds,
            group_kinds,
            webhook_paths,
        }
    }

    /// The rules this set was built from, including the implicit exclude rule
    pub fn rules(&self) -> &RewriteRules {
        &self.rules
    }

    pub fn labels(&self) -> &PrefixedNameRewriter {
        &self.labels
    }

    pub fn annotations(&self) -> &PrefixedNameRewriter {
        &self.annotations
    }

    pub fn finalizers(&self) -> &PrefixedNameRewriter {
        &self.finalizers
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Group rule for an original `group` or `group/version`
    pub fn group_rule(&self, api_group: &str) -> Option<&ApiGroupRule> {
        self.rules.rules.get(group_of(api_group))
    }

    /// Rules for an original group and resource. `/version` and
    /// `/subresource` suffixes are ignored.
    pub fn resource_rules(&self, api_group: &str, resource: &str) -> Option<(&GroupRule, &ResourceRule)> {
        let group = self.group_rule(api_group)?;
        let resource = resource.split_once('/').map_or(resource, |(r, _)| r);
        let rule = group.resource_rules.get(resource)?;
        Some((&group.group_rule, rule))
    }

    /// Rules for an original group and a kind or list kind
    pub fn kind_rules(&self, api_group: &str, kind: &str) -> Option<(&GroupRule, &ResourceRule)> {
        let plural = self.group_kinds.get(group_of(api_group))?.get(kind)?;
        self.resource_rules(api_group, plural)
    }

    /// Rules for an original resource plural in any group
    pub fn group_resource_rules(&self, resource: &str) -> Option<(&GroupRule, &ResourceRule)> {
        let group = self.plurals.get(resource)?;
        self.resource_rules(group, resource)
    }

    /// Resource for an original kind or list kind in any group
    pub fn resource_by_kind(&self, kind: &str) -> Option<KindRef<'_>> {
        self.kinds.get(kind).map(|entry| KindRef {
            group: &entry.group,
            resource: &entry.resource,
            is_list: entry.is_list,
        })
    }

    /// Rules for a renamed resource served in a renamed group. Resolves which
    /// original group the resource belongs to when several original groups
    /// share one renamed group.
    pub fn restored_resource_rules(
        &self,
        renamed_group: &str,
        renamed_resource: &str,
    ) -> Option<(&GroupRule, &ResourceRule)> {
        let resource = renamed_resource
            .split_once('/')
            .map_or(renamed_resource, |(r, _)| r);
        let group = self
            .renamed_resources
            .get(group_of(renamed_group))?
            .get(resource)?;
        self.resource_rules(group, &self.restore_resource(resource))
    }

    /// Webhook served behind a renamed path
    pub fn webhook_rule(&self, path: &str) -> Option<&WebhookRule> {
        self.rules.webhooks.get(path)
    }

    /// Original group names behind a renamed group
    pub fn original_groups(&self, renamed_group: &str) -> &[String] {
        self.renamed_groups
            .get(group_of(renamed_group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_renamed_group(&self, api_group: &str) -> bool {
        self.renamed_groups.contains_key(group_of(api_group))
    }

    /// Whether an original group has rules
    pub fn has_group(&self, api_group: &str) -> bool {
        self.rules.rules.contains_key(group_of(api_group))
    }

    pub fn should_exclude(&self, obj: &Value, kind: &str) -> bool {
        self.rules.excludes.iter().any(|rule| rule.matches(obj, kind))
    }

    // =========================================================================
    // Rename / Restore
    // =========================================================================

    /// Rename the group of an `apiVersion` or a bare group, keeping the version
    pub fn rename_api_version(&self, api_version: &str) -> String {
        let (group, version) = split_api_version(api_version);
        match self.rules.rules.get(group) {
            Some(rule) => format!("{}{}", rule.group_rule.renamed, version),
            None => api_version.to_string(),
        }
    }

    /// Restore the group of an `apiVersion` or a bare group, keeping the
    /// version. A renamed group shared by several original groups restores to
    /// the first original group by name.
    pub fn restore_api_version(&self, api_version: &str) -> String {
        let (group, version) = split_api_version(api_version);
        match self.renamed_groups.get(group).and_then(|groups| groups.first()) {
            Some(original) => format!("{original}{version}"),
            None => api_version.to_string(),
        }
    }

    pub fn rename_kind(&self, kind: &str) -> String {
        format!("{}{}", self.rules.kind_prefix, kind)
    }

    pub fn restore_kind(&self, kind: &str) -> String {
        kind.strip_prefix(self.rules.kind_prefix.as_str())
            .unwrap_or(kind)
            .to_string()
    }

    /// Rename a resource plural or singular, keeping any `/subresource`
    pub fn rename_resource(&self, resource: &str) -> String {
        format!("{}{}", self.rules.resource_type_prefix, resource)
    }

    pub fn restore_resource(&self, resource: &str) -> String {
        resource
            .strip_prefix(self.rules.resource_type_prefix.as_str())
            .unwrap_or(resource)
            .to_string()
    }

    pub fn rename_short_name(&self, short_name: &str) -> String {
        format!("{}{}", self.rules.short_name_prefix, short_name)
    }

    pub fn restore_short_name(&self, short_name: &str) -> String {
        short_name
            .strip_prefix(self.rules.short_name_prefix.as_str())
            .unwrap_or(short_name)
            .to_string()
    }

    /// Renamed resources are put into the configured categories only
    pub fn rename_categories(&self, categories: &[String]) -> Vec<String> {
        if categories.is_empty() {
            return Vec::new();
        }
        self.rules.categories.clone()
    }

    pub fn restore_categories(&self, resource: Option<&ResourceRule>) -> Vec<String> {
        resource.map(|r| r.categories.clone()).unwrap_or_default()
    }

    /// Renamed path of an original webhook path
    pub fn rename_webhook_path(&self, path: &str) -> String {
        self.webhook_paths
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }

    /// Original path of a renamed webhook path
    pub fn restore_webhook_path(&self, path: &str) -> String {
        self.webhook_rule(path)
            .map(|webhook| webhook.path.clone())
            .unwrap_or_else(|| path.to_string())
    }
}

/// Group part of `group/version`
fn group_of(api_version: &str) -> &str {
    split_api_version(api_version).0
}

/// Split `group/version` into `group` and `/version`
fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.find('/') {
        Some(i) => api_version.split_at(i),
        None => (api_version, ""),
    }
}
