//! Rewrite Rules
//!
//! The rule model is split in two:
//!
//! - [`RewriteRules`]: the configuration, as loaded from a rules file by the
//!   embedding application.
//! - [`RuleSet`]: the compiled form with derived reverse indices. Built once
//!   by [`RuleSet::new`] and never mutated afterwards, so it is shared between
//!   request-handling threads without locks.

mod exclude;
mod index;

pub use exclude::ExcludeRule;
pub use index::{KindRef, RuleSet};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Action
// =============================================================================

/// Direction of a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Original names to renamed names, for traffic toward the API server
    Rename,
    /// Renamed names back to original names, for traffic toward clients
    Restore,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Rename => write!(f, "rename"),
            Action::Restore => write!(f, "restore"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rename" => Ok(Action::Rename),
            "restore" => Ok(Action::Restore),
            other => Err(Error::Configuration(format!(
                "unknown action `{other}`, expected rename or restore"
            ))),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Rewrite configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteRules {
    /// Prefix added to kinds and list kinds
    pub kind_prefix: String,
    /// Prefix added to resource plurals and singulars
    pub resource_type_prefix: String,
    /// Prefix added to short names
    pub short_name_prefix: String,
    /// Categories every renamed resource is put into
    pub categories: Vec<String>,
    /// Original group name to group rule
    pub rules: BTreeMap<String, ApiGroupRule>,
    /// Renamed webhook path to the original webhook
    pub webhooks: BTreeMap<String, WebhookRule>,
    pub labels: MetadataReplace,
    pub annotations: MetadataReplace,
    pub finalizers: MetadataReplace,
    /// Objects hidden from clients on restore
    pub excludes: Vec<ExcludeRule>,
}

impl RewriteRules {
    /// Parse rules from a YAML document
    pub fn from_yaml(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Parse rules from a JSON document
    pub fn from_json(input: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(input)?)
    }

    /// Check the rules for contradictions that would break the reverse indices
    pub fn validate(&self) -> Result<()> {
        for (name, group) in &self.rules {
            if name != &group.group_rule.group {
                return Err(Error::Configuration(format!(
                    "group rule key `{name}` differs from groupRule.group `{}`",
                    group.group_rule.group
                )));
            }
            if group.group_rule.renamed.is_empty() {
                return Err(Error::Configuration(format!(
                    "group `{name}` has no renamed group"
                )));
            }
            for (plural, resource) in &group.resource_rules {
                if plural != &resource.plural {
                    return Err(Error::Configuration(format!(
                        "resource rule key `{plural}` in group `{name}` differs from plural `{}`",
                        resource.plural
                    )));
                }
                if resource.kind.is_empty() {
                    return Err(Error::Configuration(format!(
                        "resource `{plural}` in group `{name}` has no kind"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Rules for one original API group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiGroupRule {
    pub group_rule: GroupRule,
    /// Resource plural to resource rule
    pub resource_rules: BTreeMap<String, ResourceRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupRule {
    pub group: String,
    pub versions: Vec<String>,
    pub preferred_version: String,
    pub renamed: String,
}

/// Original names of one resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRule {
    pub kind: String,
    pub list_kind: String,
    pub plural: String,
    pub singular: String,
    pub short_names: Vec<String>,
    pub categories: Vec<String>,
    pub versions: Vec<String>,
    pub preferred_version: String,
}

/// Original webhook served behind a renamed path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookRule {
    pub path: String,
    pub group: String,
    pub resource: String,
}

/// Rename rules for one kind of metadata name: labels, annotations or
/// finalizers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataReplace {
    /// Matched against the part of a name before the first `/`
    #[serde(rename = "Prefixes", alias = "prefixes")]
    pub prefixes: Vec<MetadataReplaceRule>,
    /// Matched against the whole name, and the value when set
    #[serde(rename = "Names", alias = "names")]
    pub names: Vec<MetadataReplaceRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataReplaceRule {
    pub original: String,
    pub renamed: String,
    pub original_value: String,
    pub renamed_value: String,
}

impl MetadataReplaceRule {
    pub fn new(original: &str, renamed: &str) -> Self {
        Self {
            original: original.to_string(),
            renamed: renamed.to_string(),
            ..Default::default()
        }
    }

    pub fn with_values(original: &str, original_value: &str, renamed: &str, renamed_value: &str) -> Self {
        Self {
            original: original.to_string(),
            renamed: renamed.to_string(),
            original_value: original_value.to_string(),
            renamed_value: renamed_value.to_string(),
        }
    }
}
