//! Name Rewriter
//!
//! Bidirectional rewriting of metadata names: label and annotation keys (with
//! their values) and finalizers.
//!
//! A restored name that already matches a rename rule is genuine original
//! data sitting in the renamed world. Restoring it as-is would make it
//! indistinguishable from a name we renamed ourselves, so it is tagged with
//! [`PRESERVED_PREFIX`] instead. The next rename strips the tag and recovers
//! the exact original name.

use crate::rules::{Action, MetadataReplace, MetadataReplaceRule};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Marker prepended to original names found in renamed objects
pub const PRESERVED_PREFIX: &str = "preserved-original-";

// =============================================================================
// Name Index
// =============================================================================

/// One direction of a [`MetadataReplace`] table
#[derive(Debug, Clone, Default)]
struct NameIndex {
    /// Exact name
    names: HashMap<String, String>,
    /// Exact name and value, rewritten together
    pairs: HashMap<String, HashMap<String, (String, String)>>,
    /// Part of the name before the first '/'
    prefixes: HashMap<String, String>,
}

impl NameIndex {
    fn build(rules: &MetadataReplace, action: Action) -> Self {
        let mut index = Self::default();

        let direct = |rule: &MetadataReplaceRule| match action {
            Action::Rename => (
                rule.original.clone(),
                rule.original_value.clone(),
                rule.renamed.clone(),
                rule.renamed_value.clone(),
            ),
            Action::Restore => (
                rule.renamed.clone(),
                rule.renamed_value.clone(),
                rule.original.clone(),
                rule.original_value.clone(),
            ),
        };

        for rule in &rules.names {
            let (from, from_value, to, to_value) = direct(rule);
            if rule.original_value.is_empty() || rule.renamed_value.is_empty() {
                index.names.insert(from, to);
            } else {
                index
                    .pairs
                    .entry(from)
                    .or_default()
                    .insert(from_value, (to, to_value));
            }
        }
        for rule in &rules.prefixes {
            let (from, _, to, _) = direct(rule);
            index.prefixes.insert(from, to);
        }

        index
    }

    fn lookup(&self, name: &str, value: &str) -> Option<(String, String)> {
        if !value.is_empty() {
            if let Some((n, v)) = self.pairs.get(name).and_then(|values| values.get(value)) {
                return Some((n.clone(), v.clone()));
            }
        }
        if let Some(n) = self.names.get(name) {
            return Some((n.clone(), value.to_string()));
        }
        let (prefix, remainder) = name.split_once('/')?;
        self.prefixes
            .get(prefix)
            .map(|p| (format!("{p}/{remainder}"), value.to_string()))
    }

    fn matches(&self, name: &str, value: &str) -> bool {
        if !value.is_empty() && self.pairs.get(name).is_some_and(|v| v.contains_key(value)) {
            return true;
        }
        if self.names.contains_key(name) {
            return true;
        }
        name.split_once('/')
            .is_some_and(|(prefix, _)| self.prefixes.contains_key(prefix))
    }
}

// =============================================================================
// Prefixed Name Rewriter
// =============================================================================

/// Rewrites names (and values) of labels, annotations or finalizers
#[derive(Debug, Clone, Default)]
pub struct PrefixedNameRewriter {
    rename_index: NameIndex,
    restore_index: NameIndex,
}

impl PrefixedNameRewriter {
    pub fn new(rules: &MetadataReplace) -> Self {
        Self {
            rename_index: NameIndex::build(rules, Action::Rename),
            restore_index: NameIndex::build(rules, Action::Restore),
        }
    }

    /// Rename a name and its value. A preserved name loses its marker.
    pub fn rename(&self, name: &str, value: &str) -> (String, String) {
        if let Some(original) = name.strip_prefix(PRESERVED_PREFIX) {
            return (original.to_string(), value.to_string());
        }
        self.rename_index
            .lookup(name, value)
            .unwrap_or_else(|| (name.to_string(), value.to_string()))
    }

    /// Restore a name and its value. An original name gets the preserve marker.
    pub fn restore(&self, name: &str, value: &str) -> (String, String) {
        if self.rename_index.matches(name, value) {
            return (format!("{PRESERVED_PREFIX}{name}"), value.to_string());
        }
        self.restore_index
            .lookup(name, value)
            .unwrap_or_else(|| (name.to_string(), value.to_string()))
    }

    pub fn rewrite_name_value(&self, name: &str, value: &str, action: Action) -> (String, String) {
        match action {
            Action::Rename => self.rename(name, value),
            Action::Restore => self.restore(name, value),
        }
    }

    /// Rewrite a bare name, e.g. a finalizer
    pub fn rewrite(&self, name: &str, action: Action) -> String {
        self.rewrite_name_value(name, "", action).0
    }

    /// Rewrite one name with many values, as in a match expression
    ///
    /// The first value whose rule changes the name decides the new name; each
    /// value is rewritten on its own.
    pub fn rewrite_name_values(&self, name: &str, values: &[String], action: Action) -> (String, Vec<String>) {
        if values.is_empty() {
            return (self.rewrite(name, action), Vec::new());
        }

        let mut new_name: Option<String> = None;
        let new_values = values
            .iter()
            .map(|value| {
                let (n, v) = self.rewrite_name_value(name, value, action);
                if n != name && new_name.is_none() {
                    new_name = Some(n);
                }
                v
            })
            .collect();

        (new_name.unwrap_or_else(|| name.to_string()), new_values)
    }

    /// Rewrite names only
    pub fn rewrite_slice(&self, names: &[String], action: Action) -> Vec<String> {
        names.iter().map(|name| self.rewrite(name, action)).collect()
    }

    /// Rewrite keys and string values of a label or annotation map, keeping
    /// key order
    pub fn rewrite_map(&self, map: &Map<String, Value>, action: Action) -> Map<String, Value> {
        map.iter()
            .map(|(name, value)| match value {
                Value::String(s) => {
                    let (n, v) = self.rewrite_name_value(name, s, action);
                    (n, Value::String(v))
                }
                other => (self.rewrite(name, action), other.clone()),
            })
            .collect()
    }
}
