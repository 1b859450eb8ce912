//! ValidatingAdmissionPolicies and their bindings
//!
//! Both select requests with `resourceRules` shaped like RBAC rules, plus an
//! object and a namespace selector.

use super::metadata::rewrite_label_selector;
use super::rbac::rewrite_policy_rules;
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

pub fn rewrite_policy(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |policy| {
        rewrite_match_resources(rules, policy, "spec.matchConstraints", action)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

pub fn rewrite_binding(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |binding| {
        rewrite_match_resources(rules, binding, "spec.matchResources", action)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

fn rewrite_match_resources(rules: &RuleSet, obj: &mut Value, path: &str, action: Action) -> Result<()> {
    transform::transform_object(obj, path, |resources| {
        rewrite_policy_rules(rules, resources, "resourceRules", action)?;
        rewrite_policy_rules(rules, resources, "excludeResourceRules", action)?;
        rewrite_label_selector(rules, resources, "objectSelector", action)?;
        rewrite_label_selector(rules, resources, "namespaceSelector", action)
    })
}
