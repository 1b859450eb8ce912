//! Mutating and validating webhook configurations

use super::metadata::rewrite_label_selector;
use super::rbac::rewrite_policy_rules;
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

pub fn rewrite(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |configuration| {
        rewrite_webhooks(rules, configuration, action)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

/// Rewrite `webhooks[]` of one configuration: matched resources, the
/// service path and both selectors
pub fn rewrite_webhooks(rules: &RuleSet, configuration: &mut Value, action: Action) -> Result<()> {
    transform::transform_object(configuration, "webhooks[]", |webhook| {
        rewrite_policy_rules(rules, webhook, "rules", action)?;
        transform::transform_string(webhook, "clientConfig.service.path", |path| match action {
            Action::Rename => rules.rename_webhook_path(path),
            Action::Restore => rules.restore_webhook_path(path),
        })?;
        rewrite_label_selector(rules, webhook, "objectSelector", action)?;
        rewrite_label_selector(rules, webhook, "namespaceSelector", action)
    })
}
