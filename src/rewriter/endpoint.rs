//! Request path and query rewriting
//!
//! Paths are only renamed: clients of the original API address resources by
//! their original names, the API server serves them under renamed ones.
//!
//! ```text
//! /apis/original.group.io/v1/someresources
//!   -> /apis/prefixed.resources.group.io/v1/prefixedsomeresources
//! /apis/apiextensions.k8s.io/v1/customresourcedefinitions/someresources.original.group.io
//!   -> /apis/apiextensions.k8s.io/v1/customresourcedefinitions/prefixedsomeresources.prefixed.resources.group.io
//! ```

use super::RuleBasedRewriter;
use crate::endpoint::selector::rewrite_label_selector_query;
use crate::endpoint::{ApiEndpoint, EndpointKind};
use crate::rules::{Action, RuleSet};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

/// `metadata.name=RESOURCETYPE.GROUP` in the url-encoded field selector of a
/// CRD list request
static CRD_NAME_FIELD_SELECTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"metadata\.name%3D([a-z0-9-]+)((\.[a-z0-9-]+)*)").expect("valid field selector pattern")
});

impl RuleBasedRewriter {
    /// Rename the group, resource type or CRD name in a request path, and
    /// labels in a `labelSelector` query parameter
    ///
    /// Returns `None` when nothing changed, so unrelated requests are
    /// forwarded as is.
    pub fn rewrite_api_endpoint(&self, endpoint: &ApiEndpoint) -> Option<ApiEndpoint> {
        let rules = self.rules();
        let path_rewritten = match endpoint.kind {
            EndpointKind::Group if endpoint.is_crd => rewrite_crd_endpoint(rules, endpoint),
            EndpointKind::Group => rewrite_resource_endpoint(rules, endpoint),
            EndpointKind::Root | EndpointKind::Core | EndpointKind::Unknown => None,
        };

        let mut rewritten = path_rewritten.is_some();
        let mut target = path_rewritten.unwrap_or_else(|| endpoint.clone());

        if let Some(query) = rewrite_label_selector_query(&target.raw_query, rules.labels(), Action::Rename) {
            target.raw_query = query;
            rewritten = true;
        }

        if rewritten {
            trace!(from = %endpoint, to = %target, "Endpoint rewritten");
        }
        rewritten.then_some(target)
    }
}

fn rewrite_crd_endpoint(rules: &RuleSet, endpoint: &ApiEndpoint) -> Option<ApiEndpoint> {
    if endpoint.crd_group.is_empty() && endpoint.crd_resource_type.is_empty() {
        // CRD list, possibly filtered by name.
        let query = rewrite_crd_field_selector(rules, &endpoint.raw_query)?;
        return Some(ApiEndpoint {
            raw_query: query,
            ..endpoint.clone()
        });
    }

    rules.resource_rules(&endpoint.crd_group, &endpoint.crd_resource_type)?;
    let mut target = endpoint.clone();
    target.crd_group = rules.rename_api_version(&endpoint.crd_group);
    target.crd_resource_type = rules.rename_resource(&endpoint.crd_resource_type);
    target.name = format!("{}.{}", target.crd_resource_type, target.crd_group);
    Some(target)
}

/// Rename `metadata.name=RESOURCETYPE.GROUP` in a CRD list field selector
fn rewrite_crd_field_selector(rules: &RuleSet, raw_query: &str) -> Option<String> {
    if !raw_query.contains("metadata.name") {
        return None;
    }
    let captures = CRD_NAME_FIELD_SELECTOR.captures(raw_query)?;
    let resource_type = captures.get(1)?.as_str();
    let group = captures.get(2)?.as_str().trim_start_matches('.');
    rules.resource_rules(group, resource_type)?;

    let selector = format!(
        "metadata.name%3D{}.{}",
        rules.rename_resource(resource_type),
        rules.rename_api_version(group)
    );
    Some(
        CRD_NAME_FIELD_SELECTOR
            .replace_all(raw_query, regex::NoExpand(&selector))
            .into_owned(),
    )
}

fn rewrite_resource_endpoint(rules: &RuleSet, endpoint: &ApiEndpoint) -> Option<ApiEndpoint> {
    // Discovery of all groups
    if endpoint.group.is_empty() {
        return None;
    }
    rules.group_rule(&endpoint.group)?;

    let mut target = endpoint.clone();
    target.group = rules.rename_api_version(&endpoint.group);
    if !endpoint.resource_type.is_empty() {
        rules.resource_rules(&endpoint.group, &endpoint.resource_type)?;
        target.resource_type = rules.rename_resource(&endpoint.resource_type);
    }
    Some(target)
}
