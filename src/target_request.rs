//! Per-request rewrite context
//!
//! A [`TargetRequest`] is built once per proxied request. It holds the parsed
//! endpoint the client asked for, the endpoint to forward to when the path
//! itself was renamed, and the webhook rule when the request is an admission
//! call to a renamed webhook path.

use crate::endpoint::{ApiEndpoint, EndpointKind, CRD_RESOURCE_TYPE};
use crate::rewriter::RuleBasedRewriter;
use crate::rules::WebhookRule;
use tracing::trace;

/// Resource types whose payloads may carry renamed names even though their
/// paths are never rewritten
const REWRITABLE_RESOURCES: &[&str] = &[
    "nodes",
    "pods",
    "configmaps",
    "secrets",
    "services",
    "serviceaccounts",
    "mutatingwebhookconfigurations",
    "validatingwebhookconfigurations",
    "clusterroles",
    "roles",
    "rolebindings",
    "clusterrolebindings",
    "deployments",
    "statefulsets",
    "daemonsets",
    "jobs",
    "persistentvolumeclaims",
    "prometheusrules",
    "servicemonitors",
    "poddisruptionbudgets",
    "controllerrevisions",
    "apiservices",
    "validatingadmissionpolicybindings",
    "validatingadmissionpolicies",
    "events",
];

fn should_rewrite_resource(resource_type: &str) -> bool {
    REWRITABLE_RESOURCES.contains(&resource_type)
}

/// Parsed request with its rewritten form
#[derive(Debug, Clone, Default)]
pub struct TargetRequest {
    origin: Option<ApiEndpoint>,
    target: Option<ApiEndpoint>,
    webhook: Option<WebhookRule>,
}

impl TargetRequest {
    /// Build the context for a request path and raw query
    pub fn new(rewriter: &RuleBasedRewriter, path: &str, raw_query: &str) -> Self {
        if let Some(webhook) = rewriter.rules().webhook_rule(path) {
            trace!(path, resource = %webhook.resource, "Webhook request");
            return Self {
                webhook: Some(webhook.clone()),
                ..Default::default()
            };
        }

        let origin = ApiEndpoint::parse(path, raw_query);
        let target = rewriter.rewrite_api_endpoint(&origin);
        Self {
            origin: Some(origin),
            target,
            webhook: None,
        }
    }

    /// Build the context for `path?query`
    pub fn from_uri(rewriter: &RuleBasedRewriter, uri: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self::new(rewriter, path, query)
    }

    pub fn origin(&self) -> Option<&ApiEndpoint> {
        self.origin.as_ref()
    }

    /// Rewritten endpoint, present only when the path or query changed
    pub fn target(&self) -> Option<&ApiEndpoint> {
        self.target.as_ref()
    }

    pub fn webhook_rule(&self) -> Option<&WebhookRule> {
        self.webhook.as_ref()
    }

    // =========================================================================
    // Forwarded Request
    // =========================================================================

    /// Path to forward the request to
    pub fn path(&self) -> String {
        if let Some(target) = &self.target {
            return target.path();
        }
        if let Some(origin) = &self.origin {
            return origin.path();
        }
        self.webhook
            .as_ref()
            .map(|webhook| webhook.path.clone())
            .unwrap_or_default()
    }

    pub fn raw_query(&self) -> &str {
        self.target
            .as_ref()
            .or(self.origin.as_ref())
            .map_or("", |endpoint| endpoint.raw_query.as_str())
    }

    /// Path with the query appended when not empty
    pub fn request_uri(&self) -> String {
        let path = self.path();
        match self.raw_query() {
            "" => path,
            query => format!("{path}?{query}"),
        }
    }

    // =========================================================================
    // Request Shape
    // =========================================================================

    pub fn is_core(&self) -> bool {
        self.origin.as_ref().is_some_and(ApiEndpoint::is_core)
    }

    pub fn is_crd(&self) -> bool {
        self.origin.as_ref().is_some_and(|origin| origin.is_crd)
    }

    pub fn is_watch(&self) -> bool {
        self.origin.as_ref().is_some_and(|origin| origin.is_watch)
    }

    pub fn is_webhook(&self) -> bool {
        self.webhook.is_some()
    }

    /// Original group of the requested resource. For CRD requests this is the
    /// group in the CRD name.
    pub fn orig_group(&self) -> &str {
        match (&self.origin, &self.webhook) {
            (Some(origin), _) if origin.is_crd => &origin.crd_group,
            (Some(origin), _) => &origin.group,
            (None, Some(webhook)) => &webhook.group,
            (None, None) => "",
        }
    }

    /// Original resource type of the request. For CRD requests this is the
    /// resource type in the CRD name.
    pub fn orig_resource_type(&self) -> &str {
        match (&self.origin, &self.webhook) {
            (Some(origin), _) if origin.is_crd => &origin.crd_resource_type,
            (Some(origin), _) => &origin.resource_type,
            (None, Some(webhook)) => &webhook.resource,
            (None, None) => "",
        }
    }

    // =========================================================================
    // Rewrite Predicates
    // =========================================================================

    /// Whether the request body should be rewritten
    pub fn should_rewrite_request(&self) -> bool {
        if self.webhook.is_some() {
            return true;
        }
        let Some(origin) = &self.origin else {
            return true;
        };
        if origin.is_root() || origin.is_unknown() {
            return false;
        }
        if self.target.is_none() {
            // Creating a CRD sends a body with the names to rename.
            if origin.resource_type == CRD_RESOURCE_TYPE && origin.name.is_empty() {
                return true;
            }
            return should_rewrite_resource(&origin.resource_type);
        }
        true
    }

    /// Whether the response body should be rewritten. A response may be
    /// passed through as is otherwise.
    pub fn should_rewrite_response(&self) -> bool {
        if self.webhook.is_some() {
            return true;
        }
        let Some(origin) = &self.origin else {
            return false;
        };
        if origin.is_root() || origin.is_unknown() {
            return false;
        }
        if origin.is_crd {
            return origin.name.is_empty() || self.target.is_some();
        }
        if self.target.is_some() {
            return true;
        }
        // Discovery
        if origin.group.is_empty() {
            return true;
        }
        should_rewrite_resource(&origin.resource_type)
    }

    /// Short resource description for log fields
    pub fn resource_for_log(&self) -> String {
        if let Some(webhook) = &self.webhook {
            return webhook.resource.clone();
        }
        let Some(origin) = &self.origin else {
            return "UNKNOWN".to_string();
        };

        match origin.kind {
            EndpointKind::Root => "ROOT".to_string(),
            EndpointKind::Unknown => "UNKNOWN".to_string(),
            EndpointKind::Core if origin.version.is_empty() => "APIVersions/core".to_string(),
            EndpointKind::Core if origin.resource_type.is_empty() => "APIResourceList/core".to_string(),
            EndpointKind::Group if origin.group.is_empty() => "APIGroupList".to_string(),
            EndpointKind::Group if origin.version.is_empty() => format!("APIGroup/{}", origin.group),
            EndpointKind::Group if origin.resource_type.is_empty() => {
                format!("APIResourceList/{}", origin.group)
            }
            EndpointKind::Core | EndpointKind::Group if !origin.subresource.is_empty() => {
                format!("{}/{}", origin.resource_type, origin.subresource)
            }
            EndpointKind::Core | EndpointKind::Group => origin.resource_type.clone(),
        }
    }
}
