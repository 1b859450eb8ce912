//! Rule-Based Rewriter
//!
//! Routes JSON documents to per-kind strategies and applies the metadata
//! rules every object shares.
//!
//! # Pipeline
//!
//! ```text
//!   bytes ──► parse ──► exclude filter ──► kind strategy ──► metadata pass ──► bytes
//!                       (restore only)     (KindRegistry)    (labels, annotations,
//!                                                             finalizers, owners)
//! ```
//!
//! A document that comes out equal to its input is answered with the input
//! bytes. An error anywhere aborts the whole document; callers serve the
//! original bytes in that case.

pub mod admission;
pub mod crd;
pub mod custom_resource;
pub mod discovery;
pub mod endpoint;
pub mod events;
pub mod metadata;
pub mod patch;
pub mod policy;
pub mod rbac;
pub mod registry;
pub mod webhook;
pub mod workload;

pub use registry::{KindRegistry, Strategy};

use crate::error::Result;
use crate::metrics::{Operation, Outcome, RewriteMetrics};
use crate::rules::{Action, RewriteRules, RuleSet};
use crate::target_request::TargetRequest;
use crate::transform::{self, Verdict};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Watch event type of progress notifications without a real object
pub const BOOKMARK: &str = "BOOKMARK";

// =============================================================================
// Payload
// =============================================================================

/// Result of rewriting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Rewritten bytes, or the input bytes when nothing changed
    Bytes(Cow<'a, [u8]>),
    /// The document is hidden from the client
    Skip,
}

impl<'a> Payload<'a> {
    pub fn is_skip(&self) -> bool {
        matches!(self, Payload::Skip)
    }

    /// Whether the bytes differ from the input
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Payload::Bytes(Cow::Owned(_)))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Skip => None,
        }
    }

    pub fn into_owned(self) -> Payload<'static> {
        match self {
            Payload::Bytes(bytes) => Payload::Bytes(Cow::Owned(bytes.into_owned())),
            Payload::Skip => Payload::Skip,
        }
    }
}

/// Classifies rewrite results for metrics
pub(crate) trait RewriteOutcome {
    fn outcome(&self) -> Outcome;
}

impl RewriteOutcome for Payload<'_> {
    fn outcome(&self) -> Outcome {
        match self {
            Payload::Skip => Outcome::Skipped,
            Payload::Bytes(bytes) => bytes.outcome(),
        }
    }
}

impl RewriteOutcome for Cow<'_, [u8]> {
    fn outcome(&self) -> Outcome {
        match self {
            Cow::Borrowed(_) => Outcome::Unchanged,
            Cow::Owned(_) => Outcome::Rewritten,
        }
    }
}

// =============================================================================
// Strategy Dispatch
// =============================================================================

impl Strategy {
    /// Rewrite the kind-specific fields of a document or list
    pub fn apply(self, rw: &RuleBasedRewriter, doc: &mut Value, action: Action) -> Result<()> {
        let rules = rw.rules();
        match self {
            Strategy::ApiGroupList => discovery::restore_api_group_list(rules, doc, action),
            Strategy::ApiGroup => discovery::restore_api_group(rules, doc, action),
            Strategy::ApiResourceList => discovery::restore_api_resource_list(rules, doc, action),
            Strategy::ApiGroupDiscoveryList => {
                discovery::restore_api_group_discovery_list(rules, doc, action)
            }
            Strategy::AdmissionReview => admission::rewrite(rw, doc),
            Strategy::Crd => crd::rewrite(rules, doc, action),
            Strategy::MutatingWebhook | Strategy::ValidatingWebhook => webhook::rewrite(rules, doc, action),
            Strategy::ClusterRole => rbac::rewrite_cluster_role(rules, doc, action),
            Strategy::Role => rbac::rewrite_role(rules, doc, action),
            Strategy::Deployment | Strategy::DaemonSet | Strategy::Job => {
                workload::rewrite_controller(rules, doc, action)
            }
            Strategy::StatefulSet => workload::rewrite_stateful_set(rules, doc, action),
            Strategy::Pod => workload::rewrite_pod(rules, doc, action),
            Strategy::Service => workload::rewrite_service(rules, doc, action),
            Strategy::PersistentVolumeClaim => workload::rewrite_persistent_volume_claim(rules, doc, action),
            Strategy::PodDisruptionBudget | Strategy::ServiceMonitor => {
                workload::rewrite_selector_only(rules, doc, action)
            }
            Strategy::Event => events::rewrite(rules, doc, action),
            Strategy::ValidatingAdmissionPolicy => policy::rewrite_policy(rules, doc, action),
            Strategy::ValidatingAdmissionPolicyBinding => policy::rewrite_binding(rules, doc, action),
            Strategy::CustomResource => custom_resource::rewrite(rules, doc, action),
        }
    }
}

// =============================================================================
// Rewriter
// =============================================================================

/// Rewrites API traffic according to a rule set
///
/// Immutable after construction; share it by reference or `Arc` between
/// request handlers.
#[derive(Debug, Clone)]
pub struct RuleBasedRewriter {
    rules: Arc<RuleSet>,
    registry: KindRegistry,
    metrics: Option<Arc<RewriteMetrics>>,
}

impl RuleBasedRewriter {
    /// Compile the rules
    pub fn new(rules: RewriteRules) -> Self {
        let rules = RuleSet::new(rules);
        info!(
            groups = rules.rules().rules.len(),
            webhooks = rules.rules().webhooks.len(),
            "Rewriter initialized"
        );
        Self {
            rules: Arc::new(rules),
            registry: KindRegistry::new(),
            metrics: None,
        }
    }

    /// Record every rewrite in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<RewriteMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Option<&RewriteMetrics> {
        self.metrics.as_deref()
    }

    pub(crate) fn observe<T: RewriteOutcome>(
        &self,
        operation: Operation,
        action: Action,
        result: &Result<T>,
        started: Instant,
    ) {
        let outcome = match result {
            Ok(value) => value.outcome(),
            Err(err) => {
                debug!(operation = operation.as_str(), %action, error = %err, "Rewrite failed");
                Outcome::Error
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe(operation, &action.to_string(), outcome, started.elapsed());
        }
    }

    // =========================================================================
    // Payloads
    // =========================================================================

    /// Rewrite a JSON request or response body
    pub fn rewrite_json_payload<'a>(&self, body: &'a [u8], action: Action) -> Result<Payload<'a>> {
        let started = Instant::now();
        let result = self.rewrite_bytes(body, action, |doc| self.rewrite_value(doc, action));
        self.observe(Operation::Payload, action, &result, started);
        result
    }

    /// Restore a response body for `target`
    ///
    /// Discovery of a renamed group shared by several original groups is
    /// restored to the original group the client asked for.
    pub fn rewrite_response<'a>(&self, target: &TargetRequest, body: &'a [u8]) -> Result<Payload<'a>> {
        let started = Instant::now();
        let action = Action::Restore;
        let requested = Some(target.orig_group()).filter(|group| self.rules.has_group(group));
        let result = self.rewrite_bytes(body, action, |doc| {
            match (self.registry.strategy(transform::get_str(doc, "kind")), requested) {
                (Strategy::ApiResourceList, Some(group)) => {
                    trace!(group, "Restoring resource list of requested group");
                    discovery::restore_api_resource_list_as(&self.rules, doc, Some(group))?;
                    Ok(Verdict::Keep)
                }
                (Strategy::ApiGroup, Some(group)) => {
                    discovery::restore_api_group_as(&self.rules, doc, Some(group))?;
                    Ok(Verdict::Keep)
                }
                _ => self.rewrite_value(doc, action),
            }
        });
        self.observe(Operation::Payload, action, &result, started);
        result
    }

    fn rewrite_bytes<'a>(
        &self,
        body: &'a [u8],
        action: Action,
        rewrite: impl FnOnce(&mut Value) -> Result<Verdict>,
    ) -> Result<Payload<'a>> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Payload::Bytes(Cow::Borrowed(body)));
        }

        let original: Value = serde_json::from_slice(body)?;
        let mut doc = original.clone();
        if rewrite(&mut doc)? == Verdict::Skip {
            debug!(%action, kind = %transform::get_str(&original, "kind"), "Document excluded");
            return Ok(Payload::Skip);
        }

        if doc == original {
            return Ok(Payload::Bytes(Cow::Borrowed(body)));
        }
        Ok(Payload::Bytes(Cow::Owned(serde_json::to_vec(&doc)?)))
    }

    /// Rewrite a parsed document in place
    ///
    /// Returns [`Verdict::Skip`] when the whole document is excluded; list
    /// items are excluded by removing them.
    pub fn rewrite_value(&self, doc: &mut Value, action: Action) -> Result<Verdict> {
        let kind = transform::get_str(doc, "kind").to_string();
        let strategy = self.registry.strategy(&kind);

        if action == Action::Restore
            && strategy.is_excludable()
            && self.filter_excludes(doc, &kind)? == Verdict::Skip
        {
            return Ok(Verdict::Skip);
        }

        self.dispatch(doc, strategy, action)?;
        Ok(Verdict::Keep)
    }

    /// Rewrite a document without exclusion, as embedded objects are
    pub fn rewrite_unfiltered(&self, doc: &mut Value, action: Action) -> Result<()> {
        let strategy = self.registry.strategy(transform::get_str(doc, "kind"));
        self.dispatch(doc, strategy, action)
    }

    /// Drop excluded items from a list, or report the whole document as
    /// excluded. List items are matched by the singular kind.
    pub fn filter_excludes(&self, doc: &mut Value, kind: &str) -> Result<Verdict> {
        if self.rules.should_exclude(doc, kind) {
            return Ok(Verdict::Skip);
        }

        let Some(item_kind) = kind.strip_suffix("List") else {
            return Ok(Verdict::Keep);
        };
        if transform::get(doc, "items").is_some_and(Value::is_array) {
            transform::map_array(doc, "items", |item| {
                if self.rules.should_exclude(item, item_kind) {
                    trace!(kind = item_kind, name = %transform::get_str(item, "metadata.name"), "Item excluded");
                    return Ok(Verdict::Skip);
                }
                Ok(Verdict::Keep)
            })?;
        }
        Ok(Verdict::Keep)
    }

    fn dispatch(&self, doc: &mut Value, strategy: Strategy, action: Action) -> Result<()> {
        trace!(?strategy, %action, "Rewriting document");
        strategy.apply(self, doc, action)?;

        transform::rewrite_resource_or_list(doc, |obj| {
            metadata::rewrite_metadata(&self.rules, obj, action)?;
            Ok(Verdict::Keep)
        })?;
        Ok(())
    }

    // =========================================================================
    // Watch Events
    // =========================================================================

    /// Restore `apiVersion` and `kind` of a bookmark object, which carries
    /// nothing else worth rewriting
    pub fn restore_bookmark(&self, obj: &mut Value) -> Result<()> {
        metadata::rewrite_reference(&self.rules, obj, "apiVersion", Action::Restore)?;
        Ok(())
    }

    /// Rewrite one `{"type": ..., "object": ...}` watch event
    pub fn rewrite_watch_event<'a>(&self, body: &'a [u8], action: Action) -> Result<Payload<'a>> {
        let started = Instant::now();
        let result = self.rewrite_bytes(body, action, |event| {
            let is_bookmark = transform::get_str(event, "type") == BOOKMARK;
            let mut verdict = Verdict::Keep;
            transform::transform_object(event, "object", |obj| {
                if is_bookmark {
                    if action == Action::Restore {
                        self.restore_bookmark(obj)?;
                    }
                    return Ok(());
                }
                verdict = self.rewrite_value(obj, action)?;
                Ok(())
            })?;
            Ok(verdict)
        });
        self.observe(Operation::WatchEvent, action, &result, started);
        result
    }

    /// Rewrite a newline-delimited stream of watch events, leaving out
    /// excluded ones
    pub fn rewrite_watch_stream(&self, body: &[u8], action: Action) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(body.len());
        for line in body.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if let Payload::Bytes(bytes) = self.rewrite_watch_event(line, action)? {
                out.extend_from_slice(&bytes);
                out.push(b'\n');
            }
        }
        Ok(out)
    }
}
