//! PATCH request bodies
//!
//! Patches only travel toward the API server, so they are only renamed.
//!
//! A merge patch (strategic or not) is a partial object and goes through the
//! same handlers as a full object. A JSON patch is a list of operations, each
//! addressing one location:
//!
//! ```text
//! {"op": "add", "path": "/metadata/labels/labelgroup.io~1x", "value": "v"}
//!
//!   embed     {"metadata": {"labels": {"labelgroup.io/x": "v"}}}
//!   rewrite   {"metadata": {"labels": {"replacedlabelgroup.io/x": "v"}}}
//!   extract   path /metadata/labels/replacedlabelgroup.io~1x, value "v"
//! ```
//!
//! The operation value is embedded into a partial document at its path, the
//! document is rewritten and the value is read back. A map key renamed by the
//! rewrite is carried over into the pointer.

use super::crd;
use super::custom_resource;
use super::metadata::rewrite_metadata;
use super::registry::Strategy;
use super::RuleBasedRewriter;
use crate::error::{Error, Result};
use crate::metrics::Operation;
use crate::rules::{Action, RuleSet};
use crate::target_request::TargetRequest;
use crate::transform::{self, JsonPointer, PatchKind, Verdict, ROOT};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, trace};

/// Rewrites one partial document
pub type PatchHandler<'a> = dyn Fn(&mut Value) -> Result<()> + 'a;

impl RuleBasedRewriter {
    /// Rename a PATCH body sent to the endpoint of `target`
    ///
    /// The original resource type of the request decides how the body is
    /// read. A body of an unknown dialect is returned as is.
    pub fn rewrite_patch<'a>(&self, target: &TargetRequest, body: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let started = Instant::now();
        let rules = self.rules();
        let resource_type = target.orig_resource_type();

        let result = if let Some((group_rule, resource_rule)) =
            rules.resource_rules(target.orig_group(), resource_type)
        {
            if target.is_crd() {
                trace!(resource = %resource_type, "Renaming CRD patch");
                rewrite_patch_body(body, &|doc: &mut Value| {
                    crd::rename_crd_patch(rules, group_rule, resource_rule, doc)?;
                    rewrite_metadata(rules, doc, Action::Rename)
                })
            } else {
                trace!(resource = %resource_type, "Renaming custom resource patch");
                rewrite_patch_body(body, &|doc: &mut Value| {
                    custom_resource::rewrite(rules, doc, Action::Rename)?;
                    rewrite_metadata(rules, doc, Action::Rename)
                })
            }
        } else {
            match self.registry.strategy_for_resource(resource_type) {
                Some(strategy) if has_patch_strategy(strategy) => {
                    trace!(resource = %resource_type, ?strategy, "Renaming patch");
                    rewrite_patch_body(body, &|doc: &mut Value| {
                        strategy.apply(self, doc, Action::Rename)?;
                        rewrite_metadata(rules, doc, Action::Rename)
                    })
                }
                _ => rename_metadata_patch(rules, body),
            }
        };

        self.observe(Operation::Patch, Action::Rename, &result, started);
        result
    }
}

/// Kinds whose own fields are patched by clients, besides metadata
fn has_patch_strategy(strategy: Strategy) -> bool {
    matches!(
        strategy,
        Strategy::Service
            | Strategy::Deployment
            | Strategy::StatefulSet
            | Strategy::DaemonSet
            | Strategy::Job
            | Strategy::Pod
            | Strategy::PersistentVolumeClaim
            | Strategy::PodDisruptionBudget
            | Strategy::MutatingWebhook
            | Strategy::ValidatingWebhook
    )
}

/// Rename labels, annotations, finalizers and owner references in a patch
pub fn rename_metadata_patch<'a>(rules: &RuleSet, body: &'a [u8]) -> Result<Cow<'a, [u8]>> {
    rewrite_patch_body(body, &|doc: &mut Value| rewrite_metadata(rules, doc, Action::Rename))
}

/// Apply `handler` to a patch body of either dialect
///
/// Returns the input bytes when nothing changed.
pub fn rewrite_patch_body<'a>(body: &'a [u8], handler: &PatchHandler<'_>) -> Result<Cow<'a, [u8]>> {
    let kind = PatchKind::detect(body);
    if kind == PatchKind::Unknown {
        return Ok(Cow::Borrowed(body));
    }

    let original: Value = serde_json::from_slice(body)?;
    let mut doc = original.clone();
    match kind {
        PatchKind::Merge => handler(&mut doc)?,
        PatchKind::Json => transform::map_array(&mut doc, ROOT, |operation| {
            rewrite_operation(operation, handler)?;
            Ok(Verdict::Keep)
        })?,
        PatchKind::Unknown => {}
    }

    if doc == original {
        return Ok(Cow::Borrowed(body));
    }
    Ok(Cow::Owned(serde_json::to_vec(&doc)?))
}

// =============================================================================
// JSON Patch Operations
// =============================================================================

fn rewrite_operation(operation: &mut Value, handler: &PatchHandler<'_>) -> Result<()> {
    if !operation.is_object() {
        return Err(Error::MalformedPatch("operation is not an object".to_string()));
    }

    let pointer: JsonPointer = transform::get_str(operation, "path").parse()?;
    let value = operation.get("value").cloned();
    if let Some(rewritten) = rewrite_location(&pointer, value.as_ref(), handler)? {
        if rewritten.pointer != pointer {
            transform::set(operation, "path", Value::String(rewritten.pointer.to_string()))?;
        }
        if let (Some(old), Some(new)) = (value, rewritten.value) {
            if old != new {
                transform::set(operation, "value", new)?;
            }
        }
    }

    // "move" and "copy" read from a second location.
    let from = transform::get_str(operation, "from");
    if !from.is_empty() {
        let pointer: JsonPointer = from.parse()?;
        if let Some(rewritten) = rewrite_location(&pointer, None, handler)? {
            if rewritten.pointer != pointer {
                transform::set(operation, "from", Value::String(rewritten.pointer.to_string()))?;
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
struct Location {
    pointer: JsonPointer,
    value: Option<Value>,
}

/// Rewrite the location addressed by `pointer` and the value stored there
///
/// Without a value, an empty string stands in so that the addressed key is
/// still seen by the handler. `None` means the location was left as is.
fn rewrite_location(
    pointer: &JsonPointer,
    value: Option<&Value>,
    handler: &PatchHandler<'_>,
) -> Result<Option<Location>> {
    let Some((last, parents)) = pointer.tokens().split_last() else {
        // The whole document is replaced.
        let Some(value) = value else {
            return Ok(None);
        };
        let mut doc = value.clone();
        handler(&mut doc)?;
        return Ok(Some(Location {
            pointer: pointer.clone(),
            value: Some(doc),
        }));
    };

    let leaf = value.cloned().unwrap_or_else(|| Value::String(String::new()));
    let mut doc = embed(pointer.tokens(), leaf);
    if let Err(err) = handler(&mut doc) {
        // Pointers into arrays of unknown shape can embed into a document
        // the handler does not accept.
        if err.is_malformed_input() {
            debug!(path = %pointer, error = %err, "Patch operation left as is");
            return Ok(None);
        }
        return Err(err);
    }

    let Some(parent) = descend(&doc, parents) else {
        return Ok(None);
    };
    let mut rewritten = pointer.clone();
    let new_leaf = if JsonPointer::is_index(last) {
        parent.as_array().and_then(|items| items.first())
    } else {
        match parent.as_object() {
            Some(obj) if obj.len() == 1 => obj.iter().next().map(|(key, leaf)| {
                if key != last {
                    if let Some(token) = rewritten.tokens_mut().last_mut() {
                        *token = key.clone();
                    }
                }
                leaf
            }),
            Some(obj) => obj.get(last),
            None => None,
        }
    };

    let Some(new_leaf) = new_leaf else {
        return Ok(None);
    };
    Ok(Some(Location {
        pointer: rewritten,
        value: value.map(|_| new_leaf.clone()),
    }))
}

/// Build the smallest document holding `leaf` at `tokens`
fn embed(tokens: &[String], leaf: Value) -> Value {
    tokens.iter().rev().fold(leaf, |inner, token| {
        if JsonPointer::is_index(token) {
            Value::Array(vec![inner])
        } else {
            let mut obj = Map::new();
            obj.insert(token.clone(), inner);
            Value::Object(obj)
        }
    })
}

/// Follow `tokens` through a document built by [`embed`]
fn descend<'a>(doc: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    tokens.iter().try_fold(doc, |cur, token| {
        if JsonPointer::is_index(token) {
            cur.as_array()?.first()
        } else {
            cur.as_object()?.get(token)
        }
    })
}
