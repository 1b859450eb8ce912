//! AdmissionReview envelopes
//!
//! The API server sends reviews of renamed objects to webhooks that only
//! know the original names, and the webhooks answer with patches written
//! against original names:
//!
//! ```text
//! request   (API server -> webhook)  restore kind, resource, object, oldObject
//! response  (webhook -> API server)  rename the base64 JSON patch
//! ```
//!
//! The direction is decided by which half of the envelope is present.

use super::patch::rename_metadata_patch;
use super::RuleBasedRewriter;
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::borrow::Cow;
use tracing::trace;

/// The only patch type admission responses may carry
const JSON_PATCH: &str = "JSONPatch";

pub fn rewrite(rw: &RuleBasedRewriter, doc: &mut Value) -> Result<()> {
    if transform::get(doc, "response").is_some_and(|response| !response.is_null()) {
        return transform::transform_object(doc, "response", |response| {
            rename_response_patch(rw.rules(), response)
        });
    }
    transform::transform_object(doc, "request", |request| restore_request(rw, request))
}

fn rename_response_patch(rules: &RuleSet, response: &mut Value) -> Result<()> {
    if transform::get_str(response, "patchType") != JSON_PATCH {
        return Ok(());
    }
    let encoded = transform::get_str(response, "patch");
    if encoded.is_empty() {
        return Ok(());
    }

    let patch = STANDARD.decode(encoded)?;
    if let Cow::Owned(renamed) = rename_metadata_patch(rules, &patch)? {
        transform::set(response, "patch", Value::String(STANDARD.encode(renamed)))?;
    }
    Ok(())
}

fn restore_request(rw: &RuleBasedRewriter, request: &mut Value) -> Result<()> {
    let rules = rw.rules();
    // Reviews for groups that are not renamed are not ours.
    if !rules.is_renamed_group(transform::get_str(request, "resource.group")) {
        return Ok(());
    }
    trace!(uid = %transform::get_str(request, "uid"), "Restoring admission request");

    for key in ["resource", "requestResource"] {
        transform::transform_object(request, key, |resource| restore_group_resource(rules, resource))?;
    }

    // Reviews of status and scale carry no renamed kinds.
    if !transform::get_str(request, "subResource").is_empty() {
        return Ok(());
    }

    for key in ["kind", "requestKind"] {
        transform::transform_object(request, key, |kind| {
            super::metadata::rewrite_reference(rules, kind, "group", Action::Restore)?;
            Ok(())
        })?;
    }
    for key in ["object", "oldObject"] {
        transform::transform_object(request, key, |obj| rw.rewrite_unfiltered(obj, Action::Restore))?;
    }
    Ok(())
}

/// Restore a `{group, version, resource}`
fn restore_group_resource(rules: &RuleSet, resource: &mut Value) -> Result<()> {
    let group = transform::get_str(resource, "group");
    if !rules.is_renamed_group(group) {
        return Ok(());
    }
    let name = transform::get_str(resource, "resource");
    let restored_group = match rules.restored_resource_rules(group, name) {
        Some((group_rule, _)) => group_rule.group.clone(),
        None => rules.restore_api_version(group),
    };
    let restored_name = rules.restore_resource(name);

    transform::set(resource, "group", Value::String(restored_group))?;
    transform::set(resource, "resource", Value::String(restored_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures::test_rules;
    use serde_json::json;

    fn review_request() -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "prefixed.resources.group.io", "version": "v1", "kind": "PrefixedSomeResource"},
                "resource": {"group": "prefixed.resources.group.io", "version": "v1", "resource": "prefixedsomeresources"},
                "requestKind": {"group": "prefixed.resources.group.io", "version": "v1", "kind": "PrefixedSomeResource"},
                "requestResource": {"group": "prefixed.resources.group.io", "version": "v1", "resource": "prefixedsomeresources"},
                "name": "a",
                "namespace": "ns",
                "operation": "UPDATE",
                "object": {
                    "apiVersion": "prefixed.resources.group.io/v1",
                    "kind": "PrefixedSomeResource",
                    "metadata": {"name": "a", "labels": {"replacedlabelgroup.io/app": "web"}}
                },
                "oldObject": null
            }
        })
    }

    #[test]
    fn test_restore_request() {
        let rw = RuleBasedRewriter::new(test_rules());
        let mut doc = review_request();
        rewrite(&rw, &mut doc).unwrap();

        let request = &doc["request"];
        assert_eq!(request["kind"], json!({"group": "original.group.io", "version": "v1", "kind": "SomeResource"}));
        assert_eq!(
            request["resource"],
            json!({"group": "original.group.io", "version": "v1", "resource": "someresources"})
        );
        assert_eq!(request["requestKind"]["kind"], "SomeResource");
        assert_eq!(request["requestResource"]["resource"], "someresources");
        assert_eq!(
            request["object"],
            json!({
                "apiVersion": "original.group.io/v1",
                "kind": "SomeResource",
                "metadata": {"name": "a", "labels": {"labelgroup.io/app": "web"}}
            })
        );
        assert_eq!(request["oldObject"], Value::Null);
    }

    #[test]
    fn test_subresource_request_keeps_kinds() {
        let rw = RuleBasedRewriter::new(test_rules());
        let mut doc = review_request();
        doc["request"]["subResource"] = json!("status");
        rewrite(&rw, &mut doc).unwrap();
        assert_eq!(doc["request"]["resource"]["resource"], "someresources");
        assert_eq!(doc["request"]["kind"]["kind"], "PrefixedSomeResource");
    }

    #[test]
    fn test_foreign_request_untouched() {
        let rw = RuleBasedRewriter::new(test_rules());
        let original = json!({
            "kind": "AdmissionReview",
            "request": {
                "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
                "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
                "object": {"metadata": {"labels": {"replacedlabelgroup.io/app": "web"}}}
            }
        });
        let mut doc = original.clone();
        rewrite(&rw, &mut doc).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_rename_response_patch() {
        let rw = RuleBasedRewriter::new(test_rules());
        let patch = r#"[{"op":"add","path":"/metadata/labels/labelgroup.io~1app","value":"web"}]"#;
        let mut doc = json!({
            "kind": "AdmissionReview",
            "response": {"uid": "u", "allowed": true, "patchType": "JSONPatch", "patch": STANDARD.encode(patch)}
        });
        rewrite(&rw, &mut doc).unwrap();

        let decoded = STANDARD.decode(doc["response"]["patch"].as_str().unwrap()).unwrap();
        let renamed: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(
            renamed,
            json!([{"op": "add", "path": "/metadata/labels/replacedlabelgroup.io~1app", "value": "web"}])
        );
    }

    #[test]
    fn test_response_without_patch() {
        let rw = RuleBasedRewriter::new(test_rules());
        let original = json!({"kind": "AdmissionReview", "response": {"uid": "u", "allowed": false}});
        let mut doc = original.clone();
        rewrite(&rw, &mut doc).unwrap();
        assert_eq!(doc, original);

        let mut doc = json!({"response": {"patchType": "JSONPatch", "patch": "not base64!"}});
        assert!(rewrite(&rw, &mut doc).is_err());
    }
}
