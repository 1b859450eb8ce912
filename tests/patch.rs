//! PATCH bodies renamed for the endpoint they are sent to

mod common;

use kube_api_rewriter::{RuleBasedRewriter, TargetRequest};
use serde_json::{json, Value};
use std::borrow::Cow;

fn rename(rw: &RuleBasedRewriter, uri: &str, patch: &Value) -> Value {
    let target = TargetRequest::from_uri(rw, uri);
    let body = serde_json::to_vec(patch).unwrap();
    let renamed = rw.rewrite_patch(&target, &body).unwrap();
    serde_json::from_slice(&renamed).unwrap()
}

#[test]
fn test_json_patch_labels_of_custom_resource() {
    let rw = common::rewriter();
    let patch = json!([
        {"op": "replace", "path": "/metadata/labels", "value": {"labelgroup.io": "v", "app": "web"}},
        {"op": "add", "path": "/metadata/labels/labelgroup.io~1x", "value": "v"},
        {"op": "remove", "path": "/metadata/annotations/annogroup.io~1revision"},
        {"op": "add", "path": "/metadata/finalizers/-", "value": "group.io/protection"},
        {"op": "replace", "path": "/spec/size", "value": 5}
    ]);

    let renamed = rename(&rw, "/apis/another.group.io/v1/widgets/w", &patch);
    assert_eq!(
        renamed,
        json!([
            {"op": "replace", "path": "/metadata/labels", "value": {"replacedlabelgroup.io": "v", "app": "web"}},
            {"op": "add", "path": "/metadata/labels/replacedlabelgroup.io~1x", "value": "v"},
            {"op": "remove", "path": "/metadata/annotations/replacedannogroup.io~1revision"},
            {"op": "add", "path": "/metadata/finalizers/-", "value": "prefixed.group.io/protection"},
            {"op": "replace", "path": "/spec/size", "value": 5}
        ])
    );
}

#[test]
fn test_merge_patch_of_core_resource() {
    let rw = common::rewriter();
    let patch = json!({
        "metadata": {
            "labels": {"component.labelgroup.io/tier": "db", "obsolete": null},
            "ownerReferences": [{"apiVersion": "original.group.io/v1", "kind": "SomeResource", "name": "owner", "uid": "1"}]
        }
    });

    let renamed = rename(&rw, "/api/v1/namespaces/ns/configmaps/cm", &patch);
    assert_eq!(
        renamed["metadata"]["labels"],
        json!({"component.replacedlabelgroup.io/tier": "db", "obsolete": null})
    );
    assert_eq!(renamed["metadata"]["ownerReferences"][0]["apiVersion"], "prefixed.resources.group.io/v1");
    assert_eq!(renamed["metadata"]["ownerReferences"][0]["kind"], "PrefixedSomeResource");
}

#[test]
fn test_crd_status_patch() {
    let rw = common::rewriter();
    let patch = json!([
        {"op": "replace", "path": "/status/acceptedNames/kind", "value": "SomeResource"},
        {"op": "replace", "path": "/status/acceptedNames/plural", "value": "someresources"}
    ]);

    let renamed = rename(
        &rw,
        "/apis/apiextensions.k8s.io/v1/customresourcedefinitions/someresources.original.group.io/status",
        &patch,
    );
    assert_eq!(renamed[0]["value"], "PrefixedSomeResource");
    assert_eq!(renamed[1]["value"], "prefixedsomeresources");
}

#[test]
fn test_unrelated_patch_is_borrowed() {
    let rw = common::rewriter();
    let target = TargetRequest::from_uri(&rw, "/apis/apps/v1/namespaces/ns/deployments/web/scale");
    let body = br#"{"spec":{"replicas":3}}"#;
    let renamed = rw.rewrite_patch(&target, body).unwrap();
    assert!(matches!(renamed, Cow::Borrowed(_)));

    // Neither a JSON object nor an array of operations
    let body = b"replicas=3";
    let renamed = rw.rewrite_patch(&target, body).unwrap();
    assert_eq!(&renamed[..], &body[..]);
}
