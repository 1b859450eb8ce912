//! Request targets built from client URIs

mod common;

use kube_api_rewriter::TargetRequest;

#[test]
fn test_resource_of_shared_renamed_group() {
    let rw = common::rewriter();
    let req = TargetRequest::from_uri(&rw, "/apis/another.group.io/v1/widgets?labelSelector=labelgroup.io%2Fx%3Dv");

    assert_eq!(req.orig_group(), "another.group.io");
    assert_eq!(req.orig_resource_type(), "widgets");
    assert_eq!(
        req.request_uri(),
        "/apis/prefixed.resources.group.io/v1/prefixedwidgets?labelSelector=replacedlabelgroup.io%2Fx%3Dv"
    );
    assert!(req.should_rewrite_request());
    assert!(req.should_rewrite_response());
    assert_eq!(req.resource_for_log(), "widgets");
}

#[test]
fn test_watch_request() {
    let rw = common::rewriter();
    let req = TargetRequest::from_uri(&rw, "/apis/original.group.io/v1/namespaces/ns/someresources?watch=true");
    assert!(req.is_watch());
    assert_eq!(
        req.path(),
        "/apis/prefixed.resources.group.io/v1/namespaces/ns/prefixedsomeresources"
    );
    assert_eq!(req.raw_query(), "watch=true");
}

#[test]
fn test_untouched_requests() {
    let rw = common::rewriter();

    let req = TargetRequest::from_uri(&rw, "/api/v1/namespaces/ns/configmaps/cm");
    assert!(req.target().is_none());
    assert_eq!(req.request_uri(), "/api/v1/namespaces/ns/configmaps/cm");
    assert!(req.is_core());

    let req = TargetRequest::from_uri(&rw, "/healthz");
    assert!(!req.should_rewrite_request());
    assert!(!req.should_rewrite_response());
    assert_eq!(req.resource_for_log(), "UNKNOWN");

    let req = TargetRequest::from_uri(&rw, "/apis");
    assert!(req.should_rewrite_response());
    assert_eq!(req.resource_for_log(), "APIGroupList");
}
