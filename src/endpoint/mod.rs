//! Kubernetes API Endpoint Parsing
//!
//! Breaks a REST path into its positional parts:
//!
//! ```text
//! Core resources:
//!   /api/VERSION/RESOURCETYPE[/NAME[/SUBRESOURCE]]
//!   /api/VERSION/namespaces/NAMESPACE/RESOURCETYPE[/NAME[/SUBRESOURCE]]
//!   /api/VERSION/namespaces/NAME/status            (RESOURCETYPE=namespaces)
//!
//! Group resources:
//!   /apis/GROUP/VERSION/RESOURCETYPE[/NAME[/SUBRESOURCE]]
//!   /apis/GROUP/VERSION/namespaces/NAMESPACE/RESOURCETYPE[/NAME[/SUBRESOURCE]]
//!
//! CRDs (cluster scoped resources named RESOURCETYPE.GROUP):
//!   /apis/apiextensions.k8s.io/v1/customresourcedefinitions[/RESOURCETYPE.GROUP]
//! ```
//!
//! Parsing never fails: a path that is not an API path is marked unknown and
//! passed through as is.

pub mod selector;

use crate::error::Error;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub const CORE_PREFIX: &str = "api";
pub const APIS_PREFIX: &str = "apis";
pub const NAMESPACES: &str = "namespaces";
pub const CRD_GROUP: &str = "apiextensions.k8s.io";
pub const CRD_RESOURCE_TYPE: &str = "customresourcedefinitions";
pub const WATCH_CLAUSE: &str = "watch=true";

/// Shape of an endpoint path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointKind {
    /// Empty path
    #[default]
    Root,
    /// `/api/...`
    Core,
    /// `/apis/...`
    Group,
    /// Anything else
    Unknown,
}

/// A parsed API request path and its raw query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub kind: EndpointKind,
    pub raw_path: String,
    pub raw_query: String,

    pub prefix: String,
    pub group: String,
    pub version: String,
    pub namespace: String,
    pub resource_type: String,
    pub name: String,
    pub subresource: String,
    pub remainder: Vec<String>,

    pub is_crd: bool,
    pub crd_resource_type: String,
    pub crd_group: String,

    pub is_watch: bool,
}

impl ApiEndpoint {
    /// Parse a path and a raw query string
    pub fn parse(path: &str, raw_query: &str) -> Self {
        let cleaned = path.trim_matches('/');
        let mut endpoint = if cleaned.is_empty() {
            Self::default()
        } else {
            let mut items: Segments = cleaned.split('/').map(str::to_string).collect();
            match items.front().map(String::as_str) {
                Some(CORE_PREFIX) => parse_core(&mut items),
                Some(APIS_PREFIX) => parse_apis(&mut items),
                _ => Self {
                    kind: EndpointKind::Unknown,
                    ..Default::default()
                },
            }
        };

        endpoint.raw_path = path.to_string();
        endpoint.raw_query = raw_query.to_string();
        endpoint.is_watch = raw_query.contains(WATCH_CLAUSE);
        endpoint
    }

    pub fn is_root(&self) -> bool {
        self.kind == EndpointKind::Root
    }

    pub fn is_core(&self) -> bool {
        self.kind == EndpointKind::Core
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == EndpointKind::Unknown
    }

    /// Reassemble the path. Root, core and unknown endpoints are never
    /// rewritten and keep their raw path.
    pub fn path(&self) -> String {
        if self.kind != EndpointKind::Group {
            return self.raw_path.clone();
        }

        let namespace = if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{NAMESPACES}/{}", self.namespace)
        };
        let parts = [
            self.prefix.as_str(),
            self.group.as_str(),
            self.version.as_str(),
            namespace.as_str(),
            self.resource_type.as_str(),
            self.name.as_str(),
            self.subresource.as_str(),
        ];

        let joined = parts
            .into_iter()
            .chain(self.remainder.iter().map(String::as_str))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }

    /// Path with the query appended when not empty
    pub fn request_uri(&self) -> String {
        if self.raw_query.is_empty() {
            self.path()
        } else {
            format!("{}?{}", self.path(), self.raw_query)
        }
    }
}

impl FromStr for ApiEndpoint {
    type Err = Error;

    /// Parse `path?query`
    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Ok(Self::parse(path, query))
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request_uri())
    }
}

// =============================================================================
// State Machine
// =============================================================================

type Segments = VecDeque<String>;

/// Take the next segment. The flag is set when no segment is left afterwards.
fn shift(items: &mut Segments) -> (String, bool) {
    let first = items.pop_front().unwrap_or_default();
    (first, items.is_empty())
}

/// Reinterpret `namespaces/NAMESPACE/RESOURCETYPE` parsed as
/// `RESOURCETYPE/NAME/SUBRESOURCE`
fn reinterpret_namespaced(ae: &mut ApiEndpoint) -> bool {
    if ae.resource_type != NAMESPACES || ae.subresource == "status" {
        return false;
    }
    ae.namespace = std::mem::take(&mut ae.name);
    ae.resource_type = std::mem::take(&mut ae.subresource);
    true
}

/// Parse the part after the version, shared by core and group endpoints
fn parse_resource(ae: &mut ApiEndpoint, items: &mut Segments) {
    let (resource_type, last) = shift(items);
    ae.resource_type = resource_type;
    if ae.group == CRD_GROUP && ae.resource_type == CRD_RESOURCE_TYPE {
        ae.is_crd = true;
    }
    if last {
        return;
    }

    let (name, last) = shift(items);
    ae.name = name;
    if ae.is_crd {
        let (resource_type, group) = ae.name.split_once('.').unwrap_or((ae.name.as_str(), ""));
        ae.crd_resource_type = resource_type.to_string();
        ae.crd_group = group.to_string();
    }
    if last {
        return;
    }

    let (subresource, last) = shift(items);
    ae.subresource = subresource;
    let namespaced = reinterpret_namespaced(ae);
    if last {
        return;
    }

    if namespaced {
        let (name, last) = shift(items);
        ae.name = name;
        if last {
            return;
        }
        let (subresource, last) = shift(items);
        ae.subresource = subresource;
        if last {
            return;
        }
    }

    ae.remainder = items.drain(..).collect();
}

fn parse_core(items: &mut Segments) -> ApiEndpoint {
    let mut ae = ApiEndpoint {
        kind: EndpointKind::Core,
        ..Default::default()
    };

    let (prefix, last) = shift(items);
    ae.prefix = prefix;
    if last {
        return ae;
    }

    let (version, last) = shift(items);
    ae.version = version;
    if last {
        return ae;
    }

    parse_resource(&mut ae, items);
    ae
}

fn parse_apis(items: &mut Segments) -> ApiEndpoint {
    let mut ae = ApiEndpoint {
        kind: EndpointKind::Group,
        ..Default::default()
    };

    let (prefix, last) = shift(items);
    ae.prefix = prefix;
    if last {
        return ae;
    }

    let (group, last) = shift(items);
    ae.group = group;
    if last {
        return ae;
    }

    let (version, last) = shift(items);
    ae.version = version;
    if last {
        return ae;
    }

    parse_resource(&mut ae, items);
    ae
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_and_unknown() {
        let ae = ApiEndpoint::parse("/", "");
        assert!(ae.is_root());
        assert_eq!(ae.path(), "/");

        let ae = ApiEndpoint::parse("/healthz", "verbose=1");
        assert!(ae.is_unknown());
        assert_eq!(ae.request_uri(), "/healthz?verbose=1");
    }

    #[test]
    fn test_parse_core_paths() {
        let ae = ApiEndpoint::parse("/api/v1/namespaces/ns/pods/web/log", "");
        assert!(ae.is_core());
        assert_eq!(ae.version, "v1");
        assert_eq!(ae.namespace, "ns");
        assert_eq!(ae.resource_type, "pods");
        assert_eq!(ae.name, "web");
        assert_eq!(ae.subresource, "log");

        let ae = ApiEndpoint::parse("/api/v1/namespaces/ns/status", "");
        assert_eq!(ae.resource_type, "namespaces");
        assert_eq!(ae.name, "ns");
        assert_eq!(ae.subresource, "status");
        assert_eq!(ae.namespace, "");

        let ae = ApiEndpoint::parse("/api/v1/namespaces/ns", "");
        assert_eq!(ae.resource_type, "namespaces");
        assert_eq!(ae.name, "ns");
    }

    #[test]
    fn test_parse_group_paths() {
        let ae = ApiEndpoint::parse("/apis/original.group.io/v1/namespaces/ns/someresources/sr/status", "");
        assert_eq!(ae.kind, EndpointKind::Group);
        assert_eq!(ae.group, "original.group.io");
        assert_eq!(ae.namespace, "ns");
        assert_eq!(ae.resource_type, "someresources");
        assert_eq!(ae.name, "sr");
        assert_eq!(ae.subresource, "status");

        let ae = ApiEndpoint::parse("/apis/original.group.io/v1/someresources/sr/status/extra/more", "");
        assert_eq!(ae.name, "sr");
        assert_eq!(ae.subresource, "status");
        assert_eq!(ae.remainder, ["extra", "more"]);

        let ae = ApiEndpoint::parse("/apis/original.group.io", "");
        assert_eq!(ae.group, "original.group.io");
        assert_eq!(ae.version, "");
    }

    #[test]
    fn test_parse_crd_paths() {
        let ae = ApiEndpoint::parse("/apis/apiextensions.k8s.io/v1/customresourcedefinitions", "");
        assert!(ae.is_crd);
        assert_eq!(ae.crd_group, "");

        let ae = ApiEndpoint::parse(
            "/apis/apiextensions.k8s.io/v1/customresourcedefinitions/someresources.original.group.io",
            "",
        );
        assert!(ae.is_crd);
        assert_eq!(ae.crd_resource_type, "someresources");
        assert_eq!(ae.crd_group, "original.group.io");
    }

    #[test]
    fn test_watch_flag() {
        let ae = ApiEndpoint::parse("/api/v1/pods", "watch=true&resourceVersion=1");
        assert!(ae.is_watch);
        assert!(!ApiEndpoint::parse("/api/v1/pods", "limit=500").is_watch);
    }

    #[test]
    fn test_path_identity() {
        let paths = [
            "/",
            "/api",
            "/api/v1",
            "/api/v1/pods",
            "/api/v1/namespaces/ns/pods/web/log",
            "/apis",
            "/apis/original.group.io",
            "/apis/original.group.io/v1",
            "/apis/original.group.io/v1/someresources",
            "/apis/original.group.io/v1/someresources/sr",
            "/apis/original.group.io/v1/someresources/sr/status",
            "/apis/original.group.io/v1/namespaces/ns/someresources",
            "/apis/original.group.io/v1/namespaces/ns/someresources/sr",
            "/apis/original.group.io/v1/namespaces/ns/someresources/sr/status",
            "/apis/original.group.io/v1/someresources/sr/status/extra",
            "/apis/apiextensions.k8s.io/v1/customresourcedefinitions/someresources.original.group.io",
            "/metrics",
        ];
        for path in paths {
            assert_eq!(ApiEndpoint::parse(path, "").path(), path);
        }
    }

    #[test]
    fn test_from_str_and_clone() {
        let ae: ApiEndpoint = "/apis/original.group.io/v1/someresources?limit=1".parse().unwrap();
        assert_eq!(ae.raw_query, "limit=1");

        let mut copy = ae.clone();
        copy.group = "prefixed.resources.group.io".to_string();
        assert_eq!(ae.group, "original.group.io");
        assert_eq!(copy.to_string(), "/apis/prefixed.resources.group.io/v1/someresources?limit=1");
    }
}
