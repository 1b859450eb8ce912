//! Kubernetes API Rewriter
//!
//! A bidirectional, rule-driven rewriter for Kubernetes REST API traffic. It
//! serves resources of one naming scheme ("original") from a prefixed naming
//! scheme ("renamed") without either side knowing about the translation.
//!
//! # Architecture
//!
//! ```text
//!  client (original names)                              API server (renamed names)
//!          │                                                      ▲
//!          │  path, query ──► TargetRequest ──► rewritten path ───┤
//!          │  body        ──► RuleBasedRewriter (Rename) ─────────┤
//!          │                                                      │
//!          ◄──────────────── RuleBasedRewriter (Restore) ◄────────┘
//!                                   │
//!            ┌──────────────────────┼──────────────────────┐
//!            │                      │                      │
//!     ┌──────┴──────┐     ┌─────────┴────────┐    ┌────────┴────────┐
//!     │ KindRegistry│     │ Per-kind         │    │ Name rewriter   │
//!     │  (routing)  │     │ strategies       │    │ (labels, annos, │
//!     └─────────────┘     │ (rewriter::*)    │    │  finalizers)    │
//!                         └─────────┬────────┘    └────────┬────────┘
//!                                   │                      │
//!                         ┌─────────┴──────────────────────┴───────┐
//!                         │  RuleSet (indexed rules) + transform   │
//!                         └────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`rules`]: Rewrite configuration and its compiled, indexed form
//! - [`transform`]: Path-addressed operations over JSON documents
//! - [`names`]: Label, annotation and finalizer name rewriting
//! - [`endpoint`]: API path parsing and label selector queries
//! - [`rewriter`]: Document routing and per-kind strategies
//! - [`target_request`]: Per-request rewrite context
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod names;
pub mod rewriter;
pub mod rules;
pub mod target_request;
pub mod transform;

// Re-export commonly used types
pub use endpoint::{ApiEndpoint, EndpointKind};

pub use error::{Error, Result};

pub use metrics::RewriteMetrics;

pub use names::PrefixedNameRewriter;

pub use rewriter::{KindRegistry, Payload, RuleBasedRewriter, Strategy};

pub use rules::{
    Action, ApiGroupRule, ExcludeRule, GroupRule, MetadataReplace, MetadataReplaceRule,
    ResourceRule, RewriteRules, RuleSet, WebhookRule,
};

pub use target_request::TargetRequest;

pub use transform::{PatchKind, Verdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
