//! Kubernetes API Rewriter
//!
//! Command-line harness around the rewriter library: reads one document from
//! stdin, rewrites it with a rules file and writes the result to stdout.
//!
//! ```text
//! kube-api-rewriter --rules rules.yaml --action restore < response.json
//! kube-api-rewriter --rules rules.yaml --path '/apis/original.group.io/v1/someresources/a' --patch < patch.json
//! kube-api-rewriter --rules rules.yaml --action restore --watch < events.jsonl
//! ```
//!
//! Logs go to stderr. When a document cannot be rewritten the input is
//! written unchanged and the exit code is non-zero.

use anyhow::Context;
use clap::Parser;
use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kube_api_rewriter::{
    Action, Payload, RewriteMetrics, RewriteRules, RuleBasedRewriter, TargetRequest,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Kubernetes API Rewriter - rename and restore API groups, kinds and metadata
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rules file (YAML or JSON)
    #[arg(long, env = "RULES_FILE")]
    rules: PathBuf,

    /// Rewrite direction (rename, restore)
    #[arg(long, env = "ACTION", default_value = "rename")]
    action: Action,

    /// Request URI (path and query) the document belongs to
    #[arg(long, env = "REQUEST_PATH")]
    path: Option<String>,

    /// Treat the input as a PATCH body (always renamed)
    #[arg(long, env = "PATCH", conflicts_with = "watch")]
    patch: bool,

    /// Treat the input as a newline-delimited watch event stream
    #[arg(long)]
    watch: bool,

    /// Print rewrite metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!(
        version = kube_api_rewriter::VERSION,
        rules = %args.rules.display(),
        action = %args.action,
        "Starting {}",
        kube_api_rewriter::NAME
    );

    let metrics = Arc::new(RewriteMetrics::new()?);
    let rewriter = RuleBasedRewriter::new(load_rules(&args.rules)?).with_metrics(metrics.clone());

    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .context("failed to read document from stdin")?;

    let target = args
        .path
        .as_deref()
        .map(|uri| TargetRequest::from_uri(&rewriter, uri))
        .unwrap_or_default();
    if args.path.is_some() {
        info!(
            uri = %target.request_uri(),
            resource = %target.resource_for_log(),
            rewrite_request = target.should_rewrite_request(),
            rewrite_response = target.should_rewrite_response(),
            "Request target"
        );
    }

    let mut stdout = io::stdout().lock();
    let code = match rewrite(&rewriter, &args, &target, &input) {
        Ok(Some(output)) => {
            stdout.write_all(&output)?;
            ExitCode::SUCCESS
        }
        Ok(None) => {
            debug!("Document excluded, nothing written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, malformed = e.is_malformed_input(), "Rewrite failed, passing input through");
            stdout.write_all(&input)?;
            ExitCode::FAILURE
        }
    };
    stdout.flush()?;

    if args.print_metrics {
        eprint!("{}", metrics.gather_text()?);
    }
    Ok(code)
}

/// Rewrite the input as selected by the flags. `None` means excluded.
fn rewrite<'a>(
    rewriter: &RuleBasedRewriter,
    args: &Args,
    target: &TargetRequest,
    input: &'a [u8],
) -> kube_api_rewriter::Result<Option<Cow<'a, [u8]>>> {
    if args.patch {
        return rewriter.rewrite_patch(target, input).map(Some);
    }
    if args.watch {
        return rewriter
            .rewrite_watch_stream(input, args.action)
            .map(|output| Some(Cow::Owned(output)));
    }
    let payload = match args.action {
        Action::Restore if args.path.is_some() => rewriter.rewrite_response(target, input)?,
        action => rewriter.rewrite_json_payload(input, action)?,
    };
    match payload {
        Payload::Bytes(bytes) => Ok(Some(bytes)),
        Payload::Skip => Ok(None),
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn load_rules(path: &Path) -> anyhow::Result<RewriteRules> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;

    let rules = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => RewriteRules::from_json(&content)?,
        _ => RewriteRules::from_yaml(&String::from_utf8_lossy(&content))?,
    };
    rules
        .validate()
        .with_context(|| format!("invalid rules in {}", path.display()))?;
    Ok(rules)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries the rewritten document
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}
