//! Events: references to the objects an event is about

use super::metadata::rewrite_reference;
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

/// `involvedObject` and `related` of core/v1 events, `regarding` and
/// `related` of events.k8s.io/v1 events
const REFERENCES: [&str; 3] = ["involvedObject", "related", "regarding"];

pub fn rewrite(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |event| {
        for path in REFERENCES {
            transform::transform_object(event, path, |reference| {
                rewrite_reference(rules, reference, "apiVersion", action)?;
                Ok(())
            })?;
        }
        Ok(Verdict::Keep)
    })?;
    Ok(())
}
