//! Workloads and other built-in kinds that select objects by label
//!
//! Controllers, services and disruption budgets find renamed objects by
//! their labels, so every selector and pod template follows the label rules.

use super::metadata::{rewrite_label_selector, rewrite_match_expressions, rewrite_metadata_at, rewrite_reference};
use crate::error::Result;
use crate::rules::{Action, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

const POD_AFFINITY_KINDS: [&str; 2] = ["podAffinity", "podAntiAffinity"];

fn for_each_object(
    doc: &mut Value,
    mut f: impl FnMut(&mut Value) -> Result<()>,
) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |obj| {
        f(obj)?;
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

// =============================================================================
// Pod Templates
// =============================================================================

/// Rewrite node selectors, affinity terms and topology spread constraints of
/// the pod spec at `path`
pub fn rewrite_pod_spec(rules: &RuleSet, obj: &mut Value, path: &str, action: Action) -> Result<()> {
    let labels = rules.labels();
    let at = |suffix: &str| transform::join(path, suffix);

    transform::transform_map(obj, &at("nodeSelector"), |selector| {
        labels.rewrite_map(selector, action)
    })?;

    let node_affinity = at("affinity.nodeAffinity");
    rewrite_match_expressions(
        labels,
        obj,
        &transform::join(
            &node_affinity,
            "requiredDuringSchedulingIgnoredDuringExecution.nodeSelectorTerms[].matchExpressions",
        ),
        action,
    )?;
    rewrite_match_expressions(
        labels,
        obj,
        &transform::join(
            &node_affinity,
            "preferredDuringSchedulingIgnoredDuringExecution[].preference.matchExpressions",
        ),
        action,
    )?;

    for kind in POD_AFFINITY_KINDS {
        let affinity = at(&format!("affinity.{kind}"));
        rewrite_label_selector(
            rules,
            obj,
            &transform::join(&affinity, "requiredDuringSchedulingIgnoredDuringExecution[].labelSelector"),
            action,
        )?;
        rewrite_label_selector(
            rules,
            obj,
            &transform::join(
                &affinity,
                "preferredDuringSchedulingIgnoredDuringExecution[].podAffinityTerm.labelSelector",
            ),
            action,
        )?;
    }

    rewrite_label_selector(rules, obj, &at("topologySpreadConstraints[].labelSelector"), action)
}

/// Rewrite `spec.selector` and the pod template of a controller
pub fn rewrite_spec_template(rules: &RuleSet, obj: &mut Value, action: Action) -> Result<()> {
    rewrite_label_selector(rules, obj, "spec.selector", action)?;
    rewrite_metadata_at(rules, obj, "spec.template.metadata", action)?;
    rewrite_pod_spec(rules, obj, "spec.template.spec", action)
}

// =============================================================================
// Strategies
// =============================================================================

/// Deployments, DaemonSets and Jobs
pub fn rewrite_controller(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| rewrite_spec_template(rules, obj, action))
}

pub fn rewrite_stateful_set(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| {
        rewrite_spec_template(rules, obj, action)?;
        transform::transform_object(obj, "spec.volumeClaimTemplates[]", |template| {
            rewrite_metadata_at(rules, template, "metadata", action)?;
            rewrite_persistent_volume_claim_spec(rules, template, action)
        })
    })
}

pub fn rewrite_pod(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| rewrite_pod_spec(rules, obj, "spec", action))
}

pub fn rewrite_service(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| {
        transform::transform_map(obj, "spec.selector", |selector| {
            rules.labels().rewrite_map(selector, action)
        })
    })
}

pub fn rewrite_persistent_volume_claim(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| rewrite_persistent_volume_claim_spec(rules, obj, action))
}

fn rewrite_persistent_volume_claim_spec(rules: &RuleSet, obj: &mut Value, action: Action) -> Result<()> {
    rewrite_label_selector(rules, obj, "spec.selector", action)?;
    for source in ["spec.dataSource", "spec.dataSourceRef"] {
        transform::transform_object(obj, source, |reference| {
            rewrite_reference(rules, reference, "apiGroup", action)?;
            Ok(())
        })?;
    }
    Ok(())
}

/// PodDisruptionBudgets and ServiceMonitors: a single `spec.selector`
pub fn rewrite_selector_only(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    for_each_object(doc, |obj| rewrite_label_selector(rules, obj, "spec.selector", action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures::test_rule_set;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"labelgroup.io/app": "web"}},
            "spec": {
                "selector": {"matchLabels": {"labelgroup.io/app": "web"}},
                "template": {
                    "metadata": {
                        "labels": {"labelgroup.io/app": "web"},
                        "annotations": {"annogroup.io/restartedAt": "now"}
                    },
                    "spec": {
                        "nodeSelector": {"labelgroup.io/node": "true"},
                        "affinity": {
                            "nodeAffinity": {
                                "requiredDuringSchedulingIgnoredDuringExecution": {
                                    "nodeSelectorTerms": [{"matchExpressions": [
                                        {"key": "labelgroup.io/zone", "operator": "In", "values": ["a"]}
                                    ]}]
                                },
                                "preferredDuringSchedulingIgnoredDuringExecution": [
                                    {"weight": 1, "preference": {"matchExpressions": [
                                        {"key": "labelgroup.io", "operator": "In", "values": ["some-value"]}
                                    ]}}
                                ]
                            },
                            "podAntiAffinity": {
                                "requiredDuringSchedulingIgnoredDuringExecution": [
                                    {"topologyKey": "kubernetes.io/hostname", "labelSelector": {"matchLabels": {"labelgroup.io/app": "web"}}}
                                ],
                                "preferredDuringSchedulingIgnoredDuringExecution": [
                                    {"weight": 10, "podAffinityTerm": {"labelSelector": {"matchLabels": {"labelgroup.io/app": "web"}}}}
                                ]
                            }
                        },
                        "topologySpreadConstraints": [
                            {"maxSkew": 1, "labelSelector": {"matchLabels": {"labelgroup.io/app": "web"}}}
                        ],
                        "containers": [{"name": "app", "image": "app:1"}]
                    }
                }
            }
        })
    }

    #[test]
    fn test_rename_deployment() {
        let rules = test_rule_set();
        let mut doc = deployment();
        rewrite_controller(&rules, &mut doc, Action::Rename).unwrap();

        let spec = &doc["spec"];
        let pod = &spec["template"]["spec"];
        assert_eq!(spec["selector"]["matchLabels"], json!({"replacedlabelgroup.io/app": "web"}));
        assert_eq!(spec["template"]["metadata"]["labels"], json!({"replacedlabelgroup.io/app": "web"}));
        assert_eq!(
            spec["template"]["metadata"]["annotations"],
            json!({"replacedannogroup.io/restartedAt": "now"})
        );
        assert_eq!(pod["nodeSelector"], json!({"replacedlabelgroup.io/node": "true"}));
        assert_eq!(
            pod["affinity"]["nodeAffinity"]["requiredDuringSchedulingIgnoredDuringExecution"]["nodeSelectorTerms"][0]
                ["matchExpressions"][0]["key"],
            "replacedlabelgroup.io/zone"
        );
        assert_eq!(
            pod["affinity"]["nodeAffinity"]["preferredDuringSchedulingIgnoredDuringExecution"][0]["preference"]
                ["matchExpressions"][0],
            json!({"key": "replacedlabelgroup.io", "operator": "In", "values": ["some-value-renamed"]})
        );
        assert_eq!(
            pod["affinity"]["podAntiAffinity"]["preferredDuringSchedulingIgnoredDuringExecution"][0]["podAffinityTerm"]
                ["labelSelector"]["matchLabels"],
            json!({"replacedlabelgroup.io/app": "web"})
        );
        assert_eq!(
            pod["topologySpreadConstraints"][0]["labelSelector"]["matchLabels"],
            json!({"replacedlabelgroup.io/app": "web"})
        );
        assert_eq!(pod["containers"], deployment()["spec"]["template"]["spec"]["containers"]);
        // Top-level metadata belongs to the universal pass.
        assert_eq!(doc["metadata"], deployment()["metadata"]);
    }

    #[test]
    fn test_deployment_round_trip() {
        let rules = test_rule_set();
        let mut doc = json!({"kind": "DeploymentList", "items": [deployment()]});
        rewrite_controller(&rules, &mut doc, Action::Rename).unwrap();
        rewrite_controller(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(doc["items"][0], deployment());
    }

    #[test]
    fn test_stateful_set_claim_templates() {
        let rules = test_rule_set();
        let mut doc = json!({
            "kind": "StatefulSet",
            "spec": {
                "volumeClaimTemplates": [{
                    "metadata": {"name": "data", "labels": {"labelgroup.io/volume": "data"}},
                    "spec": {"dataSourceRef": {"apiGroup": "original.group.io", "kind": "SomeResource", "name": "snap"}}
                }]
            }
        });
        rewrite_stateful_set(&rules, &mut doc, Action::Rename).unwrap();
        let template = &doc["spec"]["volumeClaimTemplates"][0];
        assert_eq!(template["metadata"]["labels"], json!({"replacedlabelgroup.io/volume": "data"}));
        assert_eq!(
            template["spec"]["dataSourceRef"],
            json!({"apiGroup": "prefixed.resources.group.io", "kind": "PrefixedSomeResource", "name": "snap"})
        );
    }

    #[test]
    fn test_service_selector_is_a_map() {
        let rules = test_rule_set();
        let mut doc = json!({"kind": "Service", "spec": {"selector": {"labelgroup.io/app": "web"}, "ports": []}});
        rewrite_service(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc["spec"]["selector"], json!({"replacedlabelgroup.io/app": "web"}));
    }

    #[test]
    fn test_pvc_data_source() {
        let rules = test_rule_set();
        let original = json!({
            "kind": "PersistentVolumeClaim",
            "spec": {
                "dataSource": {"apiGroup": "snapshot.storage.k8s.io", "kind": "VolumeSnapshot", "name": "s"},
                "dataSourceRef": {"apiGroup": "other.group.io", "kind": "OtherResource", "name": "o"}
            }
        });
        let mut doc = original.clone();
        rewrite_persistent_volume_claim(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc["spec"]["dataSource"], original["spec"]["dataSource"]);
        assert_eq!(doc["spec"]["dataSourceRef"]["apiGroup"], "other.prefixed.resources.group.io");
        rewrite_persistent_volume_claim(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(doc, original);
    }
}
