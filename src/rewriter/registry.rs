//! Kind registry: routes a document to its rewrite strategy

use std::collections::HashMap;

/// Rewrite strategy for a family of kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    ApiGroupList,
    ApiGroup,
    ApiResourceList,
    ApiGroupDiscoveryList,
    AdmissionReview,
    Crd,
    MutatingWebhook,
    ValidatingWebhook,
    ClusterRole,
    Role,
    Deployment,
    StatefulSet,
    DaemonSet,
    Pod,
    PodDisruptionBudget,
    Job,
    Service,
    PersistentVolumeClaim,
    Event,
    ServiceMonitor,
    ValidatingAdmissionPolicy,
    ValidatingAdmissionPolicyBinding,
    /// Any other kind, including the renamed kinds themselves
    CustomResource,
}

impl Strategy {
    /// Discovery documents and admission envelopes have their own schema and
    /// are never dropped by exclude rules
    pub fn is_excludable(&self) -> bool {
        !matches!(
            self,
            Strategy::ApiGroupList
                | Strategy::ApiGroup
                | Strategy::ApiResourceList
                | Strategy::ApiGroupDiscoveryList
                | Strategy::AdmissionReview
        )
    }
}

/// Known kinds with their list kinds, and the resource plural used to route
/// patches. Envelopes have no resource.
const KINDS: &[(&str, &str, Option<&str>, Strategy)] = &[
    ("APIGroupList", "", None, Strategy::ApiGroupList),
    ("APIGroup", "", None, Strategy::ApiGroup),
    ("APIResourceList", "", None, Strategy::ApiResourceList),
    ("APIGroupDiscoveryList", "", None, Strategy::ApiGroupDiscoveryList),
    ("AdmissionReview", "", None, Strategy::AdmissionReview),
    (
        "CustomResourceDefinition",
        "CustomResourceDefinitionList",
        Some("customresourcedefinitions"),
        Strategy::Crd,
    ),
    (
        "MutatingWebhookConfiguration",
        "MutatingWebhookConfigurationList",
        Some("mutatingwebhookconfigurations"),
        Strategy::MutatingWebhook,
    ),
    (
        "ValidatingWebhookConfiguration",
        "ValidatingWebhookConfigurationList",
        Some("validatingwebhookconfigurations"),
        Strategy::ValidatingWebhook,
    ),
    ("ClusterRole", "ClusterRoleList", Some("clusterroles"), Strategy::ClusterRole),
    ("Role", "RoleList", Some("roles"), Strategy::Role),
    ("Deployment", "DeploymentList", Some("deployments"), Strategy::Deployment),
    ("StatefulSet", "StatefulSetList", Some("statefulsets"), Strategy::StatefulSet),
    ("DaemonSet", "DaemonSetList", Some("daemonsets"), Strategy::DaemonSet),
    ("Pod", "PodList", Some("pods"), Strategy::Pod),
    (
        "PodDisruptionBudget",
        "PodDisruptionBudgetList",
        Some("poddisruptionbudgets"),
        Strategy::PodDisruptionBudget,
    ),
    ("Job", "JobList", Some("jobs"), Strategy::Job),
    ("Service", "ServiceList", Some("services"), Strategy::Service),
    (
        "PersistentVolumeClaim",
        "PersistentVolumeClaimList",
        Some("persistentvolumeclaims"),
        Strategy::PersistentVolumeClaim,
    ),
    ("Event", "EventList", Some("events"), Strategy::Event),
    ("ServiceMonitor", "ServiceMonitorList", Some("servicemonitors"), Strategy::ServiceMonitor),
    (
        "ValidatingAdmissionPolicy",
        "ValidatingAdmissionPolicyList",
        Some("validatingadmissionpolicies"),
        Strategy::ValidatingAdmissionPolicy,
    ),
    (
        "ValidatingAdmissionPolicyBinding",
        "ValidatingAdmissionPolicyBindingList",
        Some("validatingadmissionpolicybindings"),
        Strategy::ValidatingAdmissionPolicyBinding,
    ),
];

/// Kind and resource-type lookup tables, built once
#[derive(Debug, Clone)]
pub struct KindRegistry {
    by_kind: HashMap<&'static str, Strategy>,
    by_resource: HashMap<&'static str, Strategy>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KindRegistry {
    pub fn new() -> Self {
        let mut by_kind = HashMap::new();
        let mut by_resource = HashMap::new();
        for &(kind, list_kind, resource, strategy) in KINDS {
            by_kind.insert(kind, strategy);
            if !list_kind.is_empty() {
                by_kind.insert(list_kind, strategy);
            }
            if let Some(resource) = resource {
                by_resource.insert(resource, strategy);
            }
        }
        Self {
            by_kind,
            by_resource,
        }
    }

    /// Strategy for a document kind. Unknown kinds are custom resources.
    pub fn strategy(&self, kind: &str) -> Strategy {
        self.by_kind
            .get(kind)
            .copied()
            .unwrap_or(Strategy::CustomResource)
    }

    /// Strategy for patches of a resource type, if the type is known
    pub fn strategy_for_resource(&self, resource: &str) -> Option<Strategy> {
        self.by_resource.get(resource).copied()
    }
}
