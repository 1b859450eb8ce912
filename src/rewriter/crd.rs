//! CustomResourceDefinitions
//!
//! A CRD declares the names of a resource, so renaming it renames the
//! resource type itself:
//!
//! ```text
//! .metadata.name     someresources.original.group.io -> prefixedsomeresources.prefixed.resources.group.io
//! .spec.group        original.group.io -> prefixed.resources.group.io
//! .spec.names        (also .status.acceptedNames)
//!    kind            SomeResource -> PrefixedSomeResource
//!    listKind        SomeResourceList -> PrefixedSomeResourceList
//!    plural          someresources -> prefixedsomeresources
//!    singular        someresource -> prefixedsomeresource
//!    shortNames      [sr srs] -> [psr psrs]
//!    categories      [all] -> [prefixed]
//! ```
//!
//! Name fields are only written where present, so partial CRDs in patches
//! stay partial.

use crate::error::{Error, Result};
use crate::rules::{Action, GroupRule, ResourceRule, RuleSet};
use crate::transform::{self, Verdict};
use serde_json::Value;

pub fn rewrite(rules: &RuleSet, doc: &mut Value, action: Action) -> Result<()> {
    transform::rewrite_resource_or_list(doc, |crd| {
        match action {
            Action::Rename => rename_crd(rules, crd)?,
            Action::Restore => restore_crd(rules, crd)?,
        }
        Ok(Verdict::Keep)
    })?;
    Ok(())
}

/// Split a CRD name into resource type and group
fn split_crd_name(crd: &Value) -> Result<Option<(String, String)>> {
    let name = transform::get_str(crd, "metadata.name");
    if name.is_empty() {
        return Ok(None);
    }
    match name.split_once('.') {
        Some((resource, group)) => Ok(Some((resource.to_string(), group.to_string()))),
        None => Err(Error::MalformedCrdName {
            name: name.to_string(),
        }),
    }
}

fn rename_crd(rules: &RuleSet, crd: &mut Value) -> Result<()> {
    let Some((resource, group)) = split_crd_name(crd)? else {
        return Ok(());
    };
    let Some((group_rule, resource_rule)) = rules.resource_rules(&group, &resource) else {
        return Ok(());
    };

    let name = format!("{}.{}", rules.rename_resource(&resource), group_rule.renamed);
    transform::set(crd, "metadata.name", Value::String(name))?;
    transform::transform_object(crd, "spec", |spec| {
        rename_crd_spec(rules, group_rule, resource_rule, spec)
    })?;
    transform::transform_object(crd, "status.acceptedNames", |names| {
        rename_names(rules, resource_rule, names)
    })
}

fn restore_crd(rules: &RuleSet, crd: &mut Value) -> Result<()> {
    let Some((resource, group)) = split_crd_name(crd)? else {
        return Ok(());
    };
    // CRDs outside the renamed groups are not ours.
    if !rules.is_renamed_group(&group) {
        return Ok(());
    }
    let Some((group_rule, resource_rule)) = rules.restored_resource_rules(&group, &resource) else {
        return Ok(());
    };

    let name = format!("{}.{}", resource_rule.plural, group_rule.group);
    transform::set(crd, "metadata.name", Value::String(name))?;
    transform::transform_object(crd, "spec", |spec| {
        set_if_present(spec, "group", || Value::String(group_rule.group.clone()))?;
        transform::transform_object(spec, "names", |names| {
            restore_names(rules, resource_rule, names)
        })
    })?;
    transform::transform_object(crd, "status.acceptedNames", |names| {
        restore_names(rules, resource_rule, names)
    })
}

/// Rename `group` and `names` of a CRD spec, which may be partial
fn rename_crd_spec(
    rules: &RuleSet,
    group_rule: &GroupRule,
    resource_rule: &ResourceRule,
    spec: &mut Value,
) -> Result<()> {
    set_if_present(spec, "group", || Value::String(group_rule.renamed.clone()))?;
    transform::transform_object(spec, "names", |names| {
        rename_names(rules, resource_rule, names)
    })
}

/// Rename a partial CRD sent as a patch. The request path names the CRD, so
/// the rules are known up front.
pub fn rename_crd_patch(
    rules: &RuleSet,
    group_rule: &GroupRule,
    resource_rule: &ResourceRule,
    patch: &mut Value,
) -> Result<()> {
    transform::transform_object(patch, "spec", |spec| {
        rename_crd_spec(rules, group_rule, resource_rule, spec)
    })?;
    transform::transform_object(patch, "status.acceptedNames", |names| {
        rename_names(rules, resource_rule, names)
    })
}

fn rename_names(rules: &RuleSet, rule: &ResourceRule, names: &mut Value) -> Result<()> {
    set_if_present(names, "kind", || rules.rename_kind(&rule.kind).into())?;
    set_if_present(names, "listKind", || rules.rename_kind(&rule.list_kind).into())?;
    set_if_present(names, "plural", || rules.rename_resource(&rule.plural).into())?;
    set_if_present(names, "singular", || rules.rename_resource(&rule.singular).into())?;
    set_if_present(names, "shortNames", || {
        rule.short_names
            .iter()
            .map(|short| rules.rename_short_name(short))
            .collect::<Vec<_>>()
            .into()
    })?;
    set_if_present(names, "categories", || {
        rules.rename_categories(&rule.categories).into()
    })
}

fn restore_names(rules: &RuleSet, rule: &ResourceRule, names: &mut Value) -> Result<()> {
    set_if_present(names, "kind", || rule.kind.clone().into())?;
    set_if_present(names, "listKind", || rule.list_kind.clone().into())?;
    set_if_present(names, "plural", || rule.plural.clone().into())?;
    set_if_present(names, "singular", || rule.singular.clone().into())?;
    set_if_present(names, "shortNames", || rule.short_names.clone().into())?;
    set_if_present(names, "categories", || {
        rules.restore_categories(Some(rule)).into()
    })
}

fn set_if_present(obj: &mut Value, key: &str, value: impl FnOnce() -> Value) -> Result<()> {
    if obj.get(key).is_some() {
        transform::set(obj, key, value())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::rules::fixtures::test_rule_set;
    use serde_json::json;

    fn crd() -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "someresources.original.group.io"},
            "spec": {
                "group": "original.group.io",
                "names": {
                    "kind": "SomeResource",
                    "listKind": "SomeResourceList",
                    "plural": "someresources",
                    "singular": "someresource",
                    "shortNames": ["sr", "srs"],
                    "categories": ["all"]
                },
                "scope": "Namespaced"
            },
            "status": {
                "acceptedNames": {"kind": "SomeResource", "plural": "someresources"}
            }
        })
    }

    #[test]
    fn test_rename_crd() {
        let rules = test_rule_set();
        let mut doc = crd();
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc["metadata"]["name"], "prefixedsomeresources.prefixed.resources.group.io");
        assert_eq!(doc["spec"]["group"], "prefixed.resources.group.io");
        assert_eq!(
            doc["spec"]["names"],
            json!({
                "kind": "PrefixedSomeResource",
                "listKind": "PrefixedSomeResourceList",
                "plural": "prefixedsomeresources",
                "singular": "prefixedsomeresource",
                "shortNames": ["psr", "psrs"],
                "categories": ["prefixed"]
            })
        );
        assert_eq!(
            doc["status"]["acceptedNames"],
            json!({"kind": "PrefixedSomeResource", "plural": "prefixedsomeresources"})
        );
    }

    #[test]
    fn test_restore_crd_round_trip() {
        let rules = test_rule_set();
        let mut doc = crd();
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        rewrite(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(doc, crd());
    }

    #[test]
    fn test_crd_without_rules_untouched() {
        let rules = test_rule_set();
        let original = json!({
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "spec": {"group": "example.com", "names": {"kind": "Widget"}}
        });
        let mut doc = original.clone();
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        rewrite(&rules, &mut doc, Action::Restore).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_crd_list() {
        let rules = test_rule_set();
        let mut doc = json!({"kind": "CustomResourceDefinitionList", "items": [crd()]});
        rewrite(&rules, &mut doc, Action::Rename).unwrap();
        assert_eq!(doc["items"][0]["spec"]["names"]["kind"], "PrefixedSomeResource");
    }

    #[test]
    fn test_rename_partial_crd_patch() {
        let rules = test_rule_set();
        let (group_rule, resource_rule) = rules.resource_rules("original.group.io", "someresources").unwrap();
        let mut patch = json!({"spec": {"names": {"shortNames": ["sr"]}}});
        rename_crd_patch(&rules, group_rule, resource_rule, &mut patch).unwrap();
        assert_eq!(patch, json!({"spec": {"names": {"shortNames": ["psr", "psrs"]}}}));
    }

    #[test]
    fn test_malformed_crd_name() {
        let rules = test_rule_set();
        let mut doc = json!({"kind": "CustomResourceDefinition", "metadata": {"name": "nodots"}});
        let err = rewrite(&rules, &mut doc, Action::Rename).unwrap_err();
        assert_matches!(err, Error::MalformedCrdName { .. });
    }
}
