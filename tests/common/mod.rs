//! Rules shared by the integration tests
//!
//! Two original groups are served from one renamed group, so restoring has
//! to tell their resources apart.

#![allow(dead_code)]

use kube_api_rewriter::{RewriteRules, RuleBasedRewriter};

pub const RULES_YAML: &str = r#"
kindPrefix: Prefixed
resourceTypePrefix: prefixed
shortNamePrefix: p
categories: [prefixed]
rules:
  original.group.io:
    groupRule:
      group: original.group.io
      versions: [v1]
      preferredVersion: v1
      renamed: prefixed.resources.group.io
    resourceRules:
      someresources:
        kind: SomeResource
        listKind: SomeResourceList
        plural: someresources
        singular: someresource
        shortNames: [sr]
        categories: [all]
        versions: [v1]
        preferredVersion: v1
  another.group.io:
    groupRule:
      group: another.group.io
      versions: [v1]
      preferredVersion: v1
      renamed: prefixed.resources.group.io
    resourceRules:
      widgets:
        kind: Widget
        listKind: WidgetList
        plural: widgets
        singular: widget
        versions: [v1]
        preferredVersion: v1
labels:
  prefixes:
    - original: labelgroup.io
      renamed: replacedlabelgroup.io
    - original: component.labelgroup.io
      renamed: component.replacedlabelgroup.io
  names:
    - original: labelgroup.io
      renamed: replacedlabelgroup.io
annotations:
  prefixes:
    - original: annogroup.io
      renamed: replacedannogroup.io
finalizers:
  prefixes:
    - original: group.io
      renamed: prefixed.group.io
excludes:
  - kinds: [Role]
    matchNames: [role1]
"#;

pub fn rules() -> RewriteRules {
    RewriteRules::from_yaml(RULES_YAML).unwrap()
}

pub fn rewriter() -> RuleBasedRewriter {
    RuleBasedRewriter::new(rules())
}
