use crate::versions::{parse_package_versions, PackageVersion, VersionError, DEFAULT_LABEL};
use std::collections::BTreeMap;

#[test]
pub fn parses_overrides() {
    let versions = parse_package_versions(&["lit/next=a@1.0,b@2.0"]).unwrap();
    let lit = &versions["lit"];

    assert_eq!(lit.len(), 1);
    assert_eq!(lit[0].label, "next");
    assert_eq!(
        lit[0].dependency_overrides,
        BTreeMap::from([
            ("a".to_string(), "1.0".to_string()),
            ("b".to_string(), "2.0".to_string())
        ])
    );
}

#[test]
pub fn parses_default() {
    let versions = parse_package_versions(&["lit/default"]).unwrap();

    assert_eq!(versions["lit"], vec![PackageVersion::default_version()]);
    assert_eq!(versions["lit"][0].label, DEFAULT_LABEL);
}

#[test]
pub fn keeps_flag_order_per_implementation() {
    let versions = parse_package_versions(&[
        "lit/zeta=a@1",
        "preact/x=b@2",
        "lit/default",
        "lit/alpha=a@2",
    ])
    .unwrap();

    let labels: Vec<_> = versions["lit"].iter().map(|v| v.label.as_str()).collect();
    assert_eq!(labels, ["zeta", "default", "alpha"]);
    assert_eq!(versions["preact"].len(), 1);
}

#[test]
pub fn no_implicit_default() {
    assert!(parse_package_versions::<&str>(&[]).unwrap().is_empty());
}

#[test]
pub fn scoped_package() {
    let versions = parse_package_versions(&["lit/scoped=@lit/reactive-element@1.2.3"]).unwrap();

    assert_eq!(
        versions["lit"][0].dependency_overrides["@lit/reactive-element"],
        "1.2.3"
    );
}

#[test]
pub fn duplicate_label() {
    assert_eq!(
        parse_package_versions(&["lit/next=a@1", "lit/next=a@2"]),
        Err(VersionError::DuplicateLabel {
            implementation: "lit".to_string(),
            label: "next".to_string()
        })
    );
}

#[test]
pub fn same_label_different_implementations() {
    let versions = parse_package_versions(&["lit/next=a@1", "preact/next=a@2"]).unwrap();

    assert_eq!(versions.len(), 2);
}

#[test]
pub fn different_labels_same_implementation() {
    assert!(parse_package_versions(&["lit/one=a@1", "lit/two=a@2"]).is_ok());
}

#[test]
pub fn repeated_default_is_not_a_duplicate() {
    let versions = parse_package_versions(&["lit/default", "lit/default"]).unwrap();

    assert_eq!(versions["lit"].len(), 2);
}

#[test]
pub fn malformed_flags() {
    for flag in [
        "bad-flag",
        "/next=a@1",
        "lit/next",
        "lit/=a@1",
        "lit/next=",
        "lit/next=a",
        "lit/next=a@",
        "lit/next=@1",
        "lit/next=a@1,",
        "lit/next=a@1,a@2",
        "lit/default=a@1",
    ] {
        assert!(
            matches!(
                parse_package_versions(&[flag]),
                Err(VersionError::Parse { .. })
            ),
            "{flag} should not parse"
        );
    }
}

#[test]
pub fn error_leaves_no_partial_result() {
    assert!(matches!(
        parse_package_versions(&["lit/next=a@1", "bad-flag"]),
        Err(VersionError::Parse { .. })
    ));
}
