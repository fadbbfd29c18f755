use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, error};

/// label reserved for "use the dependencies the repository already installed"
pub const DEFAULT_LABEL: &str = "default";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid package version flag {flag:?}: {reason}")]
    Parse { flag: String, reason: &'static str },
    #[error("Package version label {label:?} is used more than once for {implementation}")]
    DuplicateLabel {
        implementation: String,
        label: String,
    },
}

/// A set of dependency overrides for one implementation, identified by `label`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub label: String,
    pub dependency_overrides: BTreeMap<String, String>,
}

impl PackageVersion {
    /// the implicit version used when an implementation has no overrides
    pub fn default_version() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            dependency_overrides: BTreeMap::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.label == DEFAULT_LABEL
    }
}

/// map of implementation -> versions, in the order the flags were given
pub type VersionMap = BTreeMap<String, Vec<PackageVersion>>;

/// Parse `<implementation>/default` and
/// `<implementation>/<label>=<pkg>@<version>[,<pkg>@<version>]*` flags.
///
/// Nothing is returned unless every flag is valid.
pub fn parse_package_versions<S: AsRef<str>>(flags: &[S]) -> Result<VersionMap, VersionError> {
    let mut versions = VersionMap::new();
    let mut seen = BTreeSet::new();

    for flag in flags.iter().map(AsRef::as_ref) {
        let (implementation, version) = parse_flag(flag)?;

        if !version.is_default() && !seen.insert((implementation.to_string(), version.label.clone()))
        {
            error!(flag = flag, "Duplicate package version label");

            return Err(VersionError::DuplicateLabel {
                implementation: implementation.to_string(),
                label: version.label,
            });
        }

        debug!(
            implementation = implementation,
            label = version.label.as_str(),
            "Parsed package version"
        );
        versions
            .entry(implementation.to_string())
            .or_default()
            .push(version);
    }

    Ok(versions)
}

fn parse_flag(flag: &str) -> Result<(&str, PackageVersion), VersionError> {
    let invalid = |reason| VersionError::Parse {
        flag: flag.to_string(),
        reason,
    };

    let (implementation, rest) = flag
        .split_once('/')
        .ok_or_else(|| invalid("expected <implementation>/<label>"))?;

    if implementation.is_empty() {
        return Err(invalid("implementation is empty"));
    }

    if rest == DEFAULT_LABEL {
        return Ok((implementation, PackageVersion::default_version()));
    }

    let (label, packages) = rest
        .split_once('=')
        .ok_or_else(|| invalid("expected <label>=<pkg>@<version>[,<pkg>@<version>]*"))?;

    if label.is_empty() {
        return Err(invalid("label is empty"));
    }
    if label == DEFAULT_LABEL {
        return Err(invalid("the default label cannot carry overrides"));
    }

    let mut dependency_overrides = BTreeMap::new();

    for package in packages.split(',') {
        // split on the last `@` so scoped packages (`@scope/pkg@1.0`) keep their prefix
        let (name, version) = package
            .rsplit_once('@')
            .filter(|(name, version)| !name.is_empty() && !version.is_empty())
            .ok_or_else(|| invalid("expected <pkg>@<version>"))?;

        if dependency_overrides
            .insert(name.to_string(), version.to_string())
            .is_some()
        {
            return Err(invalid("package listed more than once"));
        }
    }

    Ok((
        implementation,
        PackageVersion {
            label: label.to_string(),
            dependency_overrides,
        },
    ))
}
