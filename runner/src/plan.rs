pub mod fs;

use crate::specs::{BenchmarkSpec, SpecUrl};
use fs::{find_ancestor_with, DiskFs, Filesystem};
use indexmap::{map::Entry, IndexMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, instrument};

/// package manifest looked up for every non default spec
pub const MANIFEST_FILE: &str = "package.json";
/// directory the package manager installs dependencies into
pub const DEPENDENCY_DIR: &str = "node_modules";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Benchmark {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("No package.json found in {0:?} or any parent directory")]
    ManifestNotFound(PathBuf),
    #[error("Invalid manifest {path:?}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PlanError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Manifest written into every install directory
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct NpmPackageJson {
    pub private: bool,
    pub dependencies: BTreeMap<String, String>,
}

/// A content addressed dependency installation
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NpmInstall {
    pub install_dir: PathBuf,
    pub package_json: NpmPackageJson,
}

/// Serve `disk_path` below `url_path`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    pub url_path: String,
    pub disk_path: PathBuf,
}

/// Specs that can be served together, with everything needed to serve them
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerPlan {
    pub specs: Vec<BenchmarkSpec>,
    pub npm_installs: Vec<NpmInstall>,
    pub mount_points: Vec<MountPoint>,
}

// the implementation is redundant next to manifest_dir in practice, it is kept (and
// hashed into the install directory) to never merge installs of different implementations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstallKey {
    manifest_dir: PathBuf,
    implementation: String,
    label: String,
}

#[derive(Debug)]
struct InstallGroup {
    specs: Vec<BenchmarkSpec>,
    dependencies: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// Group `specs` into server plans using the real filesystem.
///
/// The benchmark root is canonicalized and the install root made absolute first,
/// so the manifest search reaches the filesystem root and install directory
/// names do not depend on how the roots were spelled.
pub async fn make_server_plans(
    benchmark_root: &Path,
    install_root: &Path,
    specs: &[BenchmarkSpec],
) -> Result<Vec<ServerPlan>, PlanError> {
    let benchmark_root = tokio::fs::canonicalize(benchmark_root)
        .await
        .map_err(PlanError::io(benchmark_root))?;
    let install_root = std::path::absolute(install_root).map_err(PlanError::io(install_root))?;

    make_server_plans_with(&DiskFs, &benchmark_root, &install_root, specs).await
}

/// Group `specs` into server plans, both roots are expected to be absolute.
///
/// Default version specs share one plan without installs, every other spec is
/// grouped by the directory of its nearest manifest and its version label.
/// Plans come out as: the default plan (if any), then install plans in the order
/// their first spec appeared.
#[instrument(skip(fs, specs), level = "debug")]
pub async fn make_server_plans_with<F: Filesystem>(
    fs: &F,
    benchmark_root: &Path,
    install_root: &Path,
    specs: &[BenchmarkSpec],
) -> Result<Vec<ServerPlan>, PlanError> {
    let mut default_specs = Vec::new();
    let mut groups: IndexMap<InstallKey, InstallGroup> = IndexMap::new();

    for spec in specs {
        if let SpecUrl::Remote { url } = &spec.url {
            debug!(url = url.as_str(), "Skipped remote spec");
            continue;
        }

        if spec.version.is_default() {
            default_specs.push(spec.clone());
            continue;
        }

        let path = spec.path(benchmark_root);
        let kind = fs
            .entry_kind(&path)
            .await
            .map_err(PlanError::io(&path))?
            .ok_or_else(|| PlanError::NotFound(path.clone()))?;

        let manifest_dir = find_ancestor_with(fs, &path, kind, MANIFEST_FILE)
            .await
            .map_err(PlanError::io(&path))?
            .ok_or_else(|| {
                error!(path = ?path, "No manifest found for benchmark");

                PlanError::ManifestNotFound(path.clone())
            })?;

        let mut dependencies = read_dependencies(fs, &manifest_dir).await?;
        // overrides win over the manifest
        dependencies.extend(spec.version.dependency_overrides.clone());

        let key = InstallKey {
            manifest_dir,
            implementation: spec.implementation.clone(),
            label: spec.version.label.clone(),
        };

        match groups.entry(key) {
            Entry::Occupied(mut entry) => {
                debug_assert_eq!(
                    entry.get().dependencies,
                    dependencies,
                    "specs of one install key must agree on dependencies"
                );
                entry.get_mut().specs.push(spec.clone());
            }
            Entry::Vacant(entry) => {
                debug!(key = ?entry.key(), "New install group");
                entry.insert(InstallGroup {
                    specs: vec![spec.clone()],
                    dependencies,
                });
            }
        }
    }

    let mut plans = Vec::with_capacity(groups.len() + 1);

    if !default_specs.is_empty() {
        plans.push(ServerPlan {
            specs: default_specs,
            npm_installs: Vec::new(),
            mount_points: vec![root_mount(benchmark_root)],
        });
    }

    for (key, group) in groups {
        let install_dir = install_root.join(install_dir_name(
            &key.manifest_dir,
            &key.implementation,
            &key.label,
        ));

        plans.push(ServerPlan {
            specs: group.specs,
            npm_installs: vec![NpmInstall {
                install_dir: install_dir.clone(),
                package_json: NpmPackageJson {
                    private: true,
                    dependencies: group.dependencies,
                },
            }],
            mount_points: vec![
                MountPoint {
                    url_path: dependency_url_path(benchmark_root, &key.manifest_dir),
                    disk_path: install_dir.join(DEPENDENCY_DIR),
                },
                root_mount(benchmark_root),
            ],
        });
    }

    debug!("Grouped {} specs into {} plans", specs.len(), plans.len());

    Ok(plans)
}

async fn read_dependencies<F: Filesystem>(
    fs: &F,
    manifest_dir: &Path,
) -> Result<BTreeMap<String, String>, PlanError> {
    let path = manifest_dir.join(MANIFEST_FILE);
    let content = fs
        .read_to_string(&path)
        .await
        .map_err(PlanError::io(&path))?;

    serde_json::from_str::<PackageManifest>(&content)
        .map(|manifest| manifest.dependencies)
        .map_err(|source| PlanError::InvalidManifest { path, source })
}

fn root_mount(benchmark_root: &Path) -> MountPoint {
    MountPoint {
        url_path: "/".to_string(),
        disk_path: benchmark_root.to_path_buf(),
    }
}

/// Stable hex name of the install directory of one install key
pub fn install_dir_name(manifest_dir: &Path, implementation: &str, label: &str) -> String {
    let identity =
        serde_json::json!([manifest_dir.to_string_lossy(), implementation, label]).to_string();

    hex::encode(Sha256::digest(identity.as_bytes()))
}

/// URL the dependency directory of `manifest_dir` is served under.
///
/// Manifests above the benchmark root resolve against `/`, the way a POSIX path
/// join of `/` and `..` does.
pub fn dependency_url_path(benchmark_root: &Path, manifest_dir: &Path) -> String {
    fn normal(path: &Path) -> Vec<Component<'_>> {
        path.components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect_vec()
    }

    let base = normal(benchmark_root);
    let target = normal(manifest_dir);
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();

    for component in &target[common..] {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::ParentDir => {
                segments.pop();
            }
            _ => {}
        }
    }

    format!(
        "/{}",
        segments
            .iter()
            .map(String::as_str)
            .chain([DEPENDENCY_DIR])
            .join("/")
    )
}
