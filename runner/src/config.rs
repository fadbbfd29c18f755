use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error};

/// name of the directory below the repository root holding all benchmarks
pub const BENCHMARKS_DIR: &str = "benchmarks";
/// optional per benchmark file declaring variants
pub const BENCHMARK_CONFIG_FILE: &str = "benchmarks.json";
/// wildcard accepted by every selection option
pub const WILDCARD: &str = "*";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Preflight checks failed")]
    PreflightFailed,
    #[error("Package manager not supported")]
    UnsupportedPackageManager(String),
}

/// Which benchmarks to plan for, every field is either `*` or a comma separated list
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SelectionOptions {
    pub name: String,
    pub implementation: String,
    // `*` also selects benchmarks without declared variants
    pub variant: String,
    #[serde(rename = "package-version", alias = "package_versions")]
    pub package_versions: Vec<String>,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            name: WILDCARD.to_string(),
            implementation: WILDCARD.to_string(),
            variant: WILDCARD.to_string(),
            package_versions: Vec::new(),
        }
    }
}

/// split a comma separated option, `None` means wildcard (`*` anywhere in the list)
pub fn split_list(option: &str) -> Option<Vec<String>> {
    let items: Vec<String> = option
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if items.iter().any(|item| item == WILDCARD) {
        None
    } else {
        Some(items)
    }
}

/// Content of `benchmarks.json`
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct BenchmarkConfigFile {
    #[serde(default)]
    pub variants: Vec<VariantConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct VariantConfig {
    pub name: String,
    // passed through to the benchmark untouched
    #[serde(default)]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageManagerConfig {
    // Name of the package manager, see PackageManagers::load for the selection process
    #[serde(default = "default_package_manager_name")]
    pub name: String,
    #[serde(default = "default_package_manager_exec")]
    pub exec: PathBuf,
    #[serde(default = "default_package_manager_params")]
    pub params: Vec<String>,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            name: default_package_manager_name(),
            exec: default_package_manager_exec(),
            params: default_package_manager_params(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
    // defaults to <repo_root>/benchmarks/versions
    #[serde(default)]
    pub install_root: Option<PathBuf>,
    #[serde(default)]
    pub package_manager: PackageManagerConfig,
    #[serde(default)]
    pub selection: SelectionOptions,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
            install_root: None,
            package_manager: PackageManagerConfig::default(),
            selection: SelectionOptions::default(),
        }
    }
}

impl RunnerConfig {
    /// load a YAML runner config
    pub async fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigErrors::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_yaml(&content).map_err(|source| ConfigErrors::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn benchmark_root(&self) -> PathBuf {
        self.repo_root.join(BENCHMARKS_DIR)
    }

    pub fn install_root(&self) -> PathBuf {
        self.install_root
            .clone()
            .unwrap_or_else(|| self.benchmark_root().join("versions"))
    }

    /// Report every problem with the config before giving up, returns true on error.
    ///
    /// The package manager is only checked when `install` is set.
    pub async fn preflight_checks(&self, install: bool) -> bool {
        let mut contains_error = false;

        if !is_dir(&self.repo_root).await {
            error!(
                "repo_root {} is not a directory",
                self.repo_root.to_string_lossy()
            );
            contains_error = true;
        } else if !is_dir(&self.benchmark_root()).await {
            error!(
                "repo_root {} has no {BENCHMARKS_DIR} directory",
                self.repo_root.to_string_lossy()
            );
            contains_error = true;
        }

        if install {
            if self.package_manager.name.is_empty() {
                error!("package_manager.name must not be empty");
                contains_error = true;
            }

            if self.package_manager.params.is_empty() {
                error!(
                    "package_manager.params is empty, {} would not install anything",
                    self.package_manager.exec.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(install_root) = &self.install_root {
            if let Ok(metadata) = tokio::fs::metadata(install_root).await {
                if !metadata.is_dir() {
                    error!(
                        "install_root {} is not a directory",
                        install_root.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        debug!(config = ?self, "Finished preflight checks");

        contains_error
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_package_manager_name() -> String {
    "npm".to_string()
}

fn default_package_manager_exec() -> PathBuf {
    PathBuf::from("npm")
}

fn default_package_manager_params() -> Vec<String> {
    vec!["install".to_string()]
}
