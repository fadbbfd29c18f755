use crate::{
    config::{
        split_list, BenchmarkConfigFile, SelectionOptions, BENCHMARKS_DIR, BENCHMARK_CONFIG_FILE,
    },
    versions::{parse_package_versions, PackageVersion, VersionError},
};
use itertools::iproduct;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashSet},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Top level names that are never implementations or benchmarks
pub static RESERVED_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "node_modules",
        "package.json",
        "package-lock.json",
        "common",
        "versions",
    ])
});

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("{0:?} is a reserved name and cannot be used as an implementation or benchmark")]
    ReservedName(String),
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid benchmark config {path:?}: {source}")]
    InvalidBenchmarkConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Version(#[from] VersionError),
}

impl ExpandError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the runner finds a benchmark
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpecUrl {
    /// served from `<benchmark root>/<implementation>/<name>`
    Local,
    /// served by someone else, no server or install needed
    Remote { url: String },
}

/// One runnable benchmark instance
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BenchmarkSpec {
    pub name: String,
    pub implementation: String,
    pub variant: String,
    pub version: PackageVersion,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub url: SpecUrl,
}

impl BenchmarkSpec {
    /// on disk location of a local spec
    pub fn path(&self, benchmark_root: &Path) -> PathBuf {
        benchmark_root.join(&self.implementation).join(&self.name)
    }

    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.name.as_str(),
            self.variant.as_str(),
            self.implementation.as_str(),
            self.version.label.as_str(),
        )
    }
}

/// Expand the selection options against `<repo_root>/benchmarks` into a sorted list of specs.
///
/// Overlapping explicit lists are not deduplicated.
#[instrument(skip(options), level = "debug")]
pub async fn specs_from_opts(
    repo_root: &Path,
    options: &SelectionOptions,
) -> Result<Vec<BenchmarkSpec>, ExpandError> {
    let versions = parse_package_versions(&options.package_versions)?;
    let benchmark_root = repo_root.join(BENCHMARKS_DIR);

    let implementations = resolve_names(&options.implementation, &benchmark_root).await?;
    let variants: Option<BTreeSet<String>> =
        split_list(&options.variant).map(|variants| variants.into_iter().collect());

    let mut specs = Vec::new();

    for implementation in implementations {
        let implementation_dir = benchmark_root.join(&implementation);
        let names = resolve_names(&options.name, &implementation_dir).await?;

        // an implementation without overrides runs against the installed dependencies
        let implementation_versions = match versions.get(&implementation) {
            Some(versions) if !versions.is_empty() => versions.clone(),
            _ => vec![PackageVersion::default_version()],
        };

        for name in names {
            let benchmark_dir = implementation_dir.join(&name);

            if !is_dir(&benchmark_dir).await? {
                debug!(path = ?benchmark_dir, "Skipped missing benchmark");
                continue;
            }

            let config = load_benchmark_config(&benchmark_dir).await?;

            if !config.variants.is_empty() {
                let selected = config.variants.iter().filter(|variant| {
                    variants
                        .as_ref()
                        .map_or(true, |requested| requested.contains(&variant.name))
                });

                specs.extend(iproduct!(selected, implementation_versions.iter()).map(
                    |(variant, version)| BenchmarkSpec {
                        name: name.clone(),
                        implementation: implementation.clone(),
                        variant: variant.name.clone(),
                        version: version.clone(),
                        config: variant.config.clone().unwrap_or_default(),
                        url: SpecUrl::Local,
                    },
                ));
            } else if variants.is_none() {
                specs.extend(
                    implementation_versions
                        .iter()
                        .map(|version| BenchmarkSpec {
                            name: name.clone(),
                            implementation: implementation.clone(),
                            variant: String::new(),
                            version: version.clone(),
                            config: Default::default(),
                            url: SpecUrl::Local,
                        }),
                );
            } else {
                trace!(path = ?benchmark_dir, "No requested variant declared");
            }
        }
    }

    sort_specs(&mut specs);

    debug!("Expanded {} specs", specs.len());

    Ok(specs)
}

/// stable ordinal sort by (name, variant, implementation, version label)
pub fn sort_specs(specs: &mut [BenchmarkSpec]) {
    specs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Either list the non reserved directories below `dir` or validate an explicit list
async fn resolve_names(option: &str, dir: &Path) -> Result<Vec<String>, ExpandError> {
    match split_list(option) {
        Some(names) => {
            if let Some(reserved) = names
                .iter()
                .find(|name| RESERVED_NAMES.contains(name.as_str()))
            {
                return Err(ExpandError::ReservedName(reserved.clone()));
            }

            Ok(names)
        }
        None => list_dirs(dir).await,
    }
}

async fn list_dirs(dir: &Path) -> Result<Vec<String>, ExpandError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!(path = ?dir, "Skipped missing directory");

            return Ok(Vec::new());
        }
        Err(error) => return Err(ExpandError::io(dir, error)),
    };

    let mut names = Vec::new();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|error| ExpandError::io(dir, error))?
    {
        // follows symlinks, a linked implementation directory counts
        if !is_dir(&entry.path()).await? {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();

        if !RESERVED_NAMES.contains(name.as_str()) {
            names.push(name);
        }
    }

    names.sort();

    Ok(names)
}

async fn is_dir(path: &Path) -> Result<bool, ExpandError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(ExpandError::io(path, error)),
    }
}

/// a missing `benchmarks.json` means "no declared variants"
async fn load_benchmark_config(benchmark_dir: &Path) -> Result<BenchmarkConfigFile, ExpandError> {
    let path = benchmark_dir.join(BENCHMARK_CONFIG_FILE);

    match tokio::fs::read(&path).await {
        Ok(content) => serde_json::from_slice(&content)
            .map_err(|source| ExpandError::InvalidBenchmarkConfig { path, source }),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(BenchmarkConfigFile::default()),
        Err(error) => Err(ExpandError::io(&path, error)),
    }
}
