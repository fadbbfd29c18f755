mod npm;

use crate::{
    config::{ConfigErrors, PackageManagerConfig},
    plan::{NpmInstall, MANIFEST_FILE},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::ExitStatus,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to prepare {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start {exec:?}: {source}")]
    Spawn {
        exec: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Install exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("Failed to serialize manifest")]
    Serialize(#[from] serde_json::Error),
}

impl InstallError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Installs the dependencies of the manifest found in a directory
#[allow(async_fn_in_trait)]
pub trait PackageManager {
    async fn install(&self, dir: &Path) -> Result<(), InstallError>;
}

/// All supported package managers
/// These should be initialized from `PackageManagers::load`
#[derive(Clone, Debug)]
pub enum PackageManagers {
    Npm(npm::NpmInstaller),
}

impl PackageManagers {
    pub fn load(config: &PackageManagerConfig) -> Result<Self, ConfigErrors> {
        match config.name.to_lowercase().as_str() {
            "npm" => Ok(Self::Npm(npm::NpmInstaller::load(config))),
            _ => Err(ConfigErrors::UnsupportedPackageManager(config.name.clone())),
        }
    }
}

impl PackageManager for PackageManagers {
    async fn install(&self, dir: &Path) -> Result<(), InstallError> {
        match self {
            Self::Npm(npm) => npm.install(dir).await,
        }
    }
}

/// Outcome of `prepare_version_directory`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    Installed,
    /// the directory already existed, nothing was done
    Reused,
}

/// Materialize `install` unless its directory already exists.
///
/// Creating the directory is the claim, so two concurrent runs never install
/// into the same directory. An existing directory is trusted as is, its
/// dependencies are not checked. A failed install removes the directory again.
#[instrument(skip_all, fields(install_dir = ?install.install_dir), level = "debug")]
pub async fn prepare_version_directory<P: PackageManager>(
    install: &NpmInstall,
    package_manager: &P,
) -> Result<Preparation, InstallError> {
    let dir = &install.install_dir;

    if let Some(parent) = dir.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(InstallError::io(parent))?;
    }

    match tokio::fs::create_dir(dir).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::AlreadyExists => {
            debug!("Reusing existing install");

            return Ok(Preparation::Reused);
        }
        Err(error) => return Err(InstallError::io(dir)(error)),
    }

    match populate(install, package_manager).await {
        Ok(()) => {
            info!(install_dir = ?dir, "Installed dependencies");

            Ok(Preparation::Installed)
        }
        Err(install_error) => {
            error!(error = %install_error, "Install failed, removing {}", dir.to_string_lossy());

            if let Err(error) = tokio::fs::remove_dir_all(dir).await {
                warn!(error = ?error, "Failed to remove incomplete install");
            }

            Err(install_error)
        }
    }
}

async fn populate<P: PackageManager>(
    install: &NpmInstall,
    package_manager: &P,
) -> Result<(), InstallError> {
    let manifest = install.install_dir.join(MANIFEST_FILE);
    let content = serde_json::to_vec_pretty(&install.package_json)?;

    tokio::fs::write(&manifest, content)
        .await
        .map_err(InstallError::io(&manifest))?;

    package_manager.install(&install.install_dir).await
}
