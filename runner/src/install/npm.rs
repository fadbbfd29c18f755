use super::{InstallError, PackageManager};
use crate::config::PackageManagerConfig;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use tracing::{debug, info, instrument, trace};

/// Runs `<exec> <params>` (by default `npm install`) inside the install directory
#[derive(Clone, Debug)]
pub struct NpmInstaller {
    pub exec: PathBuf,
    pub params: Vec<String>,
}

impl NpmInstaller {
    pub fn load(config: &PackageManagerConfig) -> Self {
        Self {
            exec: config.exec.clone(),
            params: config.params.clone(),
        }
    }
}

impl PackageManager for NpmInstaller {
    #[instrument(skip(self), level = "debug")]
    async fn install(&self, dir: &Path) -> Result<(), InstallError> {
        info!(
            "Running {} {} in {}",
            self.exec.to_string_lossy(),
            self.params.join(" "),
            dir.to_string_lossy()
        );

        let output = Command::new(&self.exec)
            .args(&self.params)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| InstallError::Spawn {
                exec: self.exec.clone(),
                source,
            })?;

        debug!("Install exit status: {}", output.status);
        trace!("Output: {}", String::from_utf8_lossy(&output.stdout));

        if !output.status.success() {
            return Err(InstallError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}
