use crate::{
    config::{ConfigErrors, PackageManagerConfig},
    install::{prepare_version_directory, InstallError, PackageManager, PackageManagers, Preparation},
    plan::{NpmInstall, NpmPackageJson},
};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Records every directory it is asked to install into
#[derive(Default)]
struct CountingPackageManager {
    calls: RefCell<Vec<PathBuf>>,
    fail: bool,
}

impl PackageManager for CountingPackageManager {
    async fn install(&self, dir: &Path) -> Result<(), InstallError> {
        // the manifest must be in place before the package manager runs
        assert!(dir.join("package.json").is_file());
        self.calls.borrow_mut().push(dir.to_path_buf());

        if self.fail {
            Err(InstallError::Spawn {
                exec: PathBuf::from("fake"),
                source: std::io::Error::other("boom"),
            })
        } else {
            Ok(())
        }
    }
}

fn install(root: &TempDir) -> NpmInstall {
    NpmInstall {
        install_dir: root.path().join("versions").join("0123abcd"),
        package_json: NpmPackageJson {
            private: true,
            dependencies: BTreeMap::from([("lit".to_string(), "3.0.0".to_string())]),
        },
    }
}

#[tokio::test]
async fn installs_once() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);
    let package_manager = CountingPackageManager::default();

    assert_eq!(
        prepare_version_directory(&install, &package_manager)
            .await
            .unwrap(),
        Preparation::Installed
    );
    assert_eq!(
        prepare_version_directory(&install, &package_manager)
            .await
            .unwrap(),
        Preparation::Reused
    );
    assert_eq!(*package_manager.calls.borrow(), vec![install.install_dir.clone()]);
}

#[tokio::test]
async fn writes_manifest() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);

    prepare_version_directory(&install, &CountingPackageManager::default())
        .await
        .unwrap();

    let written: NpmPackageJson = serde_json::from_slice(
        &std::fs::read(install.install_dir.join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written, install.package_json);

    let raw: serde_json::Value = serde_json::from_slice(
        &std::fs::read(install.install_dir.join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        raw,
        serde_json::json!({"private": true, "dependencies": {"lit": "3.0.0"}})
    );
}

#[tokio::test]
async fn existing_directory_is_trusted() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);
    std::fs::create_dir_all(&install.install_dir).unwrap();
    let package_manager = CountingPackageManager::default();

    assert_eq!(
        prepare_version_directory(&install, &package_manager)
            .await
            .unwrap(),
        Preparation::Reused
    );
    assert!(package_manager.calls.borrow().is_empty());
    assert!(!install.install_dir.join("package.json").exists());
}

#[tokio::test]
async fn failed_install_is_removed() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);
    let failing = CountingPackageManager {
        fail: true,
        ..Default::default()
    };

    assert!(matches!(
        prepare_version_directory(&install, &failing).await,
        Err(InstallError::Spawn { .. })
    ));
    assert!(!install.install_dir.exists());

    // a later run retries
    let package_manager = CountingPackageManager::default();
    assert_eq!(
        prepare_version_directory(&install, &package_manager)
            .await
            .unwrap(),
        Preparation::Installed
    );
}

#[test]
fn unsupported_package_manager() {
    let config = PackageManagerConfig {
        name: "bower".to_string(),
        ..Default::default()
    };

    assert!(matches!(
        PackageManagers::load(&config),
        Err(ConfigErrors::UnsupportedPackageManager(name)) if name == "bower"
    ));
    assert!(PackageManagers::load(&PackageManagerConfig::default()).is_ok());
}

#[cfg(unix)]
fn command(exec: &str, params: &[&str]) -> PackageManagers {
    PackageManagers::load(&PackageManagerConfig {
        name: "npm".to_string(),
        exec: PathBuf::from(exec),
        params: params.iter().map(|param| param.to_string()).collect(),
    })
    .unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn command_runs_in_install_directory() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);

    prepare_version_directory(&install, &command("sh", &["-c", "touch installed"]))
        .await
        .unwrap();

    assert!(install.install_dir.join("installed").is_file());
}

#[cfg(unix)]
#[tokio::test]
async fn command_failure() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);

    let result =
        prepare_version_directory(&install, &command("sh", &["-c", "echo nope >&2; exit 3"]))
            .await;

    match result {
        Err(InstallError::Failed { status, stderr }) => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(stderr.trim(), "nope");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(!install.install_dir.exists());
}

#[tokio::test]
async fn command_not_found() {
    let root = TempDir::with_prefix("webbench-install-").unwrap();
    let install = install(&root);
    let missing = PackageManagers::load(&PackageManagerConfig {
        exec: root.path().join("no-such-package-manager"),
        ..Default::default()
    })
    .unwrap();

    assert!(matches!(
        prepare_version_directory(&install, &missing).await,
        Err(InstallError::Spawn { .. })
    ));
}
