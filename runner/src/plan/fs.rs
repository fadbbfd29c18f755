use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// The filesystem queries the planner needs, abstracted for in-memory testing
#[allow(async_fn_in_trait)]
pub trait Filesystem {
    /// `Ok(None)` when nothing exists at `path`
    async fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// `Filesystem` backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl Filesystem for DiskFs {
    async fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(EntryKind::Dir)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Walk upwards from `start` until a directory containing `file_name` is found.
///
/// `start` may be a file, in which case the search begins at its parent.
pub async fn find_ancestor_with<F: Filesystem>(
    fs: &F,
    start: &Path,
    start_kind: EntryKind,
    file_name: &str,
) -> io::Result<Option<PathBuf>> {
    let mut current = match start_kind {
        EntryKind::Dir => Some(start),
        EntryKind::File => start.parent(),
    };

    while let Some(dir) = current {
        if fs.entry_kind(&dir.join(file_name)).await? == Some(EntryKind::File) {
            return Ok(Some(dir.to_path_buf()));
        }

        current = dir.parent();
    }

    Ok(None)
}
