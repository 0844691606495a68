//! Writing a run's artifacts to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::PartitionError;
use crate::custodian::Artifact;

/// Writes every file of every artifact, or leaves no file of the run behind.
///
/// Each file is staged under a hidden temporary name, made read-only, then
/// renamed into place.
pub fn write_all_or_nothing(out_dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>, PartitionError> {
    fs::create_dir_all(out_dir).map_err(|source| PartitionError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut written: Vec<PathBuf> = Vec::new();
    for file in artifacts.iter().flat_map(|a| a.files.iter()) {
        if let Err(source) = write_read_only(&file.path, &file.contents) {
            for path in &written {
                if let Err(err) = fs::remove_file(path) {
                    tracing::error!(path = %path.display(), error = %err, "failed to remove partial output");
                }
            }
            return Err(PartitionError::Write {
                path: file.path.clone(),
                source,
            });
        }
        tracing::debug!(path = %file.path.display(), bytes = file.contents.len(), "artifact written");
        written.push(file.path.clone());
    }
    Ok(written)
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_read_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let staging = staging_path(path);
    let result = (|| {
        let mut file = fs::File::create(&staging)?;
        file.write_all(contents)?;
        file.sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, fs::Permissions::from_mode(0o400))?;
        }
        fs::rename(&staging, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
