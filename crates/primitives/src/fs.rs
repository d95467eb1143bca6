use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("The file could not be created: {0}")]
    UnableToCreateFile(io::Error),
    #[error("The file could not be copied: {0}")]
    UnableToCopyFile(io::Error),
    #[error("The file could not be opened: {0}")]
    UnableToOpenFile(io::Error),
    #[error("The file could not be renamed: {0}")]
    UnableToRenameFile(io::Error),
    #[error("Failed to set permissions: {0}")]
    UnableToSetPermissions(io::Error),
    #[error("Failed to retrieve file metadata: {0}")]
    UnableToRetrieveMetadata(io::Error),
    #[error("Failed to write bytes to file: {0}")]
    UnableToWriteFile(io::Error),
}

/// Write a file atomically by using a temporary file as an intermediate.
///
/// Care is taken to preserve the permissions of the file at `file_path` being written.
/// If no file exists at `file_path` one will be created with restricted 0o600-equivalent
/// permissions. A crash between the write and the rename leaves `file_path` untouched,
/// which is what every persistence layer in this crate (C7's reader states, C3's token
/// cache, the per-chain cursor) relies on for crash safety.
pub fn write_file_via_temporary(
    file_path: &Path,
    temp_path: &Path,
    bytes: &[u8],
) -> Result<(), FsError> {
    if file_path.exists() {
        fs::copy(file_path, temp_path).map_err(FsError::UnableToCopyFile)?;
        fs::write(temp_path, bytes).map_err(FsError::UnableToWriteFile)?;
    } else {
        create_with_600_perms(temp_path, bytes)?;
    }

    fs::rename(temp_path, file_path).map_err(FsError::UnableToRenameFile)?;

    Ok(())
}

/// Creates a file with `600 (-rw-------)` permissions on unix and writes the specified
/// bytes to it. Permission restriction is a no-op on non-unix targets.
pub fn create_with_600_perms<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), FsError> {
    let path = path.as_ref();
    let mut file = File::create(path).map_err(FsError::UnableToCreateFile)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perm =
            file.metadata().map_err(FsError::UnableToRetrieveMetadata)?.permissions();
        perm.set_mode(0o600);
        file.set_permissions(perm).map_err(FsError::UnableToSetPermissions)?;
    }

    file.write_all(bytes).map_err(FsError::UnableToWriteFile)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_survives_interruption_of_the_rename_step() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("state.bin");
        let temp = dir.path().join("state.bin.tmp");

        write_file_via_temporary(&target, &temp, b"v1").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"v1");
        assert!(!temp.exists());

        write_file_via_temporary(&target, &temp, b"v2").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"v2");
    }
}
