use std::{
    fs,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use bytes::Bytes;
use log::trace;

use crate::commons::error::IoError;

pub fn create_dir_all(dir: &Path) -> Result<(), IoError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| {
            IoError::new(
                format!("could not create dir: {}", dir.to_string_lossy()),
                e,
            )
        })?;
    }
    Ok(())
}

pub fn create_file_with_path(path: &Path) -> Result<File, IoError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            trace!("Creating path: {}", parent.to_string_lossy());
            create_dir_all(parent)?;
        }
    }
    File::create(path).map_err(|e| {
        IoError::new(
            format!("Could not create file: {}", path.to_string_lossy()),
            e,
        )
    })
}

/// Saves a file, creating parent dirs as needed
pub fn save(content: &[u8], full_path: &Path) -> Result<(), IoError> {
    let mut f = create_file_with_path(full_path)?;
    f.write_all(content).map_err(|e| {
        IoError::new(
            format!("Could not write to: {}", full_path.to_string_lossy()),
            e,
        )
    })?;

    trace!("Saved file: {}", full_path.to_string_lossy());
    Ok(())
}

/// Reads a file to Bytes
pub fn read(path: &Path) -> Result<Bytes, IoError> {
    let mut f = File::open(path).map_err(|e| {
        IoError::new(format!("Could not open: '{}'", path.to_string_lossy()), e)
    })?;
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes).map_err(|e| {
        IoError::new(format!("Could not read: {}", path.to_string_lossy()), e)
    })?;
    Ok(Bytes::from(bytes))
}

/// Removes a file, if it exists.
pub fn delete_file(full_path: &Path) -> Result<(), IoError> {
    if full_path.exists() {
        trace!("Removing file: {}", full_path.to_string_lossy());
        fs::remove_file(full_path).map_err(|e| {
            IoError::new(
                format!(
                    "Could not remove file: {}",
                    full_path.to_string_lossy()
                ),
                e,
            )
        })?;
    }
    Ok(())
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn save_creates_parent_dirs_and_reads_back() {
        test::test_under_tmp(|d| {
            let path = d.join("a").join("b").join("file.txt");
            save(b"content", &path).unwrap();
            assert_eq!(read(&path).unwrap(), Bytes::from_static(b"content"));

            delete_file(&path).unwrap();
            assert!(!path.exists());

            // deleting again is fine
            delete_file(&path).unwrap();
        });
    }

    #[test]
    fn read_missing_file_has_context() {
        test::test_under_tmp(|d| {
            let err = read(&d.join("missing.pem")).unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
            assert!(err.to_string().contains("missing.pem"));
        });
    }
}
