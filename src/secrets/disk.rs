//! Secret storage in a directory.
//!
//! Each secret is kept as a JSON file at `<base>/<namespace>/<name>.json`.

use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::trace;

use super::{Secret, SecretError, SecretStore, check_ident};
use crate::commons::{error::IoError, util::file};

//------------ DiskStore -----------------------------------------------------

#[derive(Clone, Debug)]
pub struct DiskStore {
    base: PathBuf,
}

impl DiskStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        DiskStore { base: base.into() }
    }

    fn secret_path(&self, namespace: &str, name: &str) -> Result<PathBuf, SecretError> {
        check_ident(namespace)?;
        check_ident(name)?;

        let mut path = self.base.clone();
        path.push(namespace);
        path.push(format!("{}.json", name));
        Ok(path)
    }
}

impl SecretStore for DiskStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Secret, SecretError> {
        let path = self.secret_path(namespace, name)?;

        let json = match fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretError::not_found(namespace, name));
            }
            Err(e) => {
                return Err(IoError::new(
                    format!("Could not read secret: {}", path.to_string_lossy()),
                    e,
                )
                .into());
            }
        };

        trace!("Read secret from: {}", path.to_string_lossy());
        Ok(serde_json::from_slice(&json)?)
    }

    fn create(&self, secret: &Secret) -> Result<(), SecretError> {
        let path = self.secret_path(&secret.namespace, &secret.name)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base.clone());
        file::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(secret)?;

        // Write to a temporary file first, so that readers never see a
        // partial secret, and only move it in place if nothing is there.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
            IoError::new(
                format!("Could not create temp file in: {}", dir.to_string_lossy()),
                e,
            )
        })?;
        tmp.write_all(&json).map_err(|e| {
            IoError::new(
                format!("Could not write to: {}", tmp.path().to_string_lossy()),
                e,
            )
        })?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                trace!("Saved secret to: {}", path.to_string_lossy());
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Err(
                SecretError::already_exists(&secret.namespace, &secret.name),
            ),
            Err(e) => Err(IoError::new(
                format!("Could not save secret: {}", path.to_string_lossy()),
                e.error,
            )
            .into()),
        }
    }
}

impl fmt::Display for DiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local://{}", self.base.to_string_lossy())
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::test;

    #[test]
    fn create_then_get() {
        test::test_under_tmp(|d| {
            let store = DiskStore::new(&d);
            let secret = Secret::new("ns", "s", "t")
                .with_data("ca-cert.pem", Bytes::from_static(b"cert"));

            store.create(&secret).unwrap();
            assert!(d.join("ns").join("s.json").is_file());

            // a second store on the same directory sees the secret
            let store = DiskStore::new(&d);
            assert_eq!(store.get("ns", "s").unwrap(), secret);
        });
    }

    #[test]
    fn create_does_not_overwrite() {
        test::test_under_tmp(|d| {
            let store = DiskStore::new(&d);
            store.create(&Secret::new("ns", "s", "first")).unwrap();

            let res = store.create(&Secret::new("ns", "s", "second"));
            assert!(matches!(res, Err(SecretError::AlreadyExists { .. })));
            assert_eq!(store.get("ns", "s").unwrap().secret_type, "first");
        });
    }

    #[test]
    fn missing_secret_is_not_found() {
        test::test_under_tmp(|d| {
            let store = DiskStore::new(d.join("does-not-exist-yet"));
            assert!(store.get("ns", "s").unwrap_err().is_not_found());
        });
    }

    #[test]
    fn unreadable_secret_is_not_not_found() {
        test::test_under_tmp(|d| {
            // the namespace is a file, so the secret cannot be read
            file::save(b"", &d.join("ns")).unwrap();

            let err = DiskStore::new(&d).get("ns", "s").unwrap_err();
            assert!(matches!(err, SecretError::IoError(_)));
        });
    }

    #[test]
    fn corrupt_secret_is_json_error() {
        test::test_under_tmp(|d| {
            file::save(b"{ not json", &d.join("ns").join("s.json")).unwrap();

            let err = DiskStore::new(&d).get("ns", "s").unwrap_err();
            assert!(matches!(err, SecretError::JsonError(_)));
        });
    }
}
