//! Storage of secrets.
//!
//! Secrets are small named maps of byte values, grouped in namespaces, with
//! a type marker. The CA keeps its self-signed root key and certificate in
//! one so that it survives restarts.

use std::{collections::BTreeMap, fmt, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::commons::{error::IoError, util::ext_serde};

mod disk;
mod memory;

pub use self::disk::DiskStore;
pub use self::memory::MemoryStore;

//------------ Secret --------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Secret {
    pub name: String,
    pub namespace: String,

    #[serde(rename = "type")]
    pub secret_type: String,

    #[serde(
        serialize_with = "ext_serde::ser_bytes_map",
        deserialize_with = "ext_serde::de_bytes_map"
    )]
    pub data: BTreeMap<String, Bytes>,
}

impl Secret {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        secret_type: impl Into<String>,
    ) -> Self {
        Secret {
            name: name.into(),
            namespace: namespace.into(),
            secret_type: secret_type.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Bytes) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.data.get(key)
    }
}

//------------ SecretStore ---------------------------------------------------

/// A store of secrets, keyed by namespace and name.
pub trait SecretStore: fmt::Debug + Send + Sync {
    /// Returns the secret, or [`SecretError::NotFound`] if there is none.
    fn get(&self, namespace: &str, name: &str) -> Result<Secret, SecretError>;

    /// Adds a new secret. Fails with [`SecretError::AlreadyExists`] if a
    /// secret with the same namespace and name is present.
    fn create(&self, secret: &Secret) -> Result<(), SecretError>;
}

/// Opens the secret store for a storage URI.
///
/// Supported are `memory:` for a store that lives as long as the returned
/// value, and `local://` followed by a directory path.
pub fn open_store(storage_uri: &Url) -> Result<Arc<dyn SecretStore>, SecretError> {
    match storage_uri.scheme() {
        "local" => {
            let path = format!(
                "{}{}",
                storage_uri.host_str().unwrap_or_default(),
                storage_uri.path()
            );
            Ok(Arc::new(DiskStore::new(path)))
        }
        "memory" => Ok(Arc::new(MemoryStore::new(storage_uri.host_str()))),
        scheme => Err(SecretError::UnknownScheme(scheme.to_string())),
    }
}

/// Checks that a namespace or name can be used as a single path segment.
fn check_ident(ident: &str) -> Result<(), SecretError> {
    if ident.is_empty()
        || ident == "."
        || ident == ".."
        || ident.contains(['/', '\\'])
    {
        Err(SecretError::InvalidName(ident.to_string()))
    } else {
        Ok(())
    }
}

//------------ SecretError ---------------------------------------------------

#[derive(Debug)]
pub enum SecretError {
    NotFound { namespace: String, name: String },
    AlreadyExists { namespace: String, name: String },
    InvalidName(String),
    UnknownScheme(String),
    IoError(IoError),
    JsonError(serde_json::Error),
    Other(String),
}

impl SecretError {
    pub fn not_found(namespace: &str, name: &str) -> Self {
        SecretError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(namespace: &str, name: &str) -> Self {
        SecretError::AlreadyExists {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SecretError::NotFound { .. })
    }
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SecretError::NotFound { namespace, name } => {
                write!(f, "secret '{}' not found in namespace '{}'", name, namespace)
            }
            SecretError::AlreadyExists { namespace, name } => write!(
                f,
                "secret '{}' already exists in namespace '{}'",
                name, namespace
            ),
            SecretError::InvalidName(s) => {
                write!(f, "invalid secret name or namespace: '{}'", s)
            }
            SecretError::UnknownScheme(s) => {
                write!(f, "unknown storage scheme: {}", s)
            }
            SecretError::IoError(e) => e.fmt(f),
            SecretError::JsonError(e) => write!(f, "invalid secret json: {}", e),
            SecretError::Other(s) => s.fmt(f),
        }
    }
}

impl From<IoError> for SecretError {
    fn from(e: IoError) -> Self {
        SecretError::IoError(e)
    }
}

impl From<serde_json::Error> for SecretError {
    fn from(e: serde_json::Error) -> Self {
        SecretError::JsonError(e)
    }
}

impl std::error::Error for SecretError {}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn open_by_scheme() {
        let store = open_store(&Url::parse("memory://test").unwrap()).unwrap();
        assert!(store.get("ns", "name").unwrap_err().is_not_found());

        test::test_under_tmp(|d| {
            let uri = Url::parse(&format!("local://{}", d.display())).unwrap();
            let store = open_store(&uri).unwrap();
            assert!(store.get("ns", "name").unwrap_err().is_not_found());
        });

        let res = open_store(&Url::parse("postgres://localhost/db").unwrap());
        assert!(matches!(res, Err(SecretError::UnknownScheme(_))));
    }

    #[test]
    fn reject_path_like_idents() {
        for ident in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(check_ident(ident), Err(SecretError::InvalidName(_))));
        }
        assert!(check_ident("istio-system").is_ok());
    }

    #[test]
    fn secret_json_uses_type_and_base64() {
        let secret = Secret::new("ns", "name", "example/type")
            .with_data("a", Bytes::from_static(b"hello"));
        let json = serde_json::to_value(&secret).unwrap();
        assert_eq!(json["type"], "example/type");
        assert_eq!(json["data"]["a"], "aGVsbG8=");
    }
}
