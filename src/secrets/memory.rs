//! In-memory secret storage.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{Secret, SecretError, SecretStore, check_ident};

type SecretKey = (String, String);

//------------ MemoryStore ---------------------------------------------------

/// A secret store held in memory.
///
/// Clones share the same secrets. Nothing survives the last clone.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    label: Option<String>,
    inner: Arc<Mutex<HashMap<SecretKey, Secret>>>,
}

impl MemoryStore {
    pub fn new(label: Option<&str>) -> Self {
        MemoryStore {
            label: label.map(|s| s.to_string()),
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SecretKey, Secret>>, SecretError> {
        self.inner
            .lock()
            .map_err(|e| SecretError::Other(format!("cannot lock memory store: {e}")))
    }

    pub fn len(&self) -> Result<usize, SecretError> {
        self.lock().map(|l| l.len())
    }

    pub fn is_empty(&self) -> Result<bool, SecretError> {
        self.lock().map(|l| l.is_empty())
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Secret, SecretError> {
        check_ident(namespace)?;
        check_ident(name)?;

        self.lock()?
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::not_found(namespace, name))
    }

    fn create(&self, secret: &Secret) -> Result<(), SecretError> {
        check_ident(&secret.namespace)?;
        check_ident(&secret.name)?;

        let mut secrets = self.lock()?;
        let key = (secret.namespace.clone(), secret.name.clone());
        if secrets.contains_key(&key) {
            return Err(SecretError::already_exists(&secret.namespace, &secret.name));
        }
        secrets.insert(key, secret.clone());
        Ok(())
    }
}

impl fmt::Display for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory://{}", self.label.as_deref().unwrap_or_default())
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn create_then_get() {
        let store = MemoryStore::new(Some("test"));
        assert!(store.is_empty().unwrap());

        let secret = Secret::new("ns", "s", "t").with_data("k", Bytes::from_static(b"v"));
        store.create(&secret).unwrap();

        assert_eq!(store.get("ns", "s").unwrap(), secret);
        assert!(store.get("other", "s").unwrap_err().is_not_found());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.to_string(), "memory://test");
    }

    #[test]
    fn create_does_not_overwrite() {
        let store = MemoryStore::default();
        let first = Secret::new("ns", "s", "t").with_data("k", Bytes::from_static(b"1"));
        let second = Secret::new("ns", "s", "t").with_data("k", Bytes::from_static(b"2"));

        store.create(&first).unwrap();
        assert!(matches!(
            store.create(&second),
            Err(SecretError::AlreadyExists { .. })
        ));
        assert_eq!(store.get("ns", "s").unwrap(), first);
    }

    #[test]
    fn clones_share_secrets() {
        let store = MemoryStore::default();
        let clone = store.clone();
        clone.create(&Secret::new("ns", "s", "t")).unwrap();
        assert!(store.get("ns", "s").is_ok());
    }
}
