//! An [`ObjectStore`] kept entirely in memory.
//!
//! ETags are computed with the same [`ContentHasher`] the collector uses, so a
//! tree staged into a `MemoryStore` and scanned again yields no updates.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::contract::{DeleteResult, ObjectStore, RemoteObject, UploadOptions};
use crate::error::StoreError;
use crate::hash::ContentHasher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub etag: String,
    pub options: UploadOptions,
    pub redirect: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    hasher: ContentHasher,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    delete_batches: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hasher(hasher: ContentHasher) -> Self {
        Self {
            hasher,
            ..Self::default()
        }
    }

    /// Seed an object with `body`.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        let body = body.into();
        let object = StoredObject {
            etag: self.hasher.hash_bytes(&body),
            body,
            options: UploadOptions::default(),
            redirect: None,
        };
        self.objects.lock().insert(key.into(), object);
    }

    /// Seed a zero-length redirect marker.
    pub fn insert_redirect(&self, key: impl Into<String>, destination: impl Into<String>) {
        let object = StoredObject {
            etag: self.hasher.hash_bytes(&[]),
            body: Vec::new(),
            options: UploadOptions::default(),
            redirect: Some(destination.into()),
        };
        self.objects.lock().insert(key.into(), object);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Every `delete_objects` request received, in order.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.delete_batches.lock().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| {
                RemoteObject::new(key.clone(), object.body.len() as u64, format!("\"{}\"", object.etag))
            })
            .collect())
    }

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> Result<(), StoreError> {
        let body = tokio::fs::read(local_path).await?;
        let object = StoredObject {
            etag: self.hasher.hash_bytes(&body),
            body,
            options: options.clone(),
            redirect: None,
        };
        self.objects.lock().insert(key.to_string(), object);
        Ok(())
    }

    async fn get_redirect(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .objects
            .lock()
            .get(key)
            .and_then(|object| object.redirect.clone()))
    }

    async fn set_redirect(&self, key: &str, destination: &str) -> Result<(), StoreError> {
        self.insert_redirect(key, destination);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteResult, StoreError> {
        self.delete_batches.lock().push(keys.to_vec());
        let mut objects = self.objects.lock();
        for key in keys {
            objects.remove(key);
        }
        Ok(DeleteResult::default())
    }
}
