//! Object store interface consumed by the derivation pipeline.
//!
//! A missing object is an expected outcome and is reported as `Ok(None)`.
//! Every other failure is a [`StoreError`] and is never mistaken for a miss.
use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use bytes::Bytes;

/// Content type assumed when a store does not report one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Failures talking to the object store, other than "not found".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store refused access to the key.
    #[error("access to `{key}` denied")]
    Forbidden {
        /// Key that was requested.
        key: String,
    },

    /// The store answered with a status that is neither success nor
    /// "not found".
    #[error("unexpected status {status} for `{key}`")]
    UnexpectedStatus {
        /// Key that was requested.
        key: String,
        /// Status the store returned.
        status: http::StatusCode,
    },

    /// The request never completed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The store client could not be set up.
    #[error("store configuration: {0}")]
    Configuration(String),
}

/// Metadata returned by [`ObjectStore::head_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Object size in bytes, if reported.
    pub content_length: Option<u64>,
}

/// A fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object contents.
    pub body: Bytes,
    /// Declared content type.
    pub content_type: String,
}

/// Minimal key-value store with content-type metadata.
///
/// Keys are already URL-decoded when they reach the store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checks whether `key` exists.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    /// Reads `key`.
    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Writes `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<(), StoreError>;
}

/// In-process [`ObjectStore`].
///
/// Useful for tests and local runs; contents live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing the async interface.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>, content_type: &str) {
        let object = StoredObject {
            body: body.into(),
            content_type: content_type.to_owned(),
        };
        self.lock().insert(key.into(), object);
    }

    /// Returns a copy of the object under `key`.
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    /// Returns `true` if `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        Ok(self.lock().get(key).map(|object| ObjectHead {
            content_type: Some(object.content_type.clone()),
            content_length: Some(object.body.len() as u64),
        }))
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.get(key))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.insert(key, body, content_type);
        Ok(())
    }
}
