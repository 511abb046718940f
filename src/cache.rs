use tracing::instrument;

use crate::{
    derived_key::DerivedKey,
    store::{ObjectStore, StoreError},
};

/// Outcome of looking a derived key up in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The derivative already exists; no image work is needed.
    Hit,
    /// The derivative must be produced.
    Miss,
}

/// Checks the store for an existing derivative under `key`.
///
/// Only "not found" counts as a miss; any other store failure is returned.
#[instrument(skip_all, fields(key = %key), err)]
pub async fn lookup<S>(store: &S, key: &DerivedKey) -> Result<CacheStatus, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let status = match store.head_object(&key.storage_key()).await? {
        Some(_) => CacheStatus::Hit,
        None => CacheStatus::Miss,
    };
    tracing::debug!(?status, "derived key looked up");
    Ok(status)
}
