use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::Future;
use tokio::task;
use tower_service::Service;
use tracing::instrument;

use crate::{
    cache::{self, CacheStatus},
    derived_key::{decode_key, DerivedKey},
    envelope::{EdgeEvent, EdgeRequest, EdgeResponse},
    image_type::{self, SupportedImageTypes, DEFAULT_SUPPORTED_IMAGE_TYPES},
    policy::{self, Disposition, DEFAULT_INLINE_LIMIT},
    store::{ObjectStore, StoreError},
    transform::{transform_image, TransformError},
    transformation_params::{ParamsError, TransformationParams},
};

/// Failures that abort a request.
///
/// Recoverable situations (a malformed envelope, an unsupported content
/// type, no requested transform) never surface here; they become regular
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    /// The query string could not be parsed.
    #[error(transparent)]
    Query(#[from] ParamsError),

    /// The object store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The original object does not exist.
    #[error("original object `{key}` not found")]
    OriginalNotFound {
        /// Decoded key of the original.
        key: String,
    },

    /// The original could not be transformed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The blocking transform task did not complete.
    #[error(transparent)]
    Task(#[from] task::JoinError),
}

/// Derives resized images on demand, caching large results in an
/// [`ObjectStore`].
///
/// Each call handles one [`EdgeEvent`] and keeps no state between calls;
/// cloning is cheap and clones share the store.
#[derive(Debug)]
pub struct ImageDeriver<S> {
    store: Arc<S>,
    supported_image_types: SupportedImageTypes,
    inline_limit: usize,
    store_inline_results: bool,
}

impl<S> Clone for ImageDeriver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            supported_image_types: self.supported_image_types,
            inline_limit: self.inline_limit,
            store_inline_results: self.store_inline_results,
        }
    }
}

/// Builder for [`ImageDeriver`].
#[derive(Debug)]
pub struct ImageDeriverBuilder<S> {
    store: Arc<S>,
    supported_image_types: SupportedImageTypes,
    inline_limit: usize,
    store_inline_results: bool,
}

impl<S> ImageDeriverBuilder<S> {
    /// Create a new [`ImageDeriverBuilder`] over the provided store.
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Create a new [`ImageDeriverBuilder`] over a store shared with other
    /// owners, e.g. a process-wide client.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            supported_image_types: DEFAULT_SUPPORTED_IMAGE_TYPES,
            inline_limit: DEFAULT_INLINE_LIMIT,
            store_inline_results: false,
        }
    }

    /// Configure supported image types. Objects of any other content type are
    /// passed through.
    pub fn set_supported_image_types(self, supported_image_types: SupportedImageTypes) -> Self {
        Self {
            supported_image_types,
            ..self
        }
    }

    /// Configure the largest derivative, in bytes, returned inline.
    /// Defaults to [`DEFAULT_INLINE_LIMIT`].
    pub fn set_inline_limit(self, inline_limit: usize) -> Self {
        Self {
            inline_limit,
            ..self
        }
    }

    /// Also write derivatives returned inline to the store, so that repeated
    /// requests are redirected instead of transformed again. Off by default.
    pub fn set_store_inline_results(self, store_inline_results: bool) -> Self {
        Self {
            store_inline_results,
            ..self
        }
    }

    /// Build the [`ImageDeriver`].
    pub fn build(self) -> ImageDeriver<S> {
        ImageDeriver {
            store: self.store,
            supported_image_types: self.supported_image_types,
            inline_limit: self.inline_limit,
            store_inline_results: self.store_inline_results,
        }
    }
}

impl<S> ImageDeriver<S>
where
    S: ObjectStore + 'static,
{
    /// Handle a single edge event.
    pub async fn handle(&self, event: EdgeEvent) -> Result<EdgeResponse, DeriveError> {
        let Some(request) = event.into_request() else {
            tracing::warn!("event has no request record");
            return Ok(policy::malformed_envelope());
        };

        self.derive(request).await
    }

    #[instrument(skip_all, fields(uri = %request.uri, query = %request.querystring), err)]
    async fn derive(&self, request: EdgeRequest) -> Result<EdgeResponse, DeriveError> {
        let params: TransformationParams = request.querystring.parse()?;
        let Some(spec) = params.resolve() else {
            tracing::debug!("no transform requested");
            return Ok(policy::no_transform(request.headers));
        };

        let derived_key = DerivedKey::new(request.object_key(), &spec);
        if cache::lookup(self.store.as_ref(), &derived_key).await? == CacheStatus::Hit {
            tracing::debug!(key = %derived_key, "serving cached derivative");
            return Ok(policy::redirect(&derived_key));
        }

        let original_key = decode_key(request.object_key()).into_owned();
        let Some(original) = self.store.get_object(&original_key).await? else {
            tracing::error!(key = %original_key, "original object missing");
            return Err(DeriveError::OriginalNotFound { key: original_key });
        };

        let Some(supported) = image_type::find(self.supported_image_types, &original.content_type)
        else {
            tracing::debug!(content_type = %original.content_type, "passing through");
            return Ok(policy::pass_through(
                request.headers,
                &original.body,
                &original.content_type,
            ));
        };
        let declared_format = supported.image_format;

        // Decoding and encoding are blocking, so run them on a dedicated
        // blocking task.
        let body = original.body;
        let derived =
            task::spawn_blocking(move || transform_image(&body, declared_format, &spec)).await??;

        let content_type = original.content_type;
        let disposition = policy::disposition(derived.len(), self.inline_limit);
        tracing::debug!(
            key = %derived_key,
            len = derived.len(),
            dimensions = %derived.dimensions,
            ?disposition,
            "derived image"
        );

        match disposition {
            Disposition::Store => {
                self.store
                    .put_object(
                        &derived_key.storage_key(),
                        Bytes::from(derived.bytes),
                        &content_type,
                    )
                    .await?;
                Ok(policy::redirect(&derived_key))
            }
            Disposition::Inline => {
                let response = policy::inline(&derived.bytes, &content_type);
                if self.store_inline_results {
                    self.store
                        .put_object(
                            &derived_key.storage_key(),
                            Bytes::from(derived.bytes),
                            &content_type,
                        )
                        .await?;
                }
                Ok(response)
            }
        }
    }
}

impl<S> Service<EdgeEvent> for ImageDeriver<S>
where
    S: ObjectStore + 'static,
{
    type Response = EdgeResponse;
    type Error = DeriveError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EdgeEvent) -> Self::Future {
        let deriver = self.clone();
        Box::pin(async move { deriver.handle(event).await })
    }
}
