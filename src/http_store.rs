use async_trait::async_trait;
use bytes::Bytes;
use http::{header, StatusCode};
use tracing::instrument;
use url::Url;

use crate::store::{ObjectHead, ObjectStore, StoreError, StoredObject, DEFAULT_CONTENT_TYPE};

/// Environment variable read by [`HttpObjectStore::from_env`].
pub const STORE_URL_ENV: &str = "IMAGE_STORE_URL";

/// [`ObjectStore`] backed by an S3-compatible HTTP endpoint.
///
/// Objects are addressed as `<base>/<key>` and accessed with plain `HEAD`,
/// `GET` and `PUT` requests. Authentication, if any, is the concern of the
/// configured [`reqwest::Client`] (e.g. default headers) or of the endpoint
/// itself.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpObjectStore {
    /// Create a new [`HttpObjectStore`] rooted at `base`.
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// Create a store from the `IMAGE_STORE_URL` environment variable.
    pub fn from_env() -> Result<Self, StoreError> {
        let base = std::env::var(STORE_URL_ENV)
            .map_err(|_| StoreError::Configuration(format!("{STORE_URL_ENV} is not set")))?;
        let base = base
            .parse()
            .map_err(|err| StoreError::Configuration(format!("{STORE_URL_ENV}: {err}")))?;
        Ok(Self::new(base))
    }

    /// Configure the `client`.
    pub fn set_client(self, client: reqwest::Client) -> Self {
        Self { client, ..self }
    }

    /// URL of the object under `key`. Each key segment is percent-encoded as
    /// a path segment.
    pub fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::Configuration(format!("`{}` cannot be a base URL", self.base))
            })?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

fn unexpected(key: &str, status: StatusCode) -> StoreError {
    match status {
        StatusCode::FORBIDDEN => StoreError::Forbidden {
            key: key.to_owned(),
        },
        status => StoreError::UnexpectedStatus {
            key: key.to_owned(),
            status,
        },
    }
}

fn header_str(response: &reqwest::Response, name: header::HeaderName) -> Option<&str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self), err)]
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        let response = self.client.head(self.object_url(key)?).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(ObjectHead {
                content_type: header_str(&response, header::CONTENT_TYPE).map(str::to_owned),
                content_length: header_str(&response, header::CONTENT_LENGTH)
                    .and_then(|v| v.parse().ok()),
            })),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected(key, status)),
        }
    }

    #[instrument(skip(self), err)]
    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let response = self.client.get(self.object_url(key)?).send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(None),
            status => return Err(unexpected(key, status)),
        }

        let content_type = header_str(&response, header::CONTENT_TYPE)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        let body = response.bytes().await?;

        Ok(Some(StoredObject { body, content_type }))
    }

    #[instrument(skip(self, body), fields(len = body.len()), err)]
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.object_url(key)?)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(unexpected(key, status)),
        }
    }
}
