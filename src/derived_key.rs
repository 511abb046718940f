use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::transformation_params::TransformSpec;

/// Storage key of a derived image.
///
/// Built by prefixing the final path segment of the original key with the
/// transform tag, leaving the directory path unchanged:
///
/// ```rust
/// use edge_image_derive::{DerivedKey, TransformSpec};
///
/// let spec = TransformSpec {
///     width: 400,
///     height: 0,
///     quality: 60,
/// };
/// let key = DerivedKey::new("albums/2024/photo.jpg", &spec);
///
/// assert_eq!(key.as_str(), "albums/2024/w400q60_photo.jpg");
/// assert_eq!(key.location(), "/albums/2024/w400q60_photo.jpg");
/// ```
///
/// The same transform and original key always yield the same derived key, so
/// independent invocations racing on a cache miss write identical objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey(String);

impl DerivedKey {
    /// Derives the key for `original_key` (without its leading `/`).
    pub fn new(original_key: &str, spec: &TransformSpec) -> Self {
        let key = match original_key.rsplit_once('/') {
            Some((dir, file)) => format!("{dir}/{spec}{file}"),
            None => format!("{spec}{original_key}"),
        };
        Self(key)
    }

    /// The key exactly as it appears in request paths, percent-encoding
    /// included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key to address the object store with.
    pub fn storage_key(&self) -> Cow<'_, str> {
        decode_key(&self.0)
    }

    /// Public path of the derived object, suitable for a `Location` header.
    pub fn location(&self) -> String {
        format!("/{}", self.0)
    }
}

impl std::fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL-decodes a key taken from a request path.
///
/// Sequences that do not decode to valid UTF-8 are replaced rather than
/// rejected.
pub(crate) fn decode_key(key: &str) -> Cow<'_, str> {
    percent_decode_str(key).decode_utf8_lossy()
}
