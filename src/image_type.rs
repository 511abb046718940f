//! Image types as constants which can be used to establish the allow-list of
//! content types that are eligible for derivation.
//!
//! Stored objects whose content type is not on the list are passed through
//! untouched.
use image::ImageFormat;
use mediatype::{names, MediaType};

const IMAGE_PNG: MediaType = image_type(names::PNG);
const IMAGE_JPEG: MediaType = image_type(names::JPEG);

const fn image_type(subtype: mediatype::Name) -> MediaType {
    MediaType::new(names::IMAGE, subtype)
}

/// PNG image type.
pub const PNG: SupportedImageType = SupportedImageType::new(IMAGE_PNG, ImageFormat::Png);
/// JPEG image type.
pub const JPEG: SupportedImageType = SupportedImageType::new(IMAGE_JPEG, ImageFormat::Jpeg);

/// Alias for a static slice of [`SupportedImageType`].
pub type SupportedImageTypes = &'static [SupportedImageType<'static>];

/// Default of supported image types, consisting of [`JPEG`] and [`PNG`].
pub const DEFAULT_SUPPORTED_IMAGE_TYPES: SupportedImageTypes = &[JPEG, PNG];

/// Pair of [`MediaType`] and [`ImageFormat`].
///
/// This structure establishes an association between the two types and is
/// useful for conversions.
#[derive(Debug)]
pub struct SupportedImageType<'a> {
    /// Media type, such as "image/png".
    pub media_type: MediaType<'a>,

    /// Image format, such as "Png".
    pub image_format: ImageFormat,
}

impl<'a> SupportedImageType<'a> {
    const fn new(media_type: MediaType<'a>, image_format: ImageFormat) -> Self {
        Self {
            media_type,
            image_format,
        }
    }

    /// Returns `true` if `media_type` names this image type. Parameters such
    /// as `charset` are not considered.
    pub fn matches(&self, media_type: &MediaType<'_>) -> bool {
        self.media_type.ty == media_type.ty
            && self.media_type.subty == media_type.subty
            && media_type.suffix.is_none()
    }
}

/// Looks up the supported image type for a raw `Content-Type` value.
///
/// Returns `None` when the value does not parse as a media type or names a
/// type outside of `supported_image_types`.
pub fn find<'a>(
    supported_image_types: &'a [SupportedImageType<'a>],
    content_type: &str,
) -> Option<&'a SupportedImageType<'a>> {
    let media_type = MediaType::parse(content_type.trim()).ok()?;
    supported_image_types
        .iter()
        .find(|supported| supported.matches(&media_type))
}
