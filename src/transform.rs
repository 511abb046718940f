//! Aspect-preserving shrink, center crop and re-encode.
//!
//! The geometry is computed up front by [`plan`] so it can be checked without
//! touching pixels:
//!
//! 1. Both axes get a shrink ratio `target / original`. An unconstrained axis
//!    (target `0`) contributes `0`, so the constrained axis always wins the
//!    `max`.
//! 2. The ratio is capped at `1.0`; images are never enlarged.
//! 3. Both dimensions are scaled by the ratio and truncated.
//! 4. Unconstrained axes take the resized dimension as their target.
//! 5. A window of the target size is centered on the resized image. Bounds
//!    are rounded half-to-even and clamped to `0` and `dimension - 1`.
use std::io::Cursor;

use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    },
    imageops::FilterType,
    ColorType, DynamicImage, ImageFormat, ImageReader,
};
use tracing::instrument;

use crate::transformation_params::{Quality, TransformSpec};

/// Failures while decoding, resizing or encoding.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Decoding or encoding failed.
    #[error(transparent)]
    Image(#[from] image::error::ImageError),

    /// The decoded image has no pixels on at least one axis.
    #[error("image has a zero dimension ({0})")]
    ZeroDimension(Dimensions),

    /// Scaling truncated an axis to zero.
    #[error("resizing {original} by {ratio} leaves no pixels")]
    EmptyResize {
        /// Size before scaling.
        original: Dimensions,
        /// Scale factor applied.
        ratio: f64,
    },

    /// The clamped crop window has no area.
    #[error("crop window {0:?} is empty")]
    EmptyCrop(CropWindow),

    /// No encoder is wired up for the format.
    #[error("cannot encode images as {0:?}")]
    UnsupportedFormat(ImageFormat),
}

/// Width and height of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of `image`.
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Crop box in resized-image coordinates; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    /// First column kept.
    pub left: u32,
    /// First row kept.
    pub top: u32,
    /// Column after the last one kept.
    pub right: u32,
    /// Row after the last one kept.
    pub bottom: u32,
}

impl CropWindow {
    /// Width of the window.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height of the window.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Geometry of a single derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformPlan {
    /// Uniform scale factor, at most `1.0`.
    pub ratio: f64,
    /// Dimensions after scaling.
    pub resized: Dimensions,
    /// Window cut out of the scaled image.
    pub crop: CropWindow,
}

/// Computes the resize and crop for an `original` of the given size.
pub fn plan(original: Dimensions, spec: &TransformSpec) -> Result<TransformPlan, TransformError> {
    if original.width == 0 || original.height == 0 {
        return Err(TransformError::ZeroDimension(original));
    }

    let w_ratio = f64::from(spec.width) / f64::from(original.width);
    let h_ratio = f64::from(spec.height) / f64::from(original.height);
    let ratio = w_ratio.max(h_ratio).min(1.0);

    // Truncation toward zero is intended.
    let resized = Dimensions {
        width: (f64::from(original.width) * ratio) as u32,
        height: (f64::from(original.height) * ratio) as u32,
    };
    if resized.width == 0 || resized.height == 0 {
        return Err(TransformError::EmptyResize { original, ratio });
    }

    let target_width = match spec.width {
        0 => resized.width,
        width => width,
    };
    let target_height = match spec.height {
        0 => resized.height,
        height => height,
    };

    let (left, right) = centered_span(resized.width, target_width);
    let (top, bottom) = centered_span(resized.height, target_height);
    let crop = CropWindow {
        left,
        top,
        right,
        bottom,
    };
    if crop.is_empty() {
        return Err(TransformError::EmptyCrop(crop));
    }

    Ok(TransformPlan {
        ratio,
        resized,
        crop,
    })
}

/// `[start, end)` of a `target`-long span centered in `dimension`, clamped
/// to `[0, dimension - 1]`. `dimension` must be non-zero.
fn centered_span(dimension: u32, target: u32) -> (u32, u32) {
    let mid = f64::from(dimension) / 2.0;
    let half = f64::from(target) / 2.0;

    let start = (mid - half).round_ties_even().max(0.0);
    let end = (mid + half).round_ties_even();
    let last = f64::from(dimension - 1);
    let end = if end >= f64::from(dimension) { last } else { end };

    (start as u32, end as u32)
}

/// Encoded derivative.
#[derive(Debug)]
pub struct DerivedImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Format the bytes are encoded in.
    pub format: ImageFormat,
    /// Dimensions of the encoded raster.
    pub dimensions: Dimensions,
}

impl DerivedImage {
    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing was encoded.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decodes `image_bytes`, shrinks and crops it according to `spec`, and
/// re-encodes it in its own format.
///
/// The format is sniffed from the bytes; `declared_format` is used when
/// sniffing is inconclusive or yields a format that cannot be re-encoded.
#[instrument(skip(image_bytes), fields(len = image_bytes.len()), err)]
pub fn transform_image(
    image_bytes: &[u8],
    declared_format: ImageFormat,
    spec: &TransformSpec,
) -> Result<DerivedImage, TransformError> {
    let mut image_reader = ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|err| TransformError::Image(image::error::ImageError::IoError(err)))?;

    let format = match image_reader.format() {
        Some(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
        Some(_) => declared_format,
        None => {
            image_reader.set_format(declared_format);
            declared_format
        }
    };

    let original = image_reader.decode()?;
    let plan = plan(Dimensions::of(&original), spec)?;
    tracing::debug!(
        original = %Dimensions::of(&original),
        resized = %plan.resized,
        crop = ?plan.crop,
        ratio = plan.ratio,
        "planned transform"
    );

    let resized = if plan.resized == Dimensions::of(&original) {
        original
    } else {
        let resized = original.resize_exact(
            plan.resized.width,
            plan.resized.height,
            FilterType::Lanczos3,
        );
        drop(original);
        resized
    };

    let crop = plan.crop;
    let cropped = resized.crop_imm(crop.left, crop.top, crop.width(), crop.height());
    drop(resized);

    let bytes = encode(&cropped, format, spec.quality)?;

    Ok(DerivedImage {
        bytes,
        format,
        dimensions: Dimensions::of(&cropped),
    })
}

fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: Quality,
) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            // Standard Huffman tables: the encoder has no optimizing mode.
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            match image.color() {
                ColorType::L8 | ColorType::Rgb8 => image.write_with_encoder(encoder)?,
                _ => image.to_rgb8().write_with_encoder(encoder)?,
            }
        }
        // Quality does not apply to PNG.
        ImageFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            image.write_with_encoder(encoder)?;
        }
        other => return Err(TransformError::UnsupportedFormat(other)),
    }

    Ok(buf)
}
