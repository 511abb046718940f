use std::{
    num::{IntErrorKind, ParseIntError},
    str::FromStr,
};

/// Target width in pixels; zero leaves the axis unconstrained.
pub type Width = u32;
/// Target height in pixels; zero leaves the axis unconstrained.
pub type Height = u32;
/// Encoder quality, meaningful for JPEG only.
pub type Quality = u8;

/// Quality used when a request does not specify `q`.
pub const DEFAULT_QUALITY: Quality = 75;

const MIN_QUALITY: i64 = 1;
const MAX_QUALITY: i64 = 95;

/// Errors raised while parsing a query string.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    /// A `w`, `h` or `q` value was not an integer in range.
    #[error("invalid value {value:?} for query parameter `{key}`")]
    MalformedInteger {
        /// Query parameter name.
        key: String,
        /// Raw value as received.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: ParseIntError,
    },
}

/// Named width presets selected with the `s` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePreset {
    /// `s`: 200 pixels wide.
    Small,
    /// `m`: 400 pixels wide.
    Medium,
    /// `l`: 600 pixels wide.
    Large,
}

impl SizePreset {
    /// Width the preset constrains the derivative to.
    pub const fn width(self) -> Width {
        match self {
            SizePreset::Small => 200,
            SizePreset::Medium => 400,
            SizePreset::Large => 600,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "s" => Some(SizePreset::Small),
            "m" => Some(SizePreset::Medium),
            "l" => Some(SizePreset::Large),
            _ => None,
        }
    }
}

/// Raw transformation parameters as found in a query string.
///
/// A zero width or height means the axis is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationParams {
    /// Value of `w`.
    pub width: Width,
    /// Value of `h`.
    pub height: Height,
    /// Value of `q`, already clamped.
    pub quality: Quality,
    /// Recognized `s` token, if any.
    pub size: Option<SizePreset>,
}

impl Default for TransformationParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            quality: DEFAULT_QUALITY,
            size: None,
        }
    }
}

impl TransformationParams {
    /// Normalizes the parameters into a [`TransformSpec`].
    ///
    /// A size preset only applies when neither width nor height was given.
    /// Returns `None` when no axis ends up constrained, in which case the
    /// original must be served unmodified.
    pub fn resolve(&self) -> Option<TransformSpec> {
        let mut width = self.width;
        let height = self.height;

        if width == 0 && height == 0 {
            if let Some(size) = self.size {
                width = size.width();
            }
        }

        if width == 0 && height == 0 {
            return None;
        }

        Some(TransformSpec {
            width,
            height,
            quality: self.quality,
        })
    }
}

/// Parses an integer, saturating to `min`/`max` when a well-formed value is
/// out of range for `T`.
fn parse_int<T>(key: &str, value: &str, min: T, max: T) -> Result<T, ParamsError>
where
    T: FromStr<Err = ParseIntError>,
{
    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(source) => match source.kind() {
            IntErrorKind::PosOverflow => Ok(max),
            IntErrorKind::NegOverflow => Ok(min),
            _ => Err(ParamsError::MalformedInteger {
                key: key.to_owned(),
                value: value.to_owned(),
                source,
            }),
        },
    }
}

impl FromStr for TransformationParams {
    type Err = ParamsError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let mut params = Self::default();

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };

            match key {
                "w" => params.width = parse_int(key, value, Width::MIN, Width::MAX)?,
                "h" => params.height = parse_int(key, value, Height::MIN, Height::MAX)?,
                "q" => {
                    let quality = parse_int(key, value, i64::MIN, i64::MAX)?;
                    // Clamped into 1..=95, so the narrowing cannot truncate.
                    params.quality = quality.clamp(MIN_QUALITY, MAX_QUALITY) as Quality;
                }
                "s" => params.size = SizePreset::from_token(value),
                _ => {}
            }
        }

        Ok(params)
    }
}

/// Normalized resize request: at least one of `width` and `height` is
/// non-zero, and `quality` lies in `1..=95`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSpec {
    /// Target width.
    pub width: Width,
    /// Target height.
    pub height: Height,
    /// Encoder quality.
    pub quality: Quality,
}

impl std::fmt::Display for TransformSpec {
    /// Writes the key tag, e.g. `h300w400q75_`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.height != 0 {
            write!(f, "h{}", self.height)?;
        }
        if self.width != 0 {
            write!(f, "w{}", self.width)?;
        }
        write!(f, "q{}_", self.quality)
    }
}
