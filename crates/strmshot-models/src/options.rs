//! Batch options accepted at the API boundary.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Upper bound on the `start` position in seconds.
pub const START_MAX_SECS: f64 = 5.0;
/// Fraction of the duration used by the `start` position.
pub const START_FRACTION: f64 = 0.05;
/// Fraction of the duration used by the `middle` position.
pub const MIDDLE_FRACTION: f64 = 0.5;
/// Fraction of the duration used by the `end` position.
pub const END_FRACTION: f64 = 0.95;
/// Lower bound (exclusive) of the `auto` window.
pub const AUTO_MIN_FRACTION: f64 = 0.1;
/// Upper bound (exclusive) of the `auto` window.
pub const AUTO_MAX_FRACTION: f64 = 0.9;

/// Default JPEG quality (1-100).
pub const DEFAULT_QUALITY: u8 = 85;

/// What to do when the thumbnail for a source already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverwriteMode {
    /// Leave existing thumbnails alone and report the job as skipped
    #[default]
    SkipExisting,
    /// Always regenerate
    Always,
}

impl OverwriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverwriteMode::SkipExisting => "skip-existing",
            OverwriteMode::Always => "always",
        }
    }
}

impl fmt::Display for OverwriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the video the frame is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(try_from = "PositionRepr", into = "PositionRepr")]
pub enum ThumbnailPosition {
    /// min(5s, 5% of duration)
    Start,
    /// 50% of duration
    Middle,
    /// 95% of duration
    End,
    /// Uniformly random point strictly between 10% and 90%
    #[default]
    Auto,
    /// Explicit offset in seconds
    At(f64),
}

/// Error returned for an unrecognised position value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid thumbnail position '{0}': expected start, middle, end, auto or a non-negative number of seconds")]
pub struct InvalidPosition(pub String);

impl ThumbnailPosition {
    /// Parse a position keyword or a numeric offset.
    pub fn parse(value: &str) -> Result<Self, InvalidPosition> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "middle" => Ok(Self::Middle),
            "end" => Ok(Self::End),
            "auto" => Ok(Self::Auto),
            other => other
                .parse::<f64>()
                .ok()
                .and_then(|secs| Self::seconds(secs).ok())
                .ok_or_else(|| InvalidPosition(value.to_string())),
        }
    }

    /// Build an explicit offset, rejecting negative and non-finite values.
    pub fn seconds(secs: f64) -> Result<Self, InvalidPosition> {
        if secs.is_finite() && secs >= 0.0 {
            Ok(Self::At(secs))
        } else {
            Err(InvalidPosition(secs.to_string()))
        }
    }

    /// Compute the extraction offset for a video of `duration` seconds.
    ///
    /// `unit` must lie in the open interval (0, 1); it is only consulted by
    /// [`ThumbnailPosition::Auto`]. Explicit offsets are clamped into
    /// `[0, duration * END_FRACTION]` so the seek never lands past the
    /// last decodable frame.
    pub fn offset(&self, duration: f64, unit: f64) -> f64 {
        match self {
            Self::Start => (duration * START_FRACTION).min(START_MAX_SECS),
            Self::Middle => duration * MIDDLE_FRACTION,
            Self::End => duration * END_FRACTION,
            Self::Auto => {
                let lo = duration * AUTO_MIN_FRACTION;
                let hi = duration * AUTO_MAX_FRACTION;
                lo + (hi - lo) * unit
            }
            Self::At(secs) => secs.clamp(0.0, duration * END_FRACTION),
        }
    }
}

impl fmt::Display for ThumbnailPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Middle => f.write_str("middle"),
            Self::End => f.write_str("end"),
            Self::Auto => f.write_str("auto"),
            Self::At(secs) => write!(f, "{}", secs),
        }
    }
}

/// Wire form of [`ThumbnailPosition`]: a keyword, a number, or a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionRepr {
    Seconds(f64),
    Keyword(String),
}

impl TryFrom<PositionRepr> for ThumbnailPosition {
    type Error = InvalidPosition;

    fn try_from(repr: PositionRepr) -> Result<Self, Self::Error> {
        match repr {
            PositionRepr::Seconds(secs) => Self::seconds(secs),
            PositionRepr::Keyword(s) => Self::parse(&s),
        }
    }
}

impl From<ThumbnailPosition> for PositionRepr {
    fn from(position: ThumbnailPosition) -> Self {
        match position {
            ThumbnailPosition::At(secs) => PositionRepr::Seconds(secs),
            other => PositionRepr::Keyword(other.to_string()),
        }
    }
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

/// Options for one batch request.
///
/// Unknown fields are rejected so typos surface as errors instead of being
/// silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchOptions {
    #[serde(default)]
    pub overwrite_mode: OverwriteMode,

    #[serde(default)]
    pub position: ThumbnailPosition,

    /// JPEG quality, 1 (worst) to 100 (best)
    #[serde(default = "default_quality")]
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,

    /// Write artifacts here instead of next to the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,

    /// Requested concurrency; the orchestrator may adjust it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub concurrency: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            overwrite_mode: OverwriteMode::default(),
            position: ThumbnailPosition::default(),
            quality: DEFAULT_QUALITY,
            output_directory: None,
            concurrency: None,
        }
    }
}

impl BatchOptions {
    /// Map quality (1-100) onto the MJPEG `-q:v` scale (31 worst, 2 best).
    pub fn jpeg_qscale(&self) -> u8 {
        let quality = self.quality.clamp(1, 100) as f64;
        let scale = 2.0 + (100.0 - quality) * 29.0 / 99.0;
        scale.round() as u8
    }
}
