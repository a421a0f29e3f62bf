//! Sampling algorithm selection
//!
//! The desktop shader samples the frame either with nearest-neighbour or
//! bilinear filtering. In automatic mode the choice follows the direction of
//! scaling: nearest keeps pixels crisp when the image is shown at or above its
//! native size, linear avoids shimmering when it is shrunk.

use crate::error::ConfigError;

/// User-configurable sampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleAlgorithm {
    /// Pick per frame from the scale direction
    #[default]
    Auto = 0,
    Nearest = 1,
    Linear = 2,
}

impl ScaleAlgorithm {
    /// Number of valid algorithm indices
    pub const COUNT: i64 = 3;

    pub const ALL: [ScaleAlgorithm; 3] = [
        ScaleAlgorithm::Auto,
        ScaleAlgorithm::Nearest,
        ScaleAlgorithm::Linear,
    ];

    /// Index stored in configuration and passed to the shader
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Human readable name shown by the configuration panel
    pub fn name(self) -> &'static str {
        match self {
            ScaleAlgorithm::Auto => "Automatic (downscale: linear, upscale: nearest)",
            ScaleAlgorithm::Nearest => "Nearest",
            ScaleAlgorithm::Linear => "Linear",
        }
    }
}

impl TryFrom<i64> for ScaleAlgorithm {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScaleAlgorithm::Auto),
            1 => Ok(ScaleAlgorithm::Nearest),
            2 => Ok(ScaleAlgorithm::Linear),
            other => Err(ConfigError::InvalidScaleAlgorithm(other)),
        }
    }
}

/// Direction of scaling detected by the window layer for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleType {
    NoScale,
    Upscale,
    Downscale,
}

/// Resolve the scale type actually in effect.
///
/// The filter chain can emit a texture larger than the logical desktop. When
/// that happens the desktop shader is shrinking that texture, whatever the
/// window layer reported.
pub fn resolve_scale_type(
    detected: ScaleType,
    final_size: (u32, u32),
    logical_size: (u32, u32),
) -> ScaleType {
    if final_size.0 > logical_size.0 || final_size.1 > logical_size.1 {
        ScaleType::Downscale
    } else {
        detected
    }
}

/// Decide the effective sampling algorithm for one frame.
pub fn select(
    configured: ScaleAlgorithm,
    detected: ScaleType,
    final_size: (u32, u32),
    logical_size: (u32, u32),
) -> ScaleAlgorithm {
    let scale_type = resolve_scale_type(detected, final_size, logical_size);

    match configured {
        ScaleAlgorithm::Auto => match scale_type {
            ScaleType::NoScale | ScaleType::Upscale => ScaleAlgorithm::Nearest,
            ScaleType::Downscale => ScaleAlgorithm::Linear,
        },
        explicit => explicit,
    }
}
