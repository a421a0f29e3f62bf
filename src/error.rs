//! Error types for the desktop renderer
//!
//! Collaborators (texture resources, shader programs, the render backend)
//! report failures through `anyhow`. The desktop wraps those failures into
//! [`DesktopError`] so callers can tell a fatal setup problem from the
//! one-shot zero-copy downgrade or a rejected setting.

use thiserror::Error;

use crate::renderer::FrameType;

/// Errors surfaced by the desktop facade
#[derive(Debug, Error)]
pub enum DesktopError {
    /// Resource allocation or shader build failure while constructing the desktop
    #[error("failed to initialize {what}: {reason}")]
    Init { what: &'static str, reason: String },

    /// Zero-copy import failure. Recovered internally by downgrading to the
    /// buffered path; kept as the reason, see `Desktop::transfer_error`.
    #[error("zero-copy import failed: {0}")]
    Transfer(String),

    /// Buffered upload failure; there is no further fallback
    #[error("buffered upload failed: {0}")]
    Upload(String),

    /// The texture rejected the negotiated format
    #[error("failed to setup the desktop texture: {0}")]
    Setup(String),

    #[error("unsupported frame format {0:?}")]
    UnsupportedFormat(FrameType),

    /// A frame arrived before any format was negotiated
    #[error("no frame format has been negotiated")]
    NotConfigured,

    #[error("invalid {key} value {value} for the {stage} filter")]
    InvalidParameter {
        stage: &'static str,
        key: &'static str,
        value: f32,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration validation failures
///
/// A rejected value never replaces the previously accepted one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid scale algorithm number: {0}")]
    InvalidScaleAlgorithm(i64),

    #[error("{section}:{key}: {message}")]
    OutOfRange {
        section: String,
        key: String,
        message: String,
    },

    #[error("unknown option {section}:{key}")]
    UnknownOption { section: String, key: String },

    #[error("{section}:{key} expects a {expected} value")]
    TypeMismatch {
        section: String,
        key: String,
        expected: &'static str,
    },
}

pub type DesktopResult<T> = std::result::Result<T, DesktopError>;
