//! # Lumen Desktop Compositing Library
//!
//! Composites a remote desktop frame into a local window: frame ingestion
//! with zero-copy import and buffered fallback, FidelityFX post-processing,
//! sampling algorithm selection, damage-driven geometry and the night vision
//! display mode.
//!
//! ## Architecture
//!
//! - `renderer`: The [`Desktop`] facade and its building blocks
//! - `backend`: Texture, shader and draw collaborators, plus a software
//!   headless implementation
//! - `config`: Option registry, validation and TOML persistence
//! - `input`: Keybinds, desktop events and the host notifier
//! - `panel`: Snapshot and commands for the configuration panel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumen::backend::headless::HeadlessBackend;
//! use lumen::config::DesktopOptions;
//! use lumen::input::LogHost;
//! use lumen::renderer::{Desktop, FrameFormat, FrameType, RenderParams};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut desktop = Desktop::new(
//!         Box::new(HeadlessBackend::new()),
//!         Arc::new(LogHost),
//!         &DesktopOptions::default(),
//!     )?;
//!     desktop.setup(FrameFormat {
//!         frame_type: FrameType::Bgra,
//!         width: 1920,
//!         height: 1080,
//!         pitch: 7680,
//!     })?;
//!     desktop.render(&RenderParams::default(), None);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod panel;
pub mod renderer;

// Re-export main types for easy access
pub use config::{DesktopOptions, OptionStore};
pub use error::{ConfigError, DesktopError, DesktopResult};
pub use renderer::{Desktop, RenderParams, RenderReport, SharedDesktop};
