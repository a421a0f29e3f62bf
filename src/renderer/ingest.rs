//! Frame ingestion
//!
//! Frames reach the desktop texture either by zero-copy import of a shared
//! buffer or by copying from host memory. Zero-copy is preferred; the first
//! import failure switches the surface to the buffered path for the rest of
//! its life. The switch rebuilds the texture for buffered uploads, re-attaches
//! the filter chain and re-runs setup before the swap, so a render never sees
//! a disposed texture without its replacement.

use log::{debug, info, warn};

use crate::backend::{RenderBackend, TextureKind, TextureResource};
use crate::error::{DesktopError, DesktopResult};
use crate::renderer::damage::DamageRect;
use crate::renderer::filter::FilterChain;

/// Frame types the capture side can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Invalid,
    Bgra,
    Rgba,
    Rgba10,
    Rgba16F,
    Yuv420,
}

/// Pixel formats the desktop texture can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit BGRA
    Bgra,
    /// 8-bit RGBA
    Rgba,
    /// 10-bit packed RGBA
    Rgba10,
    /// 16-bit floating point RGBA
    Rgba16F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Rgba10 => 4,
            PixelFormat::Rgba16F => 8,
        }
    }
}

impl TryFrom<FrameType> for PixelFormat {
    type Error = DesktopError;

    fn try_from(frame_type: FrameType) -> Result<Self, Self::Error> {
        match frame_type {
            FrameType::Bgra => Ok(PixelFormat::Bgra),
            FrameType::Rgba => Ok(PixelFormat::Rgba),
            FrameType::Rgba10 => Ok(PixelFormat::Rgba10),
            FrameType::Rgba16F => Ok(PixelFormat::Rgba16F),
            other => Err(DesktopError::UnsupportedFormat(other)),
        }
    }
}

/// Negotiated frame layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub frame_type: FrameType,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub pitch: u32,
}

/// A decoded frame in host memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Shared buffer descriptor for zero-copy import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandoffHandle(pub i32);

/// Transfer path currently used by a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPath {
    ZeroCopy,
    Buffered,
}

impl From<TransferPath> for TextureKind {
    fn from(path: TransferPath) -> Self {
        match path {
            TransferPath::ZeroCopy => TextureKind::ZeroCopy,
            TransferPath::Buffered => TextureKind::Buffered,
        }
    }
}

/// Owner of the desktop texture and its transfer path
pub struct FrameIngest {
    texture: Box<dyn TextureResource>,
    /// Path of the texture currently held
    path: TransferPath,
    format: Option<FrameFormat>,
    /// First zero-copy failure; once set, imports are never attempted again
    transfer_error: Option<DesktopError>,
}

impl FrameIngest {
    pub fn new(backend: &mut dyn RenderBackend, zero_copy: bool) -> DesktopResult<Self> {
        let path = if zero_copy {
            TransferPath::ZeroCopy
        } else {
            TransferPath::Buffered
        };

        let texture = backend
            .create_texture(path.into())
            .map_err(|e| DesktopError::Init {
                what: "the desktop texture",
                reason: format!("{:#}", e),
            })?;

        info!("🖼️ Desktop texture ready ({:?} transfer)", path);
        Ok(Self {
            texture,
            path,
            format: None,
            transfer_error: None,
        })
    }

    pub fn path(&self) -> TransferPath {
        self.path
    }

    /// Why zero-copy imports were abandoned, if they were
    pub fn transfer_error(&self) -> Option<&DesktopError> {
        self.transfer_error.as_ref()
    }

    /// Last successfully negotiated format
    pub fn format(&self) -> Option<&FrameFormat> {
        self.format.as_ref()
    }

    pub fn texture(&self) -> &dyn TextureResource {
        self.texture.as_ref()
    }

    pub fn texture_mut(&mut self) -> &mut dyn TextureResource {
        self.texture.as_mut()
    }

    /// Configure the texture for a new frame format
    pub fn setup(&mut self, format: FrameFormat) -> DesktopResult<()> {
        setup_texture(self.texture.as_mut(), &format)?;
        self.format = Some(format);
        Ok(())
    }

    /// Push one frame into the texture.
    ///
    /// `handoff` is only used while the surface is still on the zero-copy
    /// path. A failed import downgrades the surface and the same frame is
    /// then uploaded through host memory. If the buffered texture cannot be
    /// built the error is returned and the rebuild is retried on the next
    /// frame; imports are not. A failed buffered upload is fatal.
    pub fn ingest(
        &mut self,
        backend: &mut dyn RenderBackend,
        filters: &mut FilterChain,
        frame: &FrameBuffer,
        handoff: Option<HandoffHandle>,
        damage: Option<&[DamageRect]>,
    ) -> DesktopResult<()> {
        if self.format.is_none() {
            return Err(DesktopError::NotConfigured);
        }

        if self.transfer_error.is_none() && self.path == TransferPath::ZeroCopy {
            if let Some(handle) = handoff {
                match self.texture.update_from_handoff(frame, handle) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        let cause = DesktopError::Transfer(format!("{:#}", e));
                        warn!("{}, disabling zero-copy imports", cause);
                        self.transfer_error = Some(cause);
                    }
                }
            }
        }

        if self.transfer_error.is_some() && self.path == TransferPath::ZeroCopy {
            self.downgrade(backend, filters)?;
        }

        self.texture
            .update_from_buffer(frame, damage)
            .map_err(|e| DesktopError::Upload(format!("{:#}", e)))
    }

    /// Switch to buffered transfer. The replacement texture is fully
    /// prepared before the old one is released; on failure nothing changes.
    fn downgrade(
        &mut self,
        backend: &mut dyn RenderBackend,
        filters: &mut FilterChain,
    ) -> DesktopResult<()> {
        let mut replacement = backend
            .create_texture(TextureKind::Buffered)
            .map_err(|e| DesktopError::Init {
                what: "the buffered desktop texture",
                reason: format!("{:#}", e),
            })?;

        filters.attach(replacement.as_mut());
        if let Some(format) = &self.format {
            setup_texture(replacement.as_mut(), format)?;
        }

        self.texture = replacement;
        self.path = TransferPath::Buffered;
        info!("🔁 Desktop texture switched to buffered transfer");
        Ok(())
    }
}

fn setup_texture(texture: &mut dyn TextureResource, format: &FrameFormat) -> DesktopResult<()> {
    let pixel_format = PixelFormat::try_from(format.frame_type)?;

    texture
        .setup(pixel_format, format.width, format.height, format.pitch)
        .map_err(|e| DesktopError::Setup(format!("{:#}", e)))?;

    debug!(
        "Desktop texture setup: {:?} {}x{} pitch {}",
        pixel_format, format.width, format.height, format.pitch
    );
    Ok(())
}
