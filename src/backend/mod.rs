//! Rendering collaborators
//!
//! The desktop never talks to a graphics API directly. Texture storage,
//! shader compilation and draw submission live behind the traits in this
//! module so the composition logic can run against a real GPU backend or
//! the software [`headless`] backend.

use anyhow::Result;
use std::sync::Arc;

use crate::renderer::damage::{DamageRect, DesktopRects};
use crate::renderer::uniform::{Uniform, UniformLocation};
use crate::renderer::{FrameBuffer, HandoffHandle, PixelFormat};

pub mod headless;

/// How frame data reaches a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Frames are imported by reference from a shared buffer handle
    ZeroCopy,
    /// Frames are copied from host memory
    Buffered,
}

/// Result of running the texture's pending work (upload + filter passes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureStatus {
    Ok,
    /// Nothing new to show yet
    NotReady,
    Error(String),
}

/// Handle to a filter pass attached to a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub usize);

/// Shader programs known to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Final desktop composition
    Desktop,
    /// FidelityFX FSR 1 edge adaptive upsampling
    FsrEasu,
    /// FidelityFX FSR 1 robust contrast adaptive sharpening
    FsrRcas,
    /// FidelityFX contrast adaptive sharpening
    Cas,
}

impl ShaderKind {
    /// Names of the (vertex, fragment) sources the program is linked from
    pub fn sources(self) -> (&'static str, &'static str) {
        match self {
            ShaderKind::Desktop => ("desktop.vert", "desktop_rgb.frag"),
            ShaderKind::FsrEasu => ("basic.vert", "ffx_fsr1_easu.frag"),
            ShaderKind::FsrRcas => ("basic.vert", "ffx_fsr1_rcas.frag"),
            ShaderKind::Cas => ("basic.vert", "ffx_cas.frag"),
        }
    }
}

/// A linked shader program
pub trait ShaderProgram: Send + Sync {
    fn kind(&self) -> ShaderKind;

    /// Look up a uniform by name
    fn uniform_location(&self, name: &str) -> UniformLocation;

    /// Store uniform values; they are applied the next time the program is used
    fn set_uniforms(&self, uniforms: &[Uniform]);

    fn use_program(&self);
}

/// The texture holding the desktop image and its post-process passes
pub trait TextureResource: Send {
    fn kind(&self) -> TextureKind;

    fn setup(&mut self, format: PixelFormat, width: u32, height: u32, pitch: u32) -> Result<()>;

    /// Import a frame by reference
    fn update_from_handoff(&mut self, frame: &FrameBuffer, handle: HandoffHandle) -> Result<()>;

    /// Copy a frame from host memory. `None` damage means the whole frame.
    fn update_from_buffer(
        &mut self,
        frame: &FrameBuffer,
        damage: Option<&[DamageRect]>,
    ) -> Result<()>;

    fn bind(&mut self);

    /// Size of the image after all active filter passes
    fn final_size(&self) -> (u32, u32);

    fn add_filter(&mut self, program: Arc<dyn ShaderProgram>, enabled: bool) -> FilterHandle;

    fn enable_filter(&mut self, handle: FilterHandle, enabled: bool);

    /// Output resolution of a pass; (0, 0) renders at the input resolution
    fn set_filter_resolution(&mut self, handle: FilterHandle, width: u32, height: u32);

    /// Run pending uploads and filter passes
    fn process(&mut self) -> TextureStatus;

    /// Force the filter passes to run again on the current image
    fn invalidate(&mut self);
}

/// Factory and draw surface for the desktop renderer
pub trait RenderBackend: Send {
    fn create_texture(&mut self, kind: TextureKind) -> Result<Box<dyn TextureResource>>;

    fn compile_shader(&mut self, kind: ShaderKind) -> Result<Arc<dyn ShaderProgram>>;

    /// Draw the damage mesh with the bound texture and the program in use
    fn draw_rects(&mut self, mesh: &DesktopRects);
}
