//! Software rendering backend
//!
//! Implements the rendering collaborators in host memory. Uploads really
//! copy pixels (honouring pitch and damage), filter passes only affect the
//! reported output size, and draws are counted. A [`HeadlessMonitor`] shares
//! the backend state so callers can inject failures and read statistics after
//! the backend has been handed to a desktop.

use anyhow::{bail, Result};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    FilterHandle, RenderBackend, ShaderKind, ShaderProgram, TextureKind, TextureResource,
    TextureStatus,
};
use crate::renderer::damage::{DamageRect, DesktopRects};
use crate::renderer::uniform::{Uniform, UniformLocation, UniformValue};
use crate::renderer::{FrameBuffer, HandoffHandle, PixelFormat};

/// Counters collected by the headless backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessStats {
    pub textures_created: Vec<TextureKind>,
    pub shaders_compiled: Vec<ShaderKind>,
    pub filters_attached: u64,
    pub zero_copy_imports: u64,
    pub zero_copy_failures: u64,
    pub buffered_uploads: u64,
    pub uploaded_bytes: u64,
    pub processed: u64,
    pub invalidations: u64,
    pub draws: u64,
    pub drawn_rects: u64,
}

#[derive(Debug, Default)]
struct HeadlessState {
    stats: HeadlessStats,
    fail_zero_copy: bool,
    fail_buffered: bool,
    fail_texture: Option<TextureKind>,
    fail_shader: Option<ShaderKind>,
    process_error: Option<String>,
    uniforms: HashMap<(ShaderKind, &'static str), UniformValue>,
}

type SharedState = Arc<Mutex<HeadlessState>>;

/// Control and inspection handle for a [`HeadlessBackend`]
#[derive(Debug, Clone)]
pub struct HeadlessMonitor {
    state: SharedState,
}

impl HeadlessMonitor {
    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats.clone()
    }

    pub fn set_fail_zero_copy(&self, fail: bool) {
        self.state.lock().fail_zero_copy = fail;
    }

    pub fn set_fail_buffered(&self, fail: bool) {
        self.state.lock().fail_buffered = fail;
    }

    pub fn set_fail_texture(&self, kind: Option<TextureKind>) {
        self.state.lock().fail_texture = kind;
    }

    pub fn set_fail_shader(&self, kind: Option<ShaderKind>) {
        self.state.lock().fail_shader = kind;
    }

    /// Make every `process` call report this error until cleared
    pub fn set_process_error(&self, error: Option<&str>) {
        self.state.lock().process_error = error.map(str::to_string);
    }

    /// Last value uploaded to a named uniform of a program
    pub fn uniform(&self, kind: ShaderKind, name: &str) -> Option<UniformValue> {
        self.state
            .lock()
            .uniforms
            .iter()
            .find(|((k, n), _)| *k == kind && *n == name)
            .map(|(_, v)| *v)
    }
}

/// Host-memory implementation of [`RenderBackend`]
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: SharedState,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monitor(&self) -> HeadlessMonitor {
        HeadlessMonitor {
            state: self.state.clone(),
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, kind: TextureKind) -> Result<Box<dyn TextureResource>> {
        let mut state = self.state.lock();
        if state.fail_texture == Some(kind) {
            bail!("out of texture memory");
        }
        state.stats.textures_created.push(kind);
        debug!("Created headless {:?} texture", kind);

        Ok(Box::new(HeadlessTexture::new(kind, self.state.clone())))
    }

    fn compile_shader(&mut self, kind: ShaderKind) -> Result<Arc<dyn ShaderProgram>> {
        let mut state = self.state.lock();
        if state.fail_shader == Some(kind) {
            let (vertex, fragment) = kind.sources();
            bail!("failed to link {} + {}", vertex, fragment);
        }
        state.stats.shaders_compiled.push(kind);

        Ok(Arc::new(HeadlessProgram {
            kind,
            state: self.state.clone(),
        }))
    }

    fn draw_rects(&mut self, mesh: &DesktopRects) {
        let mut state = self.state.lock();
        state.stats.draws += 1;
        state.stats.drawn_rects += mesh.rect_count() as u64;
    }
}

/// Uniform names each program declares, indexed by location
fn uniform_names(kind: ShaderKind) -> &'static [&'static str] {
    match kind {
        ShaderKind::Desktop => &[
            "transform",
            "desktopSize",
            "textureSize",
            "scaleAlgo",
            "nvGain",
            "cbMode",
        ],
        ShaderKind::FsrEasu => &[],
        ShaderKind::FsrRcas | ShaderKind::Cas => &["uSharpness"],
    }
}

struct HeadlessProgram {
    kind: ShaderKind,
    state: SharedState,
}

impl ShaderProgram for HeadlessProgram {
    fn kind(&self) -> ShaderKind {
        self.kind
    }

    fn uniform_location(&self, name: &str) -> UniformLocation {
        UniformLocation(
            uniform_names(self.kind)
                .iter()
                .position(|n| *n == name)
                .map(|i| i as u32),
        )
    }

    fn set_uniforms(&self, uniforms: &[Uniform]) {
        let names = uniform_names(self.kind);
        let mut state = self.state.lock();
        for uniform in uniforms {
            let Some(name) = uniform.location.0.and_then(|i| names.get(i as usize)) else {
                continue;
            };
            state.uniforms.insert((self.kind, *name), uniform.value);
        }
    }

    fn use_program(&self) {}
}

struct HeadlessFilter {
    enabled: bool,
    resolution: (u32, u32),
}

struct HeadlessTexture {
    kind: TextureKind,
    state: SharedState,
    layout: Option<(PixelFormat, u32, u32, u32)>,
    pixels: Vec<u8>,
    filters: Vec<HeadlessFilter>,
    has_frame: bool,
    final_size: (u32, u32),
}

impl HeadlessTexture {
    fn new(kind: TextureKind, state: SharedState) -> Self {
        Self {
            kind,
            state,
            layout: None,
            pixels: Vec::new(),
            filters: Vec::new(),
            has_frame: false,
            final_size: (0, 0),
        }
    }

    fn copy_rect(&mut self, src: &[u8], rect: DamageRect, bpp: u32, pitch: u32) -> u64 {
        let row_bytes = (rect.width * bpp) as usize;
        for row in rect.y..rect.y + rect.height {
            let offset = (row * pitch + rect.x * bpp) as usize;
            self.pixels[offset..offset + row_bytes]
                .copy_from_slice(&src[offset..offset + row_bytes]);
        }
        row_bytes as u64 * rect.height as u64
    }
}

impl TextureResource for HeadlessTexture {
    fn kind(&self) -> TextureKind {
        self.kind
    }

    fn setup(&mut self, format: PixelFormat, width: u32, height: u32, pitch: u32) -> Result<()> {
        if width == 0 || height == 0 {
            bail!("invalid texture size {}x{}", width, height);
        }
        if pitch < width * format.bytes_per_pixel() {
            bail!("pitch {} too small for {} pixels of {:?}", pitch, width, format);
        }

        self.layout = Some((format, width, height, pitch));
        self.pixels = vec![0; (pitch * height) as usize];
        self.final_size = (width, height);
        self.has_frame = false;
        Ok(())
    }

    fn update_from_handoff(&mut self, _frame: &FrameBuffer, handle: HandoffHandle) -> Result<()> {
        let mut state = self.state.lock();
        if self.kind != TextureKind::ZeroCopy {
            bail!("texture does not accept zero-copy imports");
        }
        if state.fail_zero_copy || handle.0 < 0 {
            state.stats.zero_copy_failures += 1;
            bail!("failed to import buffer {}", handle.0);
        }

        state.stats.zero_copy_imports += 1;
        self.has_frame = true;
        Ok(())
    }

    fn update_from_buffer(
        &mut self,
        frame: &FrameBuffer,
        damage: Option<&[DamageRect]>,
    ) -> Result<()> {
        if self.state.lock().fail_buffered {
            bail!("texture upload rejected");
        }
        let Some((format, width, height, pitch)) = self.layout else {
            bail!("texture has not been set up");
        };
        if frame.len() < (pitch * height) as usize {
            bail!("frame holds {} bytes, expected {}", frame.len(), pitch * height);
        }

        let full = [DamageRect::full(width, height)];
        let rects = match damage {
            Some(rects) if !rects.is_empty() => rects,
            _ => &full[..],
        };

        let bpp = format.bytes_per_pixel();
        let mut copied = 0;
        for rect in rects.iter().filter_map(|r| r.clamp_to(width, height)) {
            copied += self.copy_rect(frame.data(), rect, bpp, pitch);
        }

        let mut state = self.state.lock();
        state.stats.buffered_uploads += 1;
        state.stats.uploaded_bytes += copied;
        self.has_frame = true;
        Ok(())
    }

    fn bind(&mut self) {}

    fn final_size(&self) -> (u32, u32) {
        self.final_size
    }

    fn add_filter(&mut self, program: Arc<dyn ShaderProgram>, enabled: bool) -> FilterHandle {
        self.state.lock().stats.filters_attached += 1;
        debug!("Filter {:?} attached (enabled: {})", program.kind(), enabled);
        self.filters.push(HeadlessFilter {
            enabled,
            resolution: (0, 0),
        });
        FilterHandle(self.filters.len() - 1)
    }

    fn enable_filter(&mut self, handle: FilterHandle, enabled: bool) {
        if let Some(filter) = self.filters.get_mut(handle.0) {
            filter.enabled = enabled;
        }
    }

    fn set_filter_resolution(&mut self, handle: FilterHandle, width: u32, height: u32) {
        if let Some(filter) = self.filters.get_mut(handle.0) {
            filter.resolution = (width, height);
        }
    }

    fn process(&mut self) -> TextureStatus {
        let mut state = self.state.lock();
        if let Some(error) = &state.process_error {
            return TextureStatus::Error(error.clone());
        }
        let Some((_, width, height, _)) = self.layout else {
            return TextureStatus::NotReady;
        };
        if !self.has_frame {
            return TextureStatus::NotReady;
        }

        self.final_size = self
            .filters
            .iter()
            .filter(|f| f.enabled && f.resolution != (0, 0))
            .map(|f| f.resolution)
            .last()
            .unwrap_or((width, height));
        state.stats.processed += 1;
        TextureStatus::Ok
    }

    fn invalidate(&mut self) {
        self.state.lock().stats.invalidations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damaged_upload_copies_rows() {
        let mut backend = HeadlessBackend::new();
        let monitor = backend.monitor();
        let mut texture = backend.create_texture(TextureKind::Buffered).unwrap();
        texture.setup(PixelFormat::Rgba16F, 16, 16, 160).unwrap();

        let frame = FrameBuffer::new(vec![1; 160 * 16]);
        let damage = [DamageRect::new(2, 2, 4, 3), DamageRect::new(14, 14, 8, 8)];
        texture.update_from_buffer(&frame, Some(&damage)).unwrap();

        // 4x3 + clamped 2x2, 8 bytes per pixel
        assert_eq!(monitor.stats().uploaded_bytes, (12 + 4) * 8);
    }

    #[test]
    fn test_setup_rejects_short_pitch() {
        let mut backend = HeadlessBackend::new();
        let mut texture = backend.create_texture(TextureKind::Buffered).unwrap();
        assert!(texture.setup(PixelFormat::Bgra, 1920, 1080, 1920).is_err());
        assert!(texture.setup(PixelFormat::Bgra, 1920, 1080, 7680).is_ok());
    }

    #[test]
    fn test_short_frame_rejected() {
        let mut backend = HeadlessBackend::new();
        let mut texture = backend.create_texture(TextureKind::Buffered).unwrap();
        texture.setup(PixelFormat::Bgra, 4, 4, 16).unwrap();

        assert!(texture
            .update_from_buffer(&FrameBuffer::new(vec![0; 8]), None)
            .is_err());
    }

    #[test]
    fn test_process_reports_filter_output_size() {
        let mut backend = HeadlessBackend::new();
        let program = backend.compile_shader(ShaderKind::Cas).unwrap();
        let mut texture = backend.create_texture(TextureKind::Buffered).unwrap();
        texture.setup(PixelFormat::Bgra, 4, 4, 16).unwrap();

        assert_eq!(texture.process(), TextureStatus::NotReady);

        let handle = texture.add_filter(program, true);
        texture.set_filter_resolution(handle, 8, 8);
        texture
            .update_from_buffer(&FrameBuffer::new(vec![0; 64]), None)
            .unwrap();

        assert_eq!(texture.process(), TextureStatus::Ok);
        assert_eq!(texture.final_size(), (8, 8));

        texture.enable_filter(handle, false);
        texture.process();
        assert_eq!(texture.final_size(), (4, 4));
    }

    #[test]
    fn test_program_records_uniforms() {
        let mut backend = HeadlessBackend::new();
        let monitor = backend.monitor();
        let program = backend.compile_shader(ShaderKind::Cas).unwrap();

        let location = program.uniform_location("uSharpness");
        assert!(location.is_used());
        assert!(!program.uniform_location("missing").is_used());

        program.set_uniforms(&[Uniform::new(location, UniformValue::Float(0.5))]);
        assert_eq!(
            monitor.uniform(ShaderKind::Cas, "uSharpness"),
            Some(UniformValue::Float(0.5))
        );
    }
}
