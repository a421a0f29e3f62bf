//! Desktop renderer
//!
//! Composites the remote desktop frame into the window. Each refresh the
//! window layer calls [`Desktop::render`], which:
//! 1. Runs the texture's pending upload and filter passes
//! 2. Picks the sampling algorithm from the filtered texture size
//! 3. Rebuilds the transform and the damage mesh
//! 4. Uploads the desktop uniforms and draws
//!
//! Frames arrive separately through [`Desktop::update`]. Settings changes
//! (panel commands, keybinds, resizes) all go through `&mut Desktop`, so a
//! render always sees one consistent set of values; hosts that drive the
//! desktop from several threads share it as a [`SharedDesktop`].

use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::backend::{RenderBackend, ShaderKind, ShaderProgram, TextureStatus};
use crate::config::DesktopOptions;
use crate::error::{ConfigError, DesktopError, DesktopResult};
use crate::input::{AlertLevel, AppHost, DesktopEvent, KeyCode, KeybindMap};
use crate::panel::{FilterPanelState, PanelCommand, PanelState};

pub mod damage;
pub mod filter;
pub mod ingest;
pub mod night_vision;
pub mod scale;
pub mod transform;
pub mod uniform;

pub use ingest::{FrameBuffer, FrameFormat, FrameType, HandoffHandle, PixelFormat, TransferPath};

use damage::{DamageRect, DesktopRects};
use filter::{FilterChain, FilterParam, StageId};
use ingest::FrameIngest;
use night_vision::NightVision;
use scale::{ScaleAlgorithm, ScaleType};
use transform::{DesktopTransform, Rotation};
use uniform::{Uniform, UniformLocation, UniformValue};

/// A desktop shared between a render thread and a control thread
pub type SharedDesktop = Arc<Mutex<Desktop>>;

/// Placement of the desktop in the window for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Centre offset in clip space
    pub x: f32,
    pub y: f32,
    /// Half-extents in clip space
    pub scale_x: f32,
    pub scale_y: f32,
    /// Scale direction detected by the window layer
    pub scale_type: ScaleType,
    pub rotate: Rotation,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            scale_type: ScaleType::NoScale,
            rotate: Rotation::Rotate0,
        }
    }
}

/// What one render call did
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub status: TextureStatus,
    pub scale_type: ScaleType,
    pub scale_algorithm: ScaleAlgorithm,
    pub texture_size: (u32, u32),
    pub transform: DesktopTransform,
}

struct DesktopShader {
    program: Arc<dyn ShaderProgram>,
    transform: UniformLocation,
    desktop_size: UniformLocation,
    texture_size: UniformLocation,
    scale_algo: UniformLocation,
    nv_gain: UniformLocation,
    cb_mode: UniformLocation,
}

impl DesktopShader {
    fn new(backend: &mut dyn RenderBackend) -> DesktopResult<Self> {
        let program = backend
            .compile_shader(ShaderKind::Desktop)
            .map_err(|e| DesktopError::Init {
                what: "the generic desktop shader",
                reason: format!("{:#}", e),
            })?;

        Ok(Self {
            transform: program.uniform_location("transform"),
            desktop_size: program.uniform_location("desktopSize"),
            texture_size: program.uniform_location("textureSize"),
            scale_algo: program.uniform_location("scaleAlgo"),
            nv_gain: program.uniform_location("nvGain"),
            cb_mode: program.uniform_location("cbMode"),
            program,
        })
    }
}

/// The desktop surface: texture, filters, mesh and display settings
pub struct Desktop {
    backend: Box<dyn RenderBackend>,
    host: Arc<dyn AppHost>,
    ingest: FrameIngest,
    shader: DesktopShader,
    mesh: DesktopRects,
    filters: FilterChain,
    keybinds: KeybindMap,

    width: u32,
    height: u32,
    scale_algorithm: ScaleAlgorithm,
    night_vision: NightVision,
    cb_mode: i32,
}

impl Desktop {
    pub fn new(
        mut backend: Box<dyn RenderBackend>,
        host: Arc<dyn AppHost>,
        options: &DesktopOptions,
    ) -> DesktopResult<Self> {
        info!("🖥️ Initializing desktop renderer...");

        let mut ingest = FrameIngest::new(backend.as_mut(), options.zero_copy)?;
        let shader = DesktopShader::new(backend.as_mut())?;
        let mesh = DesktopRects::new(options.max_rects);

        let mut keybinds = KeybindMap::new();
        keybinds.register(
            KeyCode::N,
            DesktopEvent::ToggleNightVision,
            "Toggle night vision mode",
        );

        let mut filters =
            FilterChain::new(backend.as_mut(), &options.filters).map_err(|e| DesktopError::Init {
                what: "the filter shaders",
                reason: format!("{:#}", e),
            })?;
        filters.attach(ingest.texture_mut());

        info!("✅ Desktop renderer initialized");
        Ok(Self {
            backend,
            host,
            ingest,
            shader,
            mesh,
            filters,
            keybinds,
            width: 0,
            height: 0,
            scale_algorithm: options.scale_algorithm,
            night_vision: NightVision::new(options.nv_gain, options.nv_gain_max),
            cb_mode: options.cb_mode,
        })
    }

    /// Logical desktop size
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn transfer_path(&self) -> TransferPath {
        self.ingest.path()
    }

    /// Why zero-copy imports were abandoned, if they were
    pub fn transfer_error(&self) -> Option<&DesktopError> {
        self.ingest.transfer_error()
    }

    pub fn format(&self) -> Option<&FrameFormat> {
        self.ingest.format()
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn night_vision(&self) -> &NightVision {
        &self.night_vision
    }

    pub fn scale_algorithm(&self) -> ScaleAlgorithm {
        self.scale_algorithm
    }

    pub fn cb_mode(&self) -> i32 {
        self.cb_mode
    }

    pub fn keybinds(&self) -> &KeybindMap {
        &self.keybinds
    }

    /// Configure for a newly negotiated frame format
    pub fn setup(&mut self, format: FrameFormat) -> DesktopResult<()> {
        if let Err(e) = self.ingest.setup(format) {
            error!("Failed to setup the desktop texture: {}", e);
            return Err(e);
        }

        self.width = format.width;
        self.height = format.height;
        info!(
            "Desktop format {:?} {}x{} (pitch {})",
            format.frame_type, format.width, format.height, format.pitch
        );
        Ok(())
    }

    /// Hand a new frame to the texture
    pub fn update(
        &mut self,
        frame: &FrameBuffer,
        handoff: Option<HandoffHandle>,
        damage: Option<&[DamageRect]>,
    ) -> DesktopResult<()> {
        self.ingest
            .ingest(self.backend.as_mut(), &mut self.filters, frame, handoff, damage)
    }

    /// The window was resized to `width` x `height`
    pub fn resize(&mut self, width: u32, height: u32) {
        self.filters.on_resize(
            (width, height),
            (self.width, self.height),
            self.ingest.texture_mut(),
        );
    }

    /// Override a stage's output resolution; (0, 0) renders at the input size
    pub fn set_filter_resolution(&mut self, stage: StageId, width: u32, height: u32) {
        self.filters
            .set_resolution(stage, width, height, self.ingest.texture_mut());
        self.ingest.texture_mut().invalidate();
    }

    /// Validate and apply a scale algorithm index. An invalid index is
    /// rejected and the current algorithm stays in effect.
    pub fn set_scale_algorithm_index(&mut self, index: i64) -> Result<(), ConfigError> {
        self.scale_algorithm = ScaleAlgorithm::try_from(index)?;
        Ok(())
    }

    /// Dispatch a key press; returns true when the key is bound
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        match self.keybinds.lookup(key) {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: DesktopEvent) {
        match event {
            DesktopEvent::ToggleNightVision => {
                self.night_vision.toggle();
                self.host
                    .alert(AlertLevel::Info, &self.night_vision.alert_message());
                self.host.invalidate_window(true);
            }
        }
    }

    /// Snapshot for the configuration panel
    pub fn panel_state(&self) -> PanelState {
        PanelState {
            scale_algorithm: self.scale_algorithm,
            algorithms: ScaleAlgorithm::ALL.iter().map(|a| (*a, a.name())).collect(),
            nv_gain: self.night_vision.gain(),
            nv_gain_max: self.night_vision.max(),
            filters: self
                .filters
                .stages()
                .iter()
                .map(|stage| FilterPanelState {
                    stage: stage.id(),
                    name: stage.id().name(),
                    enabled: stage.enabled_by_user(),
                    active: stage.active_now(),
                    sharpness: stage.sharpness(),
                })
                .collect(),
        }
    }

    /// Apply a command from the configuration panel
    pub fn apply(&mut self, command: PanelCommand) -> DesktopResult<()> {
        debug!("Panel command: {:?}", command);

        let invalidate_texture = match command {
            PanelCommand::SetScaleAlgorithm(algorithm) => {
                self.scale_algorithm = algorithm;
                false
            }
            PanelCommand::SetNightVisionGain(gain) => {
                if !self.night_vision.set_gain(gain) {
                    return Err(ConfigError::OutOfRange {
                        section: "egl".to_string(),
                        key: "nv_gain".to_string(),
                        message: format!(
                            "gain {} is above the maximum of {}",
                            gain,
                            self.night_vision.max()
                        ),
                    }
                    .into());
                }
                false
            }
            PanelCommand::SetFilterEnabled(stage, enabled) => {
                self.filters
                    .set_enabled(stage, enabled, self.ingest.texture_mut())
            }
            PanelCommand::SetSharpness(stage, value) => {
                self.set_sharpness(stage, value)?;
                true
            }
        };

        if invalidate_texture {
            self.ingest.texture_mut().invalidate();
        }
        self.host.invalidate_window(true);
        Ok(())
    }

    fn set_sharpness(&mut self, stage: StageId, value: f32) -> DesktopResult<()> {
        self.filters.set_parameter(
            stage,
            FilterParam::Sharpness,
            value,
            self.ingest.texture_mut(),
        )
    }

    /// Draw the desktop. Never blocks: a texture that is not ready yet is
    /// drawn with whatever it last held.
    pub fn render(&mut self, params: &RenderParams, damage: Option<&[DamageRect]>) -> RenderReport {
        let texture = self.ingest.texture_mut();

        let status = texture.process();
        if let TextureStatus::Error(e) = &status {
            error!("Failed to process the desktop texture: {}", e);
        }

        texture.bind();
        let texture_size = texture.final_size();
        let logical = (self.width, self.height);

        let scale_type = scale::resolve_scale_type(params.scale_type, texture_size, logical);
        let scale_algorithm =
            scale::select(self.scale_algorithm, params.scale_type, texture_size, logical);

        let transform = DesktopTransform::build(
            self.width,
            self.height,
            params.x,
            params.y,
            params.scale_x,
            params.scale_y,
            params.rotate,
        );
        self.mesh.update(damage, self.width, self.height);

        let shader = &self.shader;
        let uniforms = [
            Uniform::new(shader.scale_algo, UniformValue::Int(scale_algorithm.index())),
            Uniform::new(
                shader.desktop_size,
                UniformValue::Float2([self.width as f32, self.height as f32]),
            ),
            Uniform::new(
                shader.texture_size,
                UniformValue::Int2([texture_size.0 as i32, texture_size.1 as i32]),
            ),
            Uniform::new(
                shader.transform,
                UniformValue::Mat3x2 {
                    transpose: false,
                    value: transform.0,
                },
            ),
            Uniform::new(
                shader.nv_gain,
                UniformValue::Float(self.night_vision.gain() as f32),
            ),
            Uniform::new(shader.cb_mode, UniformValue::Int(self.cb_mode)),
        ];

        shader.program.set_uniforms(&uniforms);
        shader.program.use_program();
        self.backend.draw_rects(&self.mesh);

        RenderReport {
            status,
            scale_type,
            scale_algorithm,
            texture_size,
            transform,
        }
    }
}
