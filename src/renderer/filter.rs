//! Post-process filter chain
//!
//! The desktop texture can run through two FidelityFX stages before it is
//! composited:
//! - **FSR 1**: a two-pass upscaler (EASU then RCAS). It only makes sense
//!   when the window is larger than the desktop in both axes.
//! - **CAS**: a single sharpening pass that always applies when enabled.
//!
//! Every stage keeps the flag the user asked for (`enabled_by_user`) apart
//! from the flag the texture actually runs with (`active_now`). Resizes only
//! ever touch the latter, so the configuration panel keeps showing intent.

use anyhow::Result;
use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::backend::{FilterHandle, RenderBackend, ShaderKind, ShaderProgram, TextureResource};
use crate::error::{DesktopError, DesktopResult};
use crate::renderer::uniform::{Uniform, UniformLocation, UniformValue};

/// Filter stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Fsr,
    Cas,
}

impl StageId {
    pub const ALL: [StageId; 2] = [StageId::Fsr, StageId::Cas];

    pub fn name(self) -> &'static str {
        match self {
            StageId::Fsr => "AMD FidelityFX FSR",
            StageId::Cas => "AMD FidelityFX CAS",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When a stage is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    UpscaleOnly,
    Always,
}

/// Tunable stage parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterParam {
    Sharpness,
}

impl FilterParam {
    fn name(self) -> &'static str {
        match self {
            FilterParam::Sharpness => "sharpness",
        }
    }
}

/// Initial stage settings, usually taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub fsr_enabled: bool,
    pub fsr_sharpness: f32,
    pub cas_enabled: bool,
    pub cas_sharpness: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            fsr_enabled: false,
            fsr_sharpness: 1.0,
            cas_enabled: false,
            cas_sharpness: 0.0,
        }
    }
}

struct FilterPass {
    program: Arc<dyn ShaderProgram>,
    handle: Option<FilterHandle>,
}

/// One stage of the chain and its state
pub struct FilterStage {
    id: StageId,
    tag: StageTag,
    passes: Vec<FilterPass>,
    /// Pass owning the `uSharpness` uniform
    sharpness_pass: usize,
    sharpness_location: UniformLocation,
    enabled_by_user: bool,
    active_now: bool,
    resolution: (u32, u32),
    sharpness: f32,
}

impl FilterStage {
    fn new(
        backend: &mut dyn RenderBackend,
        id: StageId,
        enabled: bool,
        sharpness: f32,
    ) -> Result<Self> {
        let (tag, kinds, sharpness_pass) = match id {
            StageId::Fsr => (
                StageTag::UpscaleOnly,
                vec![ShaderKind::FsrEasu, ShaderKind::FsrRcas],
                1,
            ),
            StageId::Cas => (StageTag::Always, vec![ShaderKind::Cas], 0),
        };

        let passes = kinds
            .iter()
            .map(|&kind| {
                Ok(FilterPass {
                    program: backend.compile_shader(kind)?,
                    handle: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let sharpness_location = passes[sharpness_pass].program.uniform_location("uSharpness");

        let mut stage = Self {
            id,
            tag,
            passes,
            sharpness_pass,
            sharpness_location,
            enabled_by_user: enabled,
            active_now: false,
            resolution: (0, 0),
            sharpness: sharpness.clamp(0.0, 1.0),
        };
        stage.upload_sharpness();
        Ok(stage)
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn tag(&self) -> StageTag {
        self.tag
    }

    pub fn enabled_by_user(&self) -> bool {
        self.enabled_by_user
    }

    pub fn active_now(&self) -> bool {
        self.active_now
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Raw sharpness control value in [0, 1]
    pub fn sharpness(&self) -> f32 {
        self.sharpness
    }

    /// Value written to the shader's `uSharpness` uniform.
    ///
    /// RCAS expresses sharpness as attenuation in stops (0 = sharpest), so
    /// the raw control is inverted onto [0, 2].
    pub fn sharpness_uniform(&self) -> f32 {
        match self.id {
            StageId::Fsr => 2.0 - self.sharpness * 2.0,
            StageId::Cas => self.sharpness,
        }
    }

    fn upload_sharpness(&self) {
        self.passes[self.sharpness_pass].program.set_uniforms(&[Uniform::new(
            self.sharpness_location,
            UniformValue::Float(self.sharpness_uniform()),
        )]);
    }

    fn derive_active(&mut self, upscale: bool) {
        self.active_now = match self.tag {
            StageTag::UpscaleOnly => self.enabled_by_user && upscale,
            StageTag::Always => self.enabled_by_user,
        };
    }

    fn sync(&self, texture: &mut dyn TextureResource) {
        for pass in &self.passes {
            if let Some(handle) = pass.handle {
                texture.enable_filter(handle, self.active_now);
                texture.set_filter_resolution(handle, self.resolution.0, self.resolution.1);
            }
        }
    }
}

impl fmt::Debug for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterStage")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("passes", &self.passes.len())
            .field("enabled_by_user", &self.enabled_by_user)
            .field("active_now", &self.active_now)
            .field("resolution", &self.resolution)
            .field("sharpness", &self.sharpness)
            .finish()
    }
}

/// Ordered set of filter stages attached to the desktop texture
#[derive(Debug)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
    upscale: bool,
}

impl FilterChain {
    /// Compile every stage's programs. Nothing is attached to a texture yet.
    pub fn new(backend: &mut dyn RenderBackend, settings: &FilterSettings) -> Result<Self> {
        let stages = vec![
            FilterStage::new(backend, StageId::Fsr, settings.fsr_enabled, settings.fsr_sharpness)?,
            FilterStage::new(backend, StageId::Cas, settings.cas_enabled, settings.cas_sharpness)?,
        ];

        let mut chain = Self {
            stages,
            upscale: false,
        };
        for stage in &mut chain.stages {
            stage.derive_active(false);
        }
        Ok(chain)
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> &FilterStage {
        match id {
            StageId::Fsr => &self.stages[0],
            StageId::Cas => &self.stages[1],
        }
    }

    fn stage_mut(&mut self, id: StageId) -> &mut FilterStage {
        match id {
            StageId::Fsr => &mut self.stages[0],
            StageId::Cas => &mut self.stages[1],
        }
    }

    /// Whether the last resize made the window larger than the desktop
    pub fn upscale(&self) -> bool {
        self.upscale
    }

    /// Attach every pass to `texture`, in pipeline order, carrying over the
    /// current active flags and resolutions. Previous handles are discarded.
    pub fn attach(&mut self, texture: &mut dyn TextureResource) {
        for stage in &mut self.stages {
            for pass in &mut stage.passes {
                pass.handle = Some(texture.add_filter(pass.program.clone(), stage.active_now));
            }
            stage.sync(texture);
        }
        debug!("Attached filter chain to {:?} texture", texture.kind());
    }

    /// Change the user's intent for a stage. Returns true when it changed.
    pub fn set_enabled(
        &mut self,
        id: StageId,
        enabled: bool,
        texture: &mut dyn TextureResource,
    ) -> bool {
        let upscale = self.upscale;
        let stage = self.stage_mut(id);
        if stage.enabled_by_user == enabled {
            return false;
        }

        stage.enabled_by_user = enabled;
        stage.derive_active(upscale);
        stage.sync(texture);
        debug!(
            "{} {} (active: {})",
            id,
            if enabled { "enabled" } else { "disabled" },
            stage.active_now
        );
        true
    }

    /// Set the output resolution of a stage directly
    pub fn set_resolution(
        &mut self,
        id: StageId,
        width: u32,
        height: u32,
        texture: &mut dyn TextureResource,
    ) {
        let stage = self.stage_mut(id);
        stage.resolution = (width, height);
        stage.sync(texture);
    }

    /// Set a stage parameter.
    ///
    /// Touching a stage's parameter turns the stage on; the caller is
    /// expected to re-render even when nothing else changed.
    pub fn set_parameter(
        &mut self,
        id: StageId,
        param: FilterParam,
        value: f32,
        texture: &mut dyn TextureResource,
    ) -> DesktopResult<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DesktopError::InvalidParameter {
                stage: id.name(),
                key: param.name(),
                value,
            });
        }

        let upscale = self.upscale;
        let stage = self.stage_mut(id);
        match param {
            FilterParam::Sharpness => {
                stage.sharpness = value;
                stage.upload_sharpness();
            }
        }

        if !stage.enabled_by_user {
            stage.enabled_by_user = true;
            stage.derive_active(upscale);
            stage.sync(texture);
        }

        debug!("{} {} set to {}", id, param.name(), value);
        Ok(())
    }

    /// React to a window resize. `window` is the target size and `desktop`
    /// the source frame size. When upscaling every stage renders at the
    /// window size; otherwise the sharpening stage goes back to the source
    /// resolution. Returns the new upscale state.
    pub fn on_resize(
        &mut self,
        window: (u32, u32),
        desktop: (u32, u32),
        texture: &mut dyn TextureResource,
    ) -> bool {
        self.upscale = window.0 > desktop.0 && window.1 > desktop.1;

        for stage in &mut self.stages {
            stage.derive_active(self.upscale);
            if self.upscale {
                stage.resolution = window;
            } else if stage.tag == StageTag::Always {
                // idle upscalers keep their last output size
                stage.resolution = (0, 0);
            }
            stage.sync(texture);
        }

        debug!(
            "Resize {}x{} over {}x{}: upscale={}",
            window.0, window.1, desktop.0, desktop.1, self.upscale
        );
        self.upscale
    }
}
