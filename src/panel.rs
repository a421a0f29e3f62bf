//! Configuration panel surface
//!
//! The panel is drawn by the application's UI toolkit. This module gives it
//! a plain snapshot to draw from and a set of commands to send back; the
//! desktop applies them (see `Desktop::apply`).

use crate::renderer::filter::StageId;
use crate::renderer::scale::ScaleAlgorithm;

/// State of one filter stage as shown to the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPanelState {
    pub stage: StageId,
    pub name: &'static str,
    /// What the user asked for; unaffected by resizes
    pub enabled: bool,
    /// Whether the texture currently runs the stage
    pub active: bool,
    pub sharpness: f32,
}

/// Everything the panel needs to draw itself
#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub scale_algorithm: ScaleAlgorithm,
    pub algorithms: Vec<(ScaleAlgorithm, &'static str)>,
    pub nv_gain: u32,
    pub nv_gain_max: u32,
    pub filters: Vec<FilterPanelState>,
}

impl PanelState {
    /// Label for the night vision slider
    pub fn nv_label(&self) -> String {
        match self.nv_gain {
            0 => "off".to_string(),
            1 => "on".to_string(),
            n => format!("gain: {}", n),
        }
    }

    pub fn filter(&self, stage: StageId) -> Option<&FilterPanelState> {
        self.filters.iter().find(|f| f.stage == stage)
    }
}

/// Changes the panel can request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelCommand {
    SetScaleAlgorithm(ScaleAlgorithm),
    SetNightVisionGain(u32),
    SetFilterEnabled(StageId, bool),
    SetSharpness(StageId, f32),
}
