//! Night vision gain
//!
//! A cyclic counter toggled from a keybind: every press steps the gain and
//! wraps back to zero (disabled) after `max`.

/// What the current gain means to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightVisionLevel {
    Disabled,
    Enabled,
    /// Extra gain steps above the base level
    Boost(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightVision {
    gain: u32,
    max: u32,
}

impl NightVision {
    /// `gain` is clamped to `max`
    pub fn new(gain: u32, max: u32) -> Self {
        Self {
            gain: gain.min(max),
            max,
        }
    }

    pub fn gain(&self) -> u32 {
        self.gain
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Step to the next gain, wrapping to zero after `max`
    pub fn toggle(&mut self) -> NightVisionLevel {
        self.gain = if self.gain >= self.max { 0 } else { self.gain + 1 };
        self.level()
    }

    /// Set the gain directly; values above `max` are refused
    pub fn set_gain(&mut self, gain: u32) -> bool {
        if gain > self.max {
            return false;
        }
        self.gain = gain;
        true
    }

    pub fn level(&self) -> NightVisionLevel {
        match self.gain {
            0 => NightVisionLevel::Disabled,
            1 => NightVisionLevel::Enabled,
            n => NightVisionLevel::Boost(n - 1),
        }
    }

    /// Alert text shown after a toggle
    pub fn alert_message(&self) -> String {
        match self.level() {
            NightVisionLevel::Disabled => "NV Disabled".to_string(),
            NightVisionLevel::Enabled => "NV Enabled".to_string(),
            NightVisionLevel::Boost(n) => format!("NV Gain + {}", n),
        }
    }
}
