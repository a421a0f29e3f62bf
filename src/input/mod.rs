//! Keybinds and desktop events
//!
//! The window layer owns the keyboard. The desktop only publishes the
//! bindings it wants and receives typed [`DesktopEvent`]s back, plus a
//! [`AppHost`] to raise alerts and ask for redraws.

use log::debug;

/// Linux input event code of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const N: KeyCode = KeyCode(49);
}

/// Events the desktop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesktopEvent {
    ToggleNightVision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keybind {
    pub key: KeyCode,
    pub event: DesktopEvent,
    pub description: &'static str,
}

/// Keybinds registered by a desktop
#[derive(Debug, Clone, Default)]
pub struct KeybindMap {
    binds: Vec<Keybind>,
}

impl KeybindMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding. A key can only map to one event; rebinding
    /// replaces the previous entry.
    pub fn register(&mut self, key: KeyCode, event: DesktopEvent, description: &'static str) {
        self.binds.retain(|b| b.key != key);
        self.binds.push(Keybind {
            key,
            event,
            description,
        });
        debug!("Keybind {:?} -> {:?} ({})", key, event, description);
    }

    pub fn lookup(&self, key: KeyCode) -> Option<DesktopEvent> {
        self.binds.iter().find(|b| b.key == key).map(|b| b.event)
    }

    pub fn binds(&self) -> &[Keybind] {
        &self.binds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// Services the application provides to the desktop
#[cfg_attr(test, mockall::automock)]
pub trait AppHost: Send + Sync {
    /// Show a short on-screen message
    fn alert(&self, level: AlertLevel, message: &str);

    /// Ask for the window to be redrawn; `full` redraws everything rather
    /// than only damaged regions
    fn invalidate_window(&self, full: bool);
}

/// Host that only logs; used when no window layer is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHost;

impl AppHost for LogHost {
    fn alert(&self, level: AlertLevel, message: &str) {
        match level {
            AlertLevel::Info => log::info!("{}", message),
            AlertLevel::Warning => log::warn!("{}", message),
            AlertLevel::Error => log::error!("{}", message),
        }
    }

    fn invalidate_window(&self, full: bool) {
        debug!("Window invalidated (full: {})", full);
    }
}
