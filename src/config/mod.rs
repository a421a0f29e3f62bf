//! Configuration management for the desktop renderer
//!
//! Options are registered up front with a default, a description and an
//! optional validation hook, then addressed by `(section, key)`. Values can
//! be loaded from and saved to TOML files:
//!
//! ```toml
//! [egl]
//! scale = 2
//! nv_gain_max = 3
//!
//! [egl_filter]
//! ffx_cas = true
//! ffx_cas_sharpness = 0.4
//! ```
//!
//! A value that fails validation is reported and never replaces the value
//! that was accepted before it.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::renderer::filter::FilterSettings;
use crate::renderer::scale::ScaleAlgorithm;

/// A stored option value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Int(_) => "integer",
            OptionValue::Float(_) => "float",
        }
    }

    /// Convert `self` to the type of `template`. Integers widen to floats;
    /// nothing else converts.
    fn coerce_to(self, template: &OptionValue) -> Option<OptionValue> {
        match (template, self) {
            (OptionValue::Bool(_), OptionValue::Bool(_))
            | (OptionValue::Int(_), OptionValue::Int(_))
            | (OptionValue::Float(_), OptionValue::Float(_)) => Some(self),
            (OptionValue::Float(_), OptionValue::Int(i)) => Some(OptionValue::Float(i as f64)),
            _ => None,
        }
    }
}

/// Validation hook run before a value is accepted
pub type Validator = fn(&OptionSpec, &OptionValue) -> Result<(), ConfigError>;

/// A registered option
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub section: &'static str,
    pub key: &'static str,
    pub description: &'static str,
    pub default: OptionValue,
    pub validator: Option<Validator>,
}

impl OptionSpec {
    fn out_of_range(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::OutOfRange {
            section: self.section.to_string(),
            key: self.key.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of applying a configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub applied: usize,
    pub rejected: Vec<ConfigError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

type FileLayout = BTreeMap<String, BTreeMap<String, OptionValue>>;

/// Registry of typed, validated options
#[derive(Debug, Clone, Default)]
pub struct OptionStore {
    specs: Vec<OptionSpec>,
    values: BTreeMap<(&'static str, &'static str), OptionValue>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with every desktop renderer option registered
    pub fn with_desktop_options() -> Self {
        let mut store = Self::new();
        register_desktop_options(&mut store);
        store
    }

    /// Register an option, initialised to its default
    pub fn register(&mut self, spec: OptionSpec) {
        self.values.insert((spec.section, spec.key), spec.default);
        self.specs.retain(|s| !(s.section == spec.section && s.key == spec.key));
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    fn spec(&self, section: &str, key: &str) -> Option<&OptionSpec> {
        self.specs
            .iter()
            .find(|s| s.section == section && s.key == key)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<OptionValue> {
        let spec = self.spec(section, key)?;
        self.values.get(&(spec.section, spec.key)).copied()
    }

    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        match self.get(section, key)? {
            OptionValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get(section, key)? {
            OptionValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn get_float(&self, section: &str, key: &str) -> Option<f64> {
        match self.get(section, key)? {
            OptionValue::Float(f) => Some(f),
            OptionValue::Int(i) => Some(i as f64),
            OptionValue::Bool(_) => None,
        }
    }

    /// Validate and store a value. On error the previous value is kept.
    pub fn set(&mut self, section: &str, key: &str, value: OptionValue) -> Result<(), ConfigError> {
        let spec = self
            .spec(section, key)
            .ok_or_else(|| ConfigError::UnknownOption {
                section: section.to_string(),
                key: key.to_string(),
            })?;

        let value = value
            .coerce_to(&spec.default)
            .ok_or_else(|| ConfigError::TypeMismatch {
                section: section.to_string(),
                key: key.to_string(),
                expected: spec.default.type_name(),
            })?;

        if let Some(validate) = spec.validator {
            validate(spec, &value)?;
        }

        let slot = (spec.section, spec.key);
        debug!("Option {}:{} = {:?}", section, key, value);
        self.values.insert(slot, value);
        Ok(())
    }

    /// Apply every option found in a TOML document.
    ///
    /// Syntax errors fail the whole document. Individual values that are
    /// unknown, mistyped or out of range are logged and listed in the report.
    pub fn apply_toml(&mut self, contents: &str) -> Result<LoadReport> {
        let file: FileLayout = toml::from_str(contents).context("Failed to parse configuration")?;

        let mut report = LoadReport::default();
        for (section, entries) in &file {
            for (key, value) in entries {
                match self.set(section, key, *value) {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        warn!("Ignoring configuration value: {}", e);
                        report.rejected.push(e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
        let path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        self.apply_toml(&contents)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Save the current values to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = FileLayout::new();
        for ((section, key), value) in &self.values {
            file.entry(section.to_string())
                .or_default()
                .insert(key.to_string(), *value);
        }

        let contents = toml::to_string_pretty(&file).context("Failed to serialize configuration")?;
        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    if !path.to_string_lossy().starts_with('~') {
        return Ok(path.to_path_buf());
    }

    let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
    let rest = path.strip_prefix("~").unwrap_or(path);
    Ok(Path::new(&home).join(rest))
}

fn validate_scale(_spec: &OptionSpec, value: &OptionValue) -> Result<(), ConfigError> {
    match value {
        OptionValue::Int(i) => ScaleAlgorithm::try_from(*i).map(|_| ()),
        _ => Ok(()),
    }
}

fn validate_non_negative(spec: &OptionSpec, value: &OptionValue) -> Result<(), ConfigError> {
    match value {
        OptionValue::Int(i) if *i < 0 || *i > u32::MAX as i64 => {
            Err(spec.out_of_range(format!("{} is not a valid count", i)))
        }
        _ => Ok(()),
    }
}

fn validate_positive(spec: &OptionSpec, value: &OptionValue) -> Result<(), ConfigError> {
    match value {
        OptionValue::Int(i) if *i < 1 || *i > u16::MAX as i64 / 4 => {
            Err(spec.out_of_range(format!("{} is outside 1..={}", i, u16::MAX / 4)))
        }
        _ => Ok(()),
    }
}

fn validate_cb_mode(spec: &OptionSpec, value: &OptionValue) -> Result<(), ConfigError> {
    match value {
        OptionValue::Int(i) if !(0..=3).contains(i) => {
            Err(spec.out_of_range(format!("colorblind mode {} is outside 0..=3", i)))
        }
        _ => Ok(()),
    }
}

fn validate_unit(spec: &OptionSpec, value: &OptionValue) -> Result<(), ConfigError> {
    match value {
        OptionValue::Float(f) if !(0.0..=1.0).contains(f) => {
            Err(spec.out_of_range(format!("{} is outside 0.0..=1.0", f)))
        }
        _ => Ok(()),
    }
}

/// Register the desktop renderer's options
pub fn register_desktop_options(store: &mut OptionStore) {
    let options = [
        OptionSpec {
            section: "egl",
            key: "scale",
            description: "Set the scale algorithm (0 = auto, 1 = nearest, 2 = linear)",
            default: OptionValue::Int(ScaleAlgorithm::Auto.index() as i64),
            validator: Some(validate_scale),
        },
        OptionSpec {
            section: "egl",
            key: "nv_gain_max",
            description: "The maximum night vision gain",
            default: OptionValue::Int(1),
            validator: Some(validate_non_negative),
        },
        OptionSpec {
            section: "egl",
            key: "nv_gain",
            description: "The initial night vision gain at startup",
            default: OptionValue::Int(0),
            validator: Some(validate_non_negative),
        },
        OptionSpec {
            section: "egl",
            key: "cb_mode",
            description: "Color Blind Mode (0 = Off, 1 = Protanope, 2 = Deuteranope, 3 = Tritanope)",
            default: OptionValue::Int(0),
            validator: Some(validate_cb_mode),
        },
        OptionSpec {
            section: "egl_filter",
            key: "ffx_fsr",
            description: "AMD FidelityFX FSR",
            default: OptionValue::Bool(false),
            validator: None,
        },
        OptionSpec {
            section: "egl_filter",
            key: "ffx_fsr_sharpness",
            description: "AMD FidelityFX FSR Sharpness",
            default: OptionValue::Float(1.0),
            validator: Some(validate_unit),
        },
        OptionSpec {
            section: "egl_filter",
            key: "ffx_cas",
            description: "AMD FidelityFX CAS",
            default: OptionValue::Bool(false),
            validator: None,
        },
        OptionSpec {
            section: "egl_filter",
            key: "ffx_cas_sharpness",
            description: "AMD FidelityFX CAS Sharpness",
            default: OptionValue::Float(0.0),
            validator: Some(validate_unit),
        },
        OptionSpec {
            section: "desktop",
            key: "use_dma",
            description: "Import frames by zero-copy handoff when available",
            default: OptionValue::Bool(true),
            validator: None,
        },
        OptionSpec {
            section: "desktop",
            key: "max_rects",
            description: "Maximum damage rectangles tracked per frame",
            default: OptionValue::Int(16),
            validator: Some(validate_positive),
        },
    ];

    for spec in options {
        store.register(spec);
    }
}

/// Typed snapshot of the options a desktop is built from
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopOptions {
    pub zero_copy: bool,
    pub max_rects: usize,
    pub scale_algorithm: ScaleAlgorithm,
    pub nv_gain: u32,
    pub nv_gain_max: u32,
    pub cb_mode: i32,
    pub filters: FilterSettings,
}

impl DesktopOptions {
    pub fn from_store(store: &OptionStore) -> Result<Self, ConfigError> {
        Ok(Self {
            zero_copy: bool_option(store, "desktop", "use_dma")?,
            max_rects: int_option(store, "desktop", "max_rects")? as usize,
            scale_algorithm: ScaleAlgorithm::try_from(int_option(store, "egl", "scale")?)?,
            nv_gain: int_option(store, "egl", "nv_gain")? as u32,
            nv_gain_max: int_option(store, "egl", "nv_gain_max")? as u32,
            cb_mode: int_option(store, "egl", "cb_mode")? as i32,
            filters: FilterSettings {
                fsr_enabled: bool_option(store, "egl_filter", "ffx_fsr")?,
                fsr_sharpness: float_option(store, "egl_filter", "ffx_fsr_sharpness")? as f32,
                cas_enabled: bool_option(store, "egl_filter", "ffx_cas")?,
                cas_sharpness: float_option(store, "egl_filter", "ffx_cas_sharpness")? as f32,
            },
        })
    }
}

impl Default for DesktopOptions {
    fn default() -> Self {
        Self {
            zero_copy: true,
            max_rects: 16,
            scale_algorithm: ScaleAlgorithm::Auto,
            nv_gain: 0,
            nv_gain_max: 1,
            cb_mode: 0,
            filters: FilterSettings::default(),
        }
    }
}

fn missing(section: &str, key: &str) -> ConfigError {
    ConfigError::UnknownOption {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn int_option(store: &OptionStore, section: &str, key: &str) -> Result<i64, ConfigError> {
    store.get_int(section, key).ok_or_else(|| missing(section, key))
}

fn bool_option(store: &OptionStore, section: &str, key: &str) -> Result<bool, ConfigError> {
    store.get_bool(section, key).ok_or_else(|| missing(section, key))
}

fn float_option(store: &OptionStore, section: &str, key: &str) -> Result<f64, ConfigError> {
    store.get_float(section, key).ok_or_else(|| missing(section, key))
}
