//! Configuration document loading and validation.
//!
//! Loads the fixed four-table TOML document (`[base.*]`,
//! `[fiber_variants.*]`, `[mask_variants.*]`, `[motors.*]`) described in
//! the external interface, resolves every named configuration's motor
//! coordinates against the declared motor set, and validates every
//! configuration at load time — a configuration document that fails
//! validation never reaches either state machine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::position::{ConfigClass, MotorId, MotorMeta, NamedConfiguration, Position};

/// Log level for configuration (mirrors the ambient tracing stack's
/// own level vocabulary so it round-trips through TOML cleanly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `tracing`/`tracing-subscriber` filter directive for this level.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found")]
    FileNotFound,

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    #[error("unknown motor reference: {0}")]
    UnknownMotor(String),

    #[error("no motors defined")]
    NoMotorsDefined,
}

#[derive(Debug, Deserialize)]
struct MotorConfigEntry {
    #[serde(default = "default_enabled")]
    enabled: bool,
    limits: (f64, f64),
    tolerance: f64,
}

fn default_enabled() -> bool {
    true
}

type MotorValues = BTreeMap<String, f64>;

#[derive(Debug, Deserialize)]
struct RawPcuConfigDocument {
    #[serde(default)]
    base: BTreeMap<String, MotorValues>,
    #[serde(default)]
    fiber_variants: BTreeMap<String, MotorValues>,
    #[serde(default)]
    mask_variants: BTreeMap<String, MotorValues>,
    motors: BTreeMap<String, MotorConfigEntry>,
    #[serde(default = "default_log_level")]
    log_level: LogLevel,
}

/// Parsed, not-yet-validated configuration document. Exposed mainly so
/// `ConfigLoader::load` has a deserialization target; application code
/// should use [`ConfigurationStore::load`] instead.
pub type PcuConfigDocument = RawPcuConfigDocument;

pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn motor_id_from_name(name: &str) -> Option<MotorId> {
    match name {
        "m1" => Some(MotorId::M1),
        "m2" => Some(MotorId::M2),
        "m3" => Some(MotorId::M3),
        "m4" => Some(MotorId::M4),
        _ => None,
    }
}

fn position_from_values(values: &MotorValues) -> Result<Position, ConfigError> {
    let mut pos = Position::empty();
    for (name, value) in values {
        let Some(motor) = motor_id_from_name(name) else {
            return Err(ConfigError::UnknownMotor(name.clone()));
        };
        pos.set(motor, *value);
    }
    Ok(pos)
}

/// The loaded, validated configuration document: the motor metadata
/// table and every named configuration (base, fiber-variant,
/// mask-variant), each checked against that motor metadata.
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    motors: Vec<(MotorId, MotorMeta)>,
    configurations: Vec<NamedConfiguration>,
    pmask_center: Position,
    fiber_center: Position,
    log_level: LogLevel,
}

impl ConfigurationStore {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = RawPcuConfigDocument::load(path)?;
        Self::from_raw(raw)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawPcuConfigDocument =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPcuConfigDocument) -> Result<Self, ConfigError> {
        if raw.motors.is_empty() {
            return Err(ConfigError::NoMotorsDefined);
        }

        let mut motors = Vec::with_capacity(raw.motors.len());
        for (name, entry) in &raw.motors {
            let Some(id) = motor_id_from_name(name) else {
                return Err(ConfigError::UnknownMotor(name.clone()));
            };
            motors.push((
                id,
                MotorMeta {
                    enabled: entry.enabled,
                    limits: entry.limits,
                    tolerance: entry.tolerance,
                },
            ));
        }

        // `pmask_anchor` / `fiber_anchor` in `[base.*]` give the (m1, m2)
        // centres for the clearance circles; they anchor the deployed
        // `pinhole_mask` / `fiber_bundle` variant configurations but are
        // not themselves user-requestable named configurations, so they
        // are pulled out of `base` before the matching table is built.
        let fiber_center = raw
            .base
            .get("fiber_anchor")
            .map(position_from_values)
            .transpose()?
            .unwrap_or_default();
        let mask_center = raw
            .base
            .get("pmask_anchor")
            .map(position_from_values)
            .transpose()?
            .unwrap_or_default();

        let mut configurations = Vec::new();
        for (table, class) in [
            (&raw.base, ConfigClass::Base),
            (&raw.fiber_variants, ConfigClass::FiberVariant),
            (&raw.mask_variants, ConfigClass::MaskVariant),
        ] {
            for (name, values) in table {
                if class == ConfigClass::Base && (name == "pmask_anchor" || name == "fiber_anchor") {
                    continue;
                }
                let position = position_from_values(values)?;
                if !position.is_valid(&motors, &fiber_center, &mask_center) {
                    return Err(ConfigError::ValidationError(format!(
                        "configuration '{name}' violates a motor limit or clearance invariant"
                    )));
                }
                configurations.push(NamedConfiguration {
                    name: name.clone(),
                    class,
                    position,
                });
            }
        }

        Ok(Self {
            motors,
            configurations,
            pmask_center: mask_center,
            fiber_center,
            log_level: raw.log_level,
        })
    }

    #[must_use]
    pub fn motors(&self) -> &[(MotorId, MotorMeta)] {
        &self.motors
    }

    #[must_use]
    pub fn meta(&self, m: MotorId) -> Option<&MotorMeta> {
        self.motors.iter().find(|(id, _)| *id == m).map(|(_, meta)| meta)
    }

    #[must_use]
    pub fn is_valid_motor(&self, m: MotorId) -> bool {
        self.motors.iter().any(|(id, _)| *id == m)
    }

    /// All named configurations, in the load order base, fiber, mask —
    /// the same priority `get_config` matches against.
    #[must_use]
    pub fn configurations(&self) -> &[NamedConfiguration] {
        &self.configurations
    }

    #[must_use]
    pub fn named(&self, name: &str) -> Option<&NamedConfiguration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    /// Centre of the pinhole mask clearance circle, anchored by the
    /// `[base.pmask_anchor]` entry — the (m1, m2) point the deployed
    /// `pinhole_mask` variant configuration sits on.
    #[must_use]
    pub fn pmask_center(&self) -> &Position {
        &self.pmask_center
    }

    /// Centre of the fiber bundle clearance circle, anchored by the
    /// `[base.fiber_anchor]` entry — the (m1, m2) point the deployed
    /// `fiber_bundle` variant configuration sits on.
    #[must_use]
    pub fn fiber_center(&self) -> &Position {
        &self.fiber_center
    }

    /// Log level declared in the configuration document, defaulting to
    /// `LogLevel::Info` when the document omits it.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}
