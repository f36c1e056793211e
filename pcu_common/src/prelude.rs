//! Prelude module for common re-exports.
//!
//! Consumers can do `use pcu_common::prelude::*;` and get the most
//! important types without listing individual paths.

pub use crate::channel::{ChannelSurface, TableChannelSurface};
pub use crate::config::{ConfigError, ConfigLoader, ConfigurationStore, LogLevel, PcuConfigDocument};
pub use crate::consts::*;
pub use crate::error::PcuError;
pub use crate::position::{ConfigClass, MotorId, MotorMeta, NamedConfiguration, Position};
