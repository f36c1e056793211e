//! PCU Common Library
//!
//! Shared types, constants, and configuration loading for the Pupil
//! Configuration Unit control core: the position/geometry model, motor
//! metadata, error kinds, system constants, the configuration-document
//! loader, and the channel surface abstraction consumed by both the
//! Sequencer and the Collision Sentinel.
//!
//! # Module Structure
//!
//! - [`consts`] - Fixed system constants (clearances, timeouts, tick period)
//! - [`position`] - `MotorId`, `Position`, `NamedConfiguration`, geometry predicates
//! - [`error`] - `PcuError`, the shared error kind enum
//! - [`config`] - Configuration document loading and validation
//! - [`channel`] - Channel Surface trait and in-process test double
//! - [`prelude`] - Common re-exports for convenience

pub mod channel;
pub mod config;
pub mod consts;
pub mod error;
pub mod position;
pub mod prelude;
