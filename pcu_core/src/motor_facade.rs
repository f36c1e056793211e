//! Motor Facade: per-motor channel access, one call per channel
//! operation, with transport failures promoted to [`PcuError::Connectivity`].

use pcu_common::channel::ChannelSurface;
use pcu_common::error::PcuError;
use pcu_common::position::MotorId;

fn pos_channel(m: MotorId) -> String {
    format!("{}.pos", m.as_str())
}

fn cmd_channel(m: MotorId) -> String {
    format!("{}.cmd", m.as_str())
}

fn enable_channel(m: MotorId) -> String {
    format!("{}.enable", m.as_str())
}

fn stop_channel(m: MotorId) -> String {
    format!("{}.stop", m.as_str())
}

fn disconnected(m: MotorId, channel: &str) -> PcuError {
    PcuError::Connectivity(format!("{} channel for {} has no value", channel, m.as_str()))
}

/// Thin typed wrapper around a [`ChannelSurface`] exposing the motor
/// operations the two state machines need: read back position and
/// commanded position, issue a new commanded position, stop, and
/// enable/disable.
pub struct MotorFacade<'a, C: ChannelSurface> {
    channels: &'a mut C,
}

impl<'a, C: ChannelSurface> MotorFacade<'a, C> {
    pub fn new(channels: &'a mut C) -> Self {
        Self { channels }
    }

    pub fn get_position(&self, m: MotorId) -> Result<f64, PcuError> {
        self.channels.get_f64(&pos_channel(m)).ok_or_else(|| disconnected(m, "position"))
    }

    pub fn get_commanded(&self, m: MotorId) -> Result<f64, PcuError> {
        self.channels.get_f64(&cmd_channel(m)).ok_or_else(|| disconnected(m, "commanded"))
    }

    pub fn set_position(&mut self, m: MotorId, value: f64) {
        self.channels.set_f64(&cmd_channel(m), value);
    }

    pub fn stop(&mut self, m: MotorId) {
        self.channels.set_f64(&stop_channel(m), 1.0);
    }

    pub fn enable(&mut self, m: MotorId) {
        self.channels.set_f64(&enable_channel(m), 1.0);
    }

    pub fn disable(&mut self, m: MotorId) {
        self.channels.set_f64(&enable_channel(m), 0.0);
    }

    pub fn is_enabled(&self, m: MotorId) -> Result<bool, PcuError> {
        self.channels
            .get_f64(&enable_channel(m))
            .map(|v| v != 0.0)
            .ok_or_else(|| disconnected(m, "enable"))
    }

    /// Reset the commanded position to the motor's current position,
    /// cancelling any pending move — used by the Sentinel's stop
    /// sequence (stop, reset commanded, disable).
    pub fn reset_commanded(&mut self, m: MotorId) -> Result<(), PcuError> {
        let current = self.get_position(m)?;
        self.set_position(m, current);
        Ok(())
    }
}
