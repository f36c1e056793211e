//! Channel Surface: the named publish/subscribe abstraction both state
//! machines sit on top of.
//!
//! The transport fabric itself (EPICS channel access, or any other wire
//! protocol) is out of scope per the external interface design — this
//! module only fixes the shape of the abstraction and supplies an
//! in-process test double used by unit tests and by the binaries'
//! default wiring.

use std::collections::HashMap;

use crate::consts::RESET_VAL;

/// A named, typed publish/subscribe surface.
///
/// Offset channels use the `-999.9` destructive-read convention from
/// the external interface: [`ChannelSurface::take_f64`] is the only
/// way callers observe that sentinel, and it is never surfaced above
/// this trait as a raw value — callers see `Option<f64>`.
pub trait ChannelSurface {
    fn get_f64(&self, channel: &str) -> Option<f64>;
    fn set_f64(&mut self, channel: &str, value: f64);
    fn get_string(&self, channel: &str) -> Option<String>;
    fn set_string(&mut self, channel: &str, value: String);

    /// Destructive read of an offset-style channel: returns the value
    /// if one has been published since the last read, and resets the
    /// channel to the `RESET_VAL` sentinel either way.
    fn take_f64(&mut self, channel: &str) -> Option<f64> {
        let current = self.get_f64(channel);
        self.set_f64(channel, RESET_VAL);
        match current {
            Some(v) if v != RESET_VAL => Some(v),
            _ => None,
        }
    }

    /// Destructive read of a request-style string channel (`:request`,
    /// `:pos`): returns the pending command, if any, and clears it.
    fn take_string(&mut self, channel: &str) -> Option<String> {
        let current = self.get_string(channel);
        self.set_string(channel, String::new());
        match current {
            Some(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }
}

/// In-process `HashMap`-backed `ChannelSurface`, used by unit tests and
/// by the binaries when no external transport is wired in.
#[derive(Debug, Default)]
pub struct TableChannelSurface {
    floats: HashMap<String, f64>,
    strings: HashMap<String, String>,
}

impl TableChannelSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelSurface for TableChannelSurface {
    fn get_f64(&self, channel: &str) -> Option<f64> {
        self.floats.get(channel).copied()
    }

    fn set_f64(&mut self, channel: &str, value: f64) {
        self.floats.insert(channel.to_string(), value);
    }

    fn get_string(&self, channel: &str) -> Option<String> {
        self.strings.get(channel).cloned()
    }

    fn set_string(&mut self, channel: &str, value: String) {
        self.strings.insert(channel.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_f64_hides_reset_sentinel() {
        let mut ch = TableChannelSurface::new();
        assert_eq!(ch.take_f64("m1Offset"), None);
        ch.set_f64("m1Offset", 5.0);
        assert_eq!(ch.take_f64("m1Offset"), Some(5.0));
        // second read after the destructive reset sees nothing
        assert_eq!(ch.take_f64("m1Offset"), None);
        assert_eq!(ch.get_f64("m1Offset"), Some(RESET_VAL));
    }

    #[test]
    fn take_string_clears_request_channel() {
        let mut ch = TableChannelSurface::new();
        ch.set_string(":request", "enable".to_string());
        assert_eq!(ch.take_string(":request"), Some("enable".to_string()));
        assert_eq!(ch.take_string(":request"), None);
    }
}
