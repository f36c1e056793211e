//! System-wide constants for the PCU control core.
//!
//! Single source of truth for the fixed geometry and timing parameters
//! named in the external interface. Imported by both state machines —
//! no duplication permitted.

/// Per-step move timeout [s]. A step that has not reached tolerance
/// within this window forces the owning machine to FAULT.
pub const MOVE_TIME: f64 = 45.0;

/// Clearance circle radius around the pinhole mask centre [mm].
pub const CLEARANCE_PMASK: f64 = 35.0;

/// Clearance circle radius around the fiber bundle centre [mm].
pub const CLEARANCE_FIBER: f64 = 35.0;

/// K-mirror rotator aperture radius [mm].
pub const KMIRR_RADIUS: f64 = 50.0;

/// Tick period for both state machines [s].
pub const TIME_DELAY: f64 = 0.5;

/// Retraction destination for m3/m4 when changing configuration [mm].
pub const HOME: f64 = 0.0;

/// Destructive-read sentinel published on offset channels once consumed.
pub const RESET_VAL: f64 = -999.9;

/// Number of ticks in one `MOVE_TIME` window, rounded up.
#[must_use]
pub fn move_timeout_ticks() -> u64 {
    (MOVE_TIME / TIME_DELAY).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MOVE_TIME > 0.0);
        assert!(TIME_DELAY > 0.0);
        assert!(CLEARANCE_PMASK > 0.0);
        assert!(CLEARANCE_FIBER > 0.0);
        assert!(KMIRR_RADIUS > 0.0);
        assert!(KMIRR_RADIUS >= CLEARANCE_PMASK.max(CLEARANCE_FIBER));
    }

    #[test]
    fn move_timeout_ticks_matches_source_ratio() {
        // MOVE_TIME=45s, TIME_DELAY=0.5s -> 90 ticks, matching the
        // original sequencer's move_timer.start(seconds=MOVE_TIME).
        assert_eq!(move_timeout_ticks(), 90);
    }
}
