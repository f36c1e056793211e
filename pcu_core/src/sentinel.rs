//! Collision Sentinel state machine: independently watches the shared
//! motor surface and holds sole authority over motor-enable state. The
//! Sequencer never re-enables a motor this machine has disabled.

use pcu_common::channel::ChannelSurface;
use pcu_common::config::ConfigurationStore;
use pcu_common::consts::KMIRR_RADIUS;
use pcu_common::error::PcuError;
use pcu_common::position::{MotorId, MotorMeta, Position};
use tracing::{error, info, warn};

use crate::motor_facade::MotorFacade;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SentinelState {
    Init = 0,
    Monitoring = 1,
    Stopped = 2,
    Restricted = 3,
    Fault = 4,
}

impl SentinelState {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Init),
            1 => Some(Self::Monitoring),
            2 => Some(Self::Stopped),
            3 => Some(Self::Restricted),
            4 => Some(Self::Fault),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Monitoring => "MONITORING",
            Self::Stopped => "STOPPED",
            Self::Restricted => "RESTRICTED",
            Self::Fault => "FAULT",
        }
    }
}

impl Default for SentinelState {
    fn default() -> Self {
        Self::Init
    }
}

/// Direction a motor is still permitted to move while RESTRICTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Commanded value must not decrease below the current value.
    Increasing,
    /// Commanded value must not increase above the current value.
    Decreasing,
}

/// Per-motor directional constraint computed once on entry to
/// RESTRICTED. Motors absent from the directive are disabled outright.
pub type SentinelDirective = Vec<(MotorId, Direction)>;

#[derive(Debug, Default)]
pub struct SentinelStateMachine {
    state: SentinelState,
    directive: SentinelDirective,
    advisory_sent: bool,
}

impl SentinelStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SentinelState {
        self.state
    }

    #[must_use]
    pub fn directive(&self) -> &[(MotorId, Direction)] {
        &self.directive
    }

    pub fn tick<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        if let Some(cmd) = channels.take_string(":request") {
            self.handle_request(&cmd.to_lowercase(), store, channels);
        }

        match self.state {
            SentinelState::Init => self.process_init(store, channels),
            SentinelState::Monitoring => self.process_monitoring(store, channels),
            SentinelState::Stopped => self.process_stopped(store, channels),
            SentinelState::Restricted => self.process_restricted(store, channels),
            SentinelState::Fault => {}
        }

        channels.set_string(":stst", self.state.label().to_string());
    }

    fn handle_request<C: ChannelSurface>(&mut self, cmd: &str, store: &ConfigurationStore, channels: &mut C) {
        match cmd {
            "reinit" if self.state == SentinelState::Fault || self.state == SentinelState::Monitoring => {
                info!("sentinel reinit requested");
                self.enter_init();
            }
            "reinit" if self.state == SentinelState::Stopped => match read_positions(store, channels, false) {
                Ok(current) if current.is_valid(store.motors(), store.fiber_center(), store.pmask_center()) => {
                    info!("sentinel reinit requested from STOPPED, position is valid");
                    self.enter_init();
                }
                _ => error!("reinit rejected: current position still invalid"),
            },
            "allow_moves" if self.state == SentinelState::Stopped => match read_positions(store, channels, false) {
                Ok(current) => {
                    info!("operator requested RESTRICTED mode");
                    self.enter_restricted(store, channels, &current);
                }
                Err(e) => error!(error = %e, "allow_moves rejected: cannot read current position"),
            },
            _ => {
                error!(command = cmd, state = self.state.label(), "sentinel request rejected in current state");
            }
        }
    }

    fn process_init<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        match read_positions(store, channels, false) {
            Ok(current) if current.is_valid(store.motors(), store.fiber_center(), store.pmask_center()) => {
                info!("sentinel initialized, position valid");
                self.state = SentinelState::Monitoring;
            }
            Ok(_) => {
                warn!("sentinel initialized, position invalid");
                self.enter_stopped(store, channels);
            }
            Err(e) => {
                error!(error = %e, "sentinel init failed to read position");
                self.state = SentinelState::Fault;
            }
        }
    }

    fn process_monitoring<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let (current, commanded) = match (read_positions(store, channels, false), read_positions(store, channels, true)) {
            (Ok(c), Ok(d)) => (c, d),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "sentinel lost connectivity while monitoring");
                self.state = SentinelState::Fault;
                return;
            }
        };

        let fiber_center = store.fiber_center();
        let mask_center = store.pmask_center();
        let current_ok = current.is_valid(store.motors(), fiber_center, mask_center);
        let commanded_ok = commanded.is_valid(store.motors(), fiber_center, mask_center);
        if !current_ok || !commanded_ok {
            let which = match (current_ok, commanded_ok) {
                (false, false) => "current and commanded position",
                (false, true) => "current position",
                _ => "commanded position",
            };
            let err = PcuError::InvariantViolation(format!("{which} violates a motor limit or clearance invariant"));
            error!(error = %err, "stopping motors");
            stop_all(store, channels);
            self.enter_stopped(store, channels);
        }
    }

    fn process_stopped<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let mut facade = MotorFacade::new(channels);
        for (m, _) in store.motors() {
            match facade.is_enabled(*m) {
                Ok(true) => {
                    warn!(motor = m.as_str(), "motor re-enabled while STOPPED, re-disabling");
                    facade.disable(*m);
                }
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "connectivity lost asserting disable state");
                    drop(facade);
                    self.state = SentinelState::Fault;
                    return;
                }
            }
        }
        drop(facade);

        if !self.advisory_sent {
            match read_positions(store, channels, false) {
                Ok(current) if current.is_valid(store.motors(), store.fiber_center(), store.pmask_center()) => {
                    info!("advisory: position is valid, operator may `reinit`");
                }
                _ => {
                    info!("advisory: position invalid, operator may `allow_moves` to enter RESTRICTED");
                }
            }
            self.advisory_sent = true;
        }
    }

    fn process_restricted<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let current = match read_positions(store, channels, false) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "sentinel lost connectivity while RESTRICTED");
                self.state = SentinelState::Fault;
                return;
            }
        };
        let commanded = match read_positions(store, channels, true) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "sentinel lost connectivity while RESTRICTED");
                self.state = SentinelState::Fault;
                return;
            }
        };

        for (m, dir) in self.directive.clone() {
            let (Some(target), Some(current)) = (commanded.get(m), current.get(m)) else {
                continue;
            };
            let satisfied = match dir {
                Direction::Increasing => target >= current,
                Direction::Decreasing => target <= current,
            };
            if !satisfied {
                error!(motor = m.as_str(), "commanded position violates RESTRICTED directive");
                stop_all(store, channels);
                self.enter_stopped(store, channels);
                return;
            }
        }
        // Recovering validity does not auto-promote out of RESTRICTED;
        // the operator must explicitly `reinit`.
    }

    fn enter_init(&mut self) {
        self.state = SentinelState::Init;
        self.directive.clear();
        self.advisory_sent = false;
    }

    fn enter_stopped<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        self.state = SentinelState::Stopped;
        self.directive.clear();
        self.advisory_sent = false;
        let mut facade = MotorFacade::new(channels);
        for (m, _) in store.motors() {
            if let Err(e) = facade.reset_commanded(*m) {
                error!(error = %e, motor = m.as_str(), "failed to reset commanded position entering STOPPED");
            }
            facade.disable(*m);
        }
    }

    /// Compute the SentinelDirective from the current position, enter
    /// RESTRICTED, and disable every motor the directive does not name.
    /// `STOPPED` with no directive (both fiber and mask extended and
    /// needing translation) is signalled by an empty directive plus
    /// immediately re-entering STOPPED.
    fn enter_restricted<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C, current: &Position) {
        match compute_directive(current, store.fiber_center(), store.pmask_center(), store.motors()) {
            Some(directive) => {
                self.state = SentinelState::Restricted;
                let mut facade = MotorFacade::new(channels);
                for (m, _) in store.motors() {
                    if !directive.iter().any(|(dm, _)| *dm == *m) {
                        facade.disable(*m);
                    }
                }
                drop(facade);
                self.directive = directive;
            }
            None => {
                error!("both fiber and mask extended and require translation, no safe automatic recovery");
                self.enter_stopped(store, channels);
            }
        }
    }
}

fn read_positions<C: ChannelSurface>(store: &ConfigurationStore, channels: &C, commanded: bool) -> Result<Position, PcuError> {
    let mut pos = Position::empty();
    for (m, _) in store.motors() {
        let channel = if commanded { format!("{}.cmd", m.as_str()) } else { format!("{}.pos", m.as_str()) };
        let v = channels
            .get_f64(&channel)
            .ok_or_else(|| PcuError::Connectivity(format!("{channel} has no value")))?;
        pos.set(*m, v);
    }
    Ok(pos)
}

fn stop_all<C: ChannelSurface>(store: &ConfigurationStore, channels: &mut C) {
    let mut facade = MotorFacade::new(channels);
    for (m, _) in store.motors() {
        facade.stop(*m);
        if let Err(e) = facade.reset_commanded(*m) {
            error!(error = %e, motor = m.as_str(), "failed to reset commanded position while stopping");
        }
    }
}

fn m1_m2_within_limits(current: &Position, metas: &[(MotorId, MotorMeta)]) -> bool {
    [MotorId::M1, MotorId::M2].into_iter().all(|m| {
        let Some(v) = current.get(m) else { return true };
        let Some((_, meta)) = metas.iter().find(|(id, _)| *id == m) else {
            return false;
        };
        v >= meta.limits.0 && v <= meta.limits.1
    })
}

fn toward_center(current: &Position, center: &Position) -> SentinelDirective {
    let mut directive = Vec::new();
    for m in [MotorId::M1, MotorId::M2] {
        if let (Some(c), Some(cur)) = (center.get(m), current.get(m)) {
            let dir = if c >= cur { Direction::Increasing } else { Direction::Decreasing };
            directive.push((m, dir));
        }
    }
    directive
}

/// RESTRICTED-mode recovery directive per §4.4. Returns `None` when
/// both fiber and mask are extended and both require a translation
/// recovery — that combination has no safe automatic move.
fn compute_directive(
    current: &Position,
    fiber_center: &Position,
    mask_center: &Position,
    metas: &[(MotorId, MotorMeta)],
) -> Option<SentinelDirective> {
    let fiber_extended = current.fiber_extended();
    let mask_extended = current.mask_extended();
    let fiber_in_hole = current.in_hole(fiber_center, KMIRR_RADIUS);
    let mask_in_hole = current.in_hole(mask_center, KMIRR_RADIUS);
    let m1_m2_ok = m1_m2_within_limits(current, metas);

    let fiber_needs_retract = fiber_extended && !fiber_in_hole;
    let mask_needs_retract = mask_extended && !mask_in_hole;
    let fiber_needs_translate = fiber_extended && fiber_in_hole && !m1_m2_ok;
    let mask_needs_translate = mask_extended && mask_in_hole && !m1_m2_ok;

    if fiber_extended && mask_extended && (fiber_needs_translate || mask_needs_translate) {
        return None;
    }

    let mut directive = Vec::new();
    if fiber_needs_retract {
        directive.push((MotorId::M4, Direction::Decreasing));
    } else if fiber_needs_translate {
        directive.extend(toward_center(current, fiber_center));
    }
    if mask_needs_retract {
        directive.push((MotorId::M3, Direction::Decreasing));
    } else if mask_needs_translate {
        directive.extend(toward_center(current, mask_center));
    }
    Some(directive)
}
