//! Sequencer state machine: accepts configuration and offset requests,
//! decomposes them into an ordered move queue, and tracks completion
//! with a per-step timeout.

use std::collections::VecDeque;

use pcu_common::channel::ChannelSurface;
use pcu_common::config::ConfigurationStore;
use pcu_common::consts::{move_timeout_ticks, CLEARANCE_FIBER, CLEARANCE_PMASK, HOME, MOVE_TIME};
use pcu_common::error::PcuError;
use pcu_common::position::{MotorId, Position};
use tracing::{error, info, warn};

use crate::motor_facade::MotorFacade;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SequencerState {
    Init = 0,
    InPos = 1,
    Moving = 2,
    Fault = 3,
    Terminate = 4,
}

impl SequencerState {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Init),
            1 => Some(Self::InPos),
            2 => Some(Self::Moving),
            3 => Some(Self::Fault),
            4 => Some(Self::Terminate),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::InPos => "INPOS",
            Self::Moving => "MOVING",
            Self::Fault => "FAULT",
            Self::Terminate => "TERMINATE",
        }
    }
}

impl Default for SequencerState {
    fn default() -> Self {
        Self::Init
    }
}

/// The partial Position currently being executed, paired with a
/// single-shot countdown timer (in ticks of `TIME_DELAY`).
#[derive(Debug, Clone, PartialEq)]
struct CurrentMove {
    target: Position,
    ticks_remaining: u64,
}

#[derive(Debug, Default)]
pub struct SequencerStateMachine {
    state: SequencerState,
    configuration: String,
    destination: String,
    plan: VecDeque<Position>,
    current_move: Option<CurrentMove>,
}

impl SequencerStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SequencerState {
        self.state
    }

    #[must_use]
    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    /// Run one tick: drain the request channel, then dispatch to the
    /// current state's handler. Does not yield mid-tick.
    pub fn tick<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        if let Some(cmd) = channels.take_string(":request") {
            self.handle_request(&cmd.to_lowercase(), store, channels);
        }

        match self.state {
            SequencerState::Init => self.process_init(store, channels),
            SequencerState::InPos => self.process_inpos(store, channels),
            SequencerState::Moving => self.process_moving(store, channels),
            SequencerState::Fault | SequencerState::Terminate => {}
        }

        channels.set_string(":stst", self.state.label().to_string());
        channels.set_string(":posRb", self.configuration.clone());
    }

    fn handle_request<C: ChannelSurface>(&mut self, cmd: &str, store: &ConfigurationStore, channels: &mut C) {
        match cmd {
            "reinit" if matches!(self.state, SequencerState::Fault | SequencerState::InPos) => {
                info!("sequencer reinit requested");
                self.state = SequencerState::Init;
            }
            "stop" if self.state == SequencerState::Moving => {
                warn!("sequencer stop requested mid-move");
                self.stop_motors(store, channels);
                self.clear_plan();
                self.state = SequencerState::InPos;
            }
            "enable" if self.state == SequencerState::InPos => {
                let mut facade = MotorFacade::new(channels);
                for (m, _) in store.motors() {
                    facade.enable(*m);
                }
            }
            "disable" if matches!(self.state, SequencerState::InPos | SequencerState::Moving) => {
                let mut facade = MotorFacade::new(channels);
                for (m, _) in store.motors() {
                    facade.disable(*m);
                }
            }
            "shutdown" if self.state != SequencerState::Moving => {
                info!("sequencer shutdown requested");
                self.state = SequencerState::Terminate;
            }
            _ => {
                error!(command = cmd, state = self.state.label(), "request rejected in current state");
            }
        }
    }

    fn process_init<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let facade = MotorFacade::new(channels);
        match compute_current_configuration(store, &facade) {
            Ok(name) => {
                info!(configuration = %name, "sequencer initialized");
                self.configuration = name;
                self.destination.clear();
                self.state = SequencerState::InPos;
            }
            Err(e) => {
                error!(error = %e, "sequencer init failed");
                self.state = SequencerState::Fault;
            }
        }
    }

    fn process_inpos<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        if let Some(dest) = channels.take_string(":pos") {
            if !dest.is_empty() {
                match self.build_configuration_plan(&dest, store) {
                    Ok(plan) => {
                        self.plan = plan;
                        self.destination = dest;
                        self.state = SequencerState::Moving;
                        self.advance_plan(store, channels);
                    }
                    Err(e) => error!(error = %e, destination = %dest, "configuration request rejected"),
                }
                return;
            }
        }

        let offsets = self.drain_offsets(channels, store);
        if offsets.set_motors().next().is_some() {
            match self.build_offset_destination(&offsets, store) {
                Ok(dest) => {
                    for m in dest.set_motors() {
                        channels.set_f64(&format!("{}OffsetRb", m.as_str()), offsets.get(m).unwrap());
                    }
                    self.destination = self.configuration.clone();
                    self.plan = VecDeque::from([dest]);
                    self.state = SequencerState::Moving;
                    self.advance_plan(store, channels);
                }
                Err(e) => error!(error = %e, "offset request rejected"),
            }
        }
    }

    fn process_moving<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let offsets = self.drain_offsets(channels, store);
        if offsets.set_motors().next().is_some() {
            error!("offset request rejected: protocol error, an offset was requested while MOVING");
        }

        let Some(current) = self.current_move.clone() else {
            self.advance_plan(store, channels);
            return;
        };

        let facade = MotorFacade::new(channels);
        for m in current.target.set_motors() {
            match facade.is_enabled(m) {
                Ok(true) => {}
                Ok(false) => {
                    error!(motor = m.as_str(), "motor disabled, likely by the collision sentinel");
                    drop(facade);
                    self.fault_out(store, channels);
                    return;
                }
                Err(e) => {
                    error!(error = %e, "connectivity lost while checking enable state");
                    drop(facade);
                    self.fault_out(store, channels);
                    return;
                }
            }
        }

        let mut complete = true;
        for m in current.target.set_motors() {
            let target = current.target.get(m).unwrap();
            let tolerance = store.meta(m).map_or(0.0, |meta| meta.tolerance);
            match facade.get_position(m) {
                Ok(actual) if (actual - target).abs() < tolerance => {}
                Ok(_) => complete = false,
                Err(e) => {
                    error!(error = %e, "connectivity lost while polling move completion");
                    drop(facade);
                    self.fault_out(store, channels);
                    return;
                }
            }
        }
        drop(facade);

        if complete {
            self.current_move = None;
            self.advance_plan(store, channels);
        } else {
            let remaining = current.ticks_remaining.saturating_sub(1);
            if remaining == 0 {
                let err = PcuError::Timeout { elapsed_s: MOVE_TIME, limit_s: MOVE_TIME };
                error!(error = %err, "move step timed out");
                self.stop_motors(store, channels);
                self.clear_plan();
                self.state = SequencerState::Fault;
            } else {
                self.current_move = Some(CurrentMove { ticks_remaining: remaining, ..current });
            }
        }
    }

    /// Issue the next queued step, or — if the plan is empty — finish
    /// the move and return to INPOS with the configuration updated.
    fn advance_plan<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        if let Some(step) = self.plan.pop_front() {
            let mut facade = MotorFacade::new(channels);
            for m in step.set_motors() {
                match facade.is_enabled(m) {
                    Ok(true) => {}
                    Ok(false) => {
                        error!(motor = m.as_str(), "motor disabled immediately before issuing next move step");
                        drop(facade);
                        self.fault_out(store, channels);
                        return;
                    }
                    Err(e) => {
                        error!(error = %e, "connectivity lost while checking enable state for next move step");
                        drop(facade);
                        self.fault_out(store, channels);
                        return;
                    }
                }
            }
            for m in step.set_motors() {
                facade.set_position(m, step.get(m).unwrap());
            }
            self.current_move = Some(CurrentMove { target: step, ticks_remaining: move_timeout_ticks() });
        } else {
            self.configuration = std::mem::take(&mut self.destination);
            self.state = SequencerState::InPos;
        }
    }

    fn fault_out<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        self.stop_motors(store, channels);
        self.clear_plan();
        self.state = SequencerState::Fault;
    }

    fn stop_motors<C: ChannelSurface>(&mut self, store: &ConfigurationStore, channels: &mut C) {
        let mut facade = MotorFacade::new(channels);
        for (m, _) in store.motors() {
            facade.stop(*m);
        }
    }

    fn clear_plan(&mut self) {
        self.plan.clear();
        self.current_move = None;
        self.configuration.clear();
        self.destination.clear();
    }

    /// MovePlan construction for a named destination per §4.3: prepend
    /// a retraction step when the configuration label changes, then
    /// append one single-motor step per valid motor in store order.
    fn build_configuration_plan(&self, dest: &str, store: &ConfigurationStore) -> Result<VecDeque<Position>, PcuError> {
        let cfg = store
            .named(dest)
            .ok_or_else(|| PcuError::ProtocolMisuse(format!("unknown configuration '{dest}'")))?;

        let mut plan = VecDeque::new();
        if self.configuration != dest {
            plan.push_back(Position::empty().with(MotorId::M3, HOME).with(MotorId::M4, HOME));
        }
        for (m, _) in store.motors() {
            if let Some(v) = cfg.position.get(*m) {
                plan.push_back(Position::empty().with(*m, v));
            }
        }
        Ok(plan)
    }

    /// Drain every motor's offset channel into one merged partial
    /// Position — two offsets arriving in the same tick are combined
    /// into a single step.
    fn drain_offsets<C: ChannelSurface>(&self, channels: &mut C, store: &ConfigurationStore) -> Position {
        let mut offsets = Position::empty();
        for (m, _) in store.motors() {
            if let Some(v) = channels.take_f64(&format!("{}Offset", m.as_str())) {
                offsets.set(*m, v);
            }
        }
        offsets
    }

    /// Resolve an accepted offset request to an absolute destination
    /// Position per §4.3's offset validation rules.
    fn build_offset_destination(&self, offsets: &Position, store: &ConfigurationStore) -> Result<Position, PcuError> {
        if self.configuration != "pinhole_mask" && self.configuration != "fiber_bundle" {
            return Err(PcuError::ProtocolMisuse(
                "offsets are only honoured in the pinhole_mask or fiber_bundle configuration".to_string(),
            ));
        }
        let anchor = store
            .named(&self.configuration)
            .ok_or_else(|| PcuError::Unreachable(format!("active configuration '{}' vanished from the store", self.configuration)))?;

        let mut dest = Position::empty();
        for m in offsets.set_motors() {
            if m == MotorId::M3 && self.configuration != "pinhole_mask" {
                return Err(PcuError::ProtocolMisuse("m3 offsets are only valid in pinhole_mask".to_string()));
            }
            if m == MotorId::M4 && self.configuration != "fiber_bundle" {
                return Err(PcuError::ProtocolMisuse("m4 offsets are only valid in fiber_bundle".to_string()));
            }
            let base = anchor
                .position
                .get(m)
                .ok_or_else(|| PcuError::Unreachable(format!("{} absent from anchor configuration", m.as_str())))?;
            dest.set(m, base + offsets.get(m).unwrap());
        }

        let (center, radius) = if self.configuration == "pinhole_mask" {
            (store.pmask_center(), CLEARANCE_PMASK)
        } else {
            (store.fiber_center(), CLEARANCE_FIBER)
        };

        // The clearance circle and full validity are checked against the
        // resulting physical position (anchor overlaid with the offset
        // motors), not the bare partial `dest` — the circle test needs
        // both m1 and m2 even when only one of them was offset.
        let mut probe = anchor.position;
        for m in dest.set_motors() {
            probe.set(m, dest.get(m).unwrap());
        }
        if !probe.in_hole(center, radius) {
            return Err(PcuError::ProtocolMisuse("offset destination exceeds the clearance circle".to_string()));
        }

        if !probe.is_valid(store.motors(), store.fiber_center(), store.pmask_center()) {
            return Err(PcuError::ProtocolMisuse("offset destination violates a motor limit".to_string()));
        }

        Ok(dest)
    }
}

/// INIT-state configuration matching: the first exact (within
/// per-axis tolerance) match among all named configurations, in
/// base/fiber/mask order, falling back to `user_def` when inside
/// either clearance circle, or empty when unmatched.
fn compute_current_configuration<C: ChannelSurface>(
    store: &ConfigurationStore,
    facade: &MotorFacade<'_, C>,
) -> Result<String, PcuError> {
    let mut current = Position::empty();
    for (m, _) in store.motors() {
        current.set(*m, facade.get_position(*m)?);
    }

    for cfg in store.configurations() {
        if current.within_tolerances(&cfg.position, store.motors()) {
            return Ok(cfg.name.clone());
        }
    }

    if current.mask_extended() && !current.fiber_extended() && current.in_pmask_hole(store.pmask_center()) {
        return Ok("user_def".to_string());
    }
    if current.fiber_extended() && !current.mask_extended() && current.in_fiber_hole(store.fiber_center()) {
        return Ok("user_def".to_string());
    }

    Ok(String::new())
}
