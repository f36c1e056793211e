//! End-to-end scenarios from the testable-properties suite: Sequencer
//! and Sentinel driven together against one shared channel surface,
//! with a small motor simulator stepping current position toward
//! commanded position each tick.

use pcu_common::channel::{ChannelSurface, TableChannelSurface};
use pcu_common::config::ConfigurationStore;
use pcu_common::position::{MotorId, Position};
use pcu_core::sentinel::{SentinelState, SentinelStateMachine};
use pcu_core::sequencer::{SequencerState, SequencerStateMachine};

const DOC: &str = r#"
[base.telescope]
m1 = -276.0
m2 = 140.0
m3 = 0.0
m4 = 0.0

[base.pmask_anchor]
m1 = -10.0
m2 = 5.0

[base.fiber_anchor]
m1 = -173.375
m2 = 0.0

[fiber_variants.fiber_bundle]
m1 = -173.375
m2 = 0.0
m3 = 0.0
m4 = 20.0

[mask_variants.pinhole_mask]
m1 = -10.0
m2 = 5.0
m3 = 15.0
m4 = 0.0

[motors.m1]
limits = [-300.0, 300.0]
tolerance = 0.1

[motors.m2]
limits = [-300.0, 300.0]
tolerance = 0.1

[motors.m3]
limits = [0.0, 20.0]
tolerance = 0.1

[motors.m4]
limits = [0.0, 20.0]
tolerance = 0.1
"#;

fn seed_motors(channels: &mut TableChannelSurface, pos: &Position) {
    for m in MotorId::ALL {
        channels.set_f64(&format!("{}.pos", m.as_str()), pos.get(m).unwrap_or(0.0));
        channels.set_f64(&format!("{}.cmd", m.as_str()), pos.get(m).unwrap_or(0.0));
        channels.set_f64(&format!("{}.enable", m.as_str()), 1.0);
    }
}

/// Steps every motor's `.pos` channel one unit toward its `.cmd`
/// channel, simulating physical motion without a real actuator.
fn step_motors(channels: &mut TableChannelSurface) {
    for m in MotorId::ALL {
        let pos_ch = format!("{}.pos", m.as_str());
        let cmd_ch = format!("{}.cmd", m.as_str());
        let (Some(pos), Some(cmd)) = (channels.get_f64(&pos_ch), channels.get_f64(&cmd_ch)) else {
            continue;
        };
        let delta = cmd - pos;
        let step = delta.signum() * delta.abs().min(50.0);
        channels.set_f64(&pos_ch, pos + step);
    }
}

fn run_move_to_completion(seq: &mut SequencerStateMachine, store: &ConfigurationStore, channels: &mut TableChannelSurface, max_ticks: u64) {
    for _ in 0..max_ticks {
        step_motors(channels);
        seq.tick(store, channels);
        if seq.state() != SequencerState::Moving {
            break;
        }
    }
}

#[test]
fn scenario_1_telescope_to_fiber_bundle_reaches_destination() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    let telescope = Position::empty().with(MotorId::M1, -276.0).with(MotorId::M2, 140.0).with(MotorId::M3, 0.0).with(MotorId::M4, 0.0);
    seed_motors(&mut channels, &telescope);

    let mut seq = SequencerStateMachine::new();
    seq.tick(&store, &mut channels);
    assert_eq!(seq.configuration(), "telescope");

    channels.set_string(":pos", "fiber_bundle".to_string());
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::Moving);

    run_move_to_completion(&mut seq, &store, &mut channels, 50);
    assert_eq!(seq.state(), SequencerState::InPos);
    assert_eq!(seq.configuration(), "fiber_bundle");
    assert_eq!(channels.get_f64("m4.pos"), Some(20.0));
}

#[test]
fn scenario_2_offset_in_pinhole_mask_completes_and_keeps_configuration() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    let pmask = Position::empty().with(MotorId::M1, -10.0).with(MotorId::M2, 5.0).with(MotorId::M3, 15.0).with(MotorId::M4, 0.0);
    seed_motors(&mut channels, &pmask);

    let mut seq = SequencerStateMachine::new();
    seq.tick(&store, &mut channels);
    assert_eq!(seq.configuration(), "pinhole_mask");

    channels.set_f64("m1Offset", 5.0);
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::Moving);

    run_move_to_completion(&mut seq, &store, &mut channels, 50);
    assert_eq!(seq.state(), SequencerState::InPos);
    assert_eq!(seq.configuration(), "pinhole_mask");
    assert_eq!(channels.get_f64("m1OffsetRb"), Some(5.0));
    assert_eq!(channels.get_f64("m1.pos"), Some(-5.0));
}

#[test]
fn scenario_3_offset_exceeding_clearance_rejected_no_command_issued() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    let fiber = Position::empty().with(MotorId::M1, -173.375).with(MotorId::M2, 0.0).with(MotorId::M3, 0.0).with(MotorId::M4, 20.0);
    seed_motors(&mut channels, &fiber);

    let mut seq = SequencerStateMachine::new();
    seq.tick(&store, &mut channels);
    assert_eq!(seq.configuration(), "fiber_bundle");

    channels.set_f64("m1Offset", 100.0);
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::InPos);
    // commanded position unchanged: no move was issued
    assert_eq!(channels.get_f64("m1.cmd"), Some(-173.375));
}

#[test]
fn scenario_4_move_timeout_faults_then_reinits_to_inpos() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    let telescope = Position::empty().with(MotorId::M1, -276.0).with(MotorId::M2, 140.0).with(MotorId::M3, 0.0).with(MotorId::M4, 0.0);
    seed_motors(&mut channels, &telescope);

    let mut seq = SequencerStateMachine::new();
    seq.tick(&store, &mut channels);
    channels.set_string(":pos", "fiber_bundle".to_string());
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::Moving);

    // Never step the motors: every step times out.
    for _ in 0..=pcu_common::consts::move_timeout_ticks() {
        seq.tick(&store, &mut channels);
    }
    assert_eq!(seq.state(), SequencerState::Fault);
    assert_eq!(seq.configuration(), "");

    channels.set_string(":request", "reinit".to_string());
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::InPos);
    assert_eq!(seq.configuration(), "telescope");
}

#[test]
fn scenario_5_sentinel_restricted_recovery_and_reviolation() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    // mask (m3) extended, (m1,m2) far outside the mask hole.
    let bad = Position::empty().with(MotorId::M1, -276.0).with(MotorId::M2, 140.0).with(MotorId::M3, 20.0).with(MotorId::M4, 0.0);
    seed_motors(&mut channels, &bad);

    let mut sentinel = SentinelStateMachine::new();
    sentinel.tick(&store, &mut channels);
    assert_eq!(sentinel.state(), SentinelState::Stopped);

    channels.set_string(":request", "allow_moves".to_string());
    sentinel.tick(&store, &mut channels);
    assert_eq!(sentinel.state(), SentinelState::Restricted);

    channels.set_f64("m3.cmd", 25.0);
    sentinel.tick(&store, &mut channels);
    assert_eq!(sentinel.state(), SentinelState::Stopped);
}

#[test]
fn scenario_6_disconnect_during_moving_faults_both_machines_then_reinits() {
    let store = ConfigurationStore::from_toml_str(DOC).unwrap();
    let mut channels = TableChannelSurface::new();
    let telescope = Position::empty().with(MotorId::M1, -276.0).with(MotorId::M2, 140.0).with(MotorId::M3, 0.0).with(MotorId::M4, 0.0);
    seed_motors(&mut channels, &telescope);

    let mut seq = SequencerStateMachine::new();
    let mut sentinel = SentinelStateMachine::new();
    seq.tick(&store, &mut channels);
    sentinel.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::InPos);
    assert_eq!(sentinel.state(), SentinelState::Monitoring);

    channels.set_string(":pos", "fiber_bundle".to_string());
    seq.tick(&store, &mut channels);
    assert_eq!(seq.state(), SequencerState::Moving);

    // Simulate a channel fabric disconnect: both machines lose every
    // channel at once.
    let mut disconnected = TableChannelSurface::new();
    seq.tick(&store, &mut disconnected);
    sentinel.tick(&store, &mut disconnected);
    assert_eq!(seq.state(), SequencerState::Fault);
    assert_eq!(sentinel.state(), SentinelState::Fault);

    seed_motors(&mut disconnected, &telescope);
    disconnected.set_string(":request", "reinit".to_string());
    seq.tick(&store, &mut disconnected);
    assert_eq!(seq.state(), SequencerState::InPos);

    // seq.tick already consumed the shared `:request` channel; the
    // two machines do not share a request channel in a real
    // deployment (each owns its own prefix), so re-publish for the
    // sentinel's distinct `:request`.
    disconnected.set_string(":request", "reinit".to_string());
    sentinel.tick(&store, &mut disconnected);
    assert_eq!(sentinel.state(), SentinelState::Monitoring);
}
