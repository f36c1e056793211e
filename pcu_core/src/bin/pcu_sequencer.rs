//! # PCU Sequencer
//!
//! Standalone periodic task driving [`pcu_core::sequencer::SequencerStateMachine`]
//! against the shared motor channel surface. Ticks at `TIME_DELAY` (0.5 s).
//!
//! The wire transport between this process and the Collision Sentinel /
//! physical motor controllers is outside this crate's scope; this
//! binary seeds an in-process [`TableChannelSurface`] so the state
//! machine has somewhere to read and write. A deployment wiring both
//! machines to a real channel fabric (e.g. EPICS channel access) would
//! replace `TableChannelSurface` with an adapter implementing
//! [`ChannelSurface`].

use std::thread;
use std::time::Duration;

use pcu_common::channel::{ChannelSurface, TableChannelSurface};
use pcu_common::config::ConfigurationStore;
use pcu_common::consts::TIME_DELAY;
use pcu_common::position::MotorId;
use pcu_core::sequencer::SequencerStateMachine;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "pcu.toml".to_string());

    let store = match ConfigurationStore::load(std::path::Path::new(&config_path)) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("failed to load configuration '{config_path}': {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(store.log_level().as_filter().parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(path = %config_path, "configuration document loaded");

    let mut channels = TableChannelSurface::new();
    if let Some(first) = store.configurations().first() {
        for (m, _) in store.motors() {
            let v = first.position.get(*m).unwrap_or(0.0);
            channels.set_f64(&format!("{}.pos", m.as_str()), v);
            channels.set_f64(&format!("{}.cmd", m.as_str()), v);
            channels.set_f64(&format!("{}.enable", m.as_str()), 1.0);
        }
    }
    for m in MotorId::ALL {
        channels.set_f64(&format!("{}Offset", m.as_str()), pcu_common::consts::RESET_VAL);
    }

    let mut sequencer = SequencerStateMachine::new();
    info!("sequencer starting");

    loop {
        sequencer.tick(&store, &mut channels);
        thread::sleep(Duration::from_secs_f64(TIME_DELAY));
    }
}
