//! # PCU Collision Sentinel
//!
//! Standalone periodic task driving [`pcu_core::sentinel::SentinelStateMachine`].
//! Ticks at `TIME_DELAY` (0.5 s), independently of the Sequencer.
//!
//! See `pcu_sequencer`'s module documentation for the channel surface
//! caveat: this binary seeds its own [`TableChannelSurface`] in the
//! absence of a real transport wiring it to the Sequencer process.

use std::thread;
use std::time::Duration;

use pcu_common::channel::{ChannelSurface, TableChannelSurface};
use pcu_common::config::ConfigurationStore;
use pcu_common::consts::TIME_DELAY;
use pcu_core::sentinel::SentinelStateMachine;
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

    let mut sentinel = SentinelStateMachine::new();
    info!("collision sentinel starting");

    loop {
        sentinel.tick(&store, &mut channels);
        thread::sleep(Duration::from_secs_f64(TIME_DELAY));
    }
}
