pub mod attributes;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod evmeter;
pub mod guardian;
pub mod options;
pub mod prelude;
pub mod scheduler;
pub mod simulator;
pub mod topics;
pub mod transport;
pub mod utils;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::client::{Client, SetupOutcome};
use crate::scheduler::Scheduler;
use crate::simulator::SimulatedCharger;
use crate::transport::{MemoryBus, MemoryTransport};

use log::LevelFilter;
use std::sync::Arc;

// Everything is let through env_logger and the level is held by the log
// facade instead, so the config file can still change it after startup.
fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("trace");
    let _ = env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::Info);
    }
}

fn apply_loglevel(loglevel: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    match LevelFilter::from_str(loglevel) {
        Ok(level) => log::set_max_level(level),
        Err(_) => warn!("ignoring unknown loglevel {}", loglevel),
    }
}

fn simulated(config: Config) -> (Client, SimulatedCharger) {
    let bus = MemoryBus::new();
    let charger = SimulatedCharger::spawn(
        bus.clone(),
        config.charger_id,
        &config.user_id,
        SimulatedCharger::sample_status(),
        SimulatedCharger::sample_metrics(),
    );
    let client = Client::new(config, Arc::new(MemoryTransport::new(bus)));

    (client, charger)
}

pub async fn app(options: Options, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    init_logging();

    info!("evmeter-bridge {} starting", CARGO_PKG_VERSION);

    let config = Config::new(options.config_file.clone())?;
    apply_loglevel(&config.loglevel);

    // the simulated charger has to outlive the client
    let (client, _charger) = if options.simulate {
        info!("using a simulated charger, the broker is not contacted");
        let (client, charger) = simulated(config);
        (client, Some(charger))
    } else {
        (Client::mqtt(config), None)
    };
    let client = Arc::new(client);

    if options.validate {
        match client.validate().await? {
            SetupOutcome::Verified => info!("setup verified"),
            SetupOutcome::DeviceOffline(reason) => {
                warn!("setup accepted, charger currently offline: {}", reason)
            }
        }
        return Ok(());
    }

    if options.once {
        let r = client.poll().await;
        client.disconnect().await;
        let snapshot = r?;
        println!("{}", serde_json::to_string_pretty(&snapshot.to_json())?);
        return Ok(());
    }

    Scheduler::new(client).start(shutdown_rx).await?;

    info!("shutdown complete");
    Ok(())
}
