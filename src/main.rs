//! Beacon locator node
//!
//! Runs one of the three roles: the gateway anchor that locates beacons, a
//! relay anchor that forwards what it hears, or the beacon itself.

use beacon_locator::api::{
    BeaconTransmitter, GatewayNode, JsonLinesSink, PositioningSession, RelayForwarder, SosSource,
};
use beacon_locator::core::AnchorId;
use beacon_locator::hardware::{RadioTransceiver, SerialRadio, SimulatedRadio};
use beacon_locator::utils::{init_logging, SystemConfig};
use clap::{Parser, ValueEnum};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Gateway anchor: collect readings and locate beacons
    Master,
    /// Relay anchor: forward beacon signal strength to the gateway
    Relay,
    /// Beacon: transmit pings
    Beacon,
}

#[derive(Parser)]
#[command(name = "beacon-locator")]
#[command(about = "RSSI trilateration for three-anchor LoRa beacon tracking", long_about = None)]
struct Args {
    /// Node role
    #[arg(long, value_enum)]
    mode: Mode,

    /// JSON configuration file (built-in layout if omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Anchor id of this node (relay mode)
    #[arg(long)]
    id: Option<String>,

    /// Beacon device id
    #[arg(long, default_value = "DEV001")]
    device_id: String,

    /// Serial device of the radio module
    #[arg(long, required_unless_present = "simulate")]
    port: Option<String>,

    /// Use a simulated radio instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Beacon sends SOS on pings 5 to 7
    #[arg(long)]
    sos_drill: bool,

    /// Stop after this many seconds
    #[arg(long)]
    run_for_secs: Option<u64>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = match &args.config {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };
    let anchor_ids = config.anchor_ids()?;
    config.local_anchor = match (args.mode, &args.id) {
        (Mode::Relay, Some(id)) => AnchorId::new(id),
        (Mode::Relay, None) => return Err("relay mode needs --id".into()),
        _ => anchor_ids[0].clone(),
    };
    config.ensure_valid()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Some(secs) = args.run_for_secs {
        let flag = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            flag.store(true, Ordering::Relaxed);
        });
    }

    let radio = open_radio(&args, &config, &anchor_ids[1..])?;
    info!(mode = ?args.mode, anchor = %config.local_anchor, radio = %radio.name(), "starting node");

    match args.mode {
        Mode::Master => {
            let session = PositioningSession::new(&config)?;
            let sink = JsonLinesSink::new(io::stdout());
            GatewayNode::new(radio, sink, session, &config.gateway).run(&shutdown);
        }
        Mode::Relay => {
            RelayForwarder::new(radio, &config)?.run(&shutdown);
        }
        Mode::Beacon => {
            let sos = if args.sos_drill { SosSource::Drill } else { SosSource::Off };
            BeaconTransmitter::new(radio, &args.device_id, &config.beacon, sos).run(&shutdown);
        }
    }

    Ok(())
}

fn open_radio(
    args: &Args,
    config: &SystemConfig,
    relays: &[AnchorId],
) -> Result<Box<dyn RadioTransceiver>, Box<dyn Error>> {
    let local_anchor = &config.local_anchor;
    if args.simulate {
        let relays = relays.iter().filter(|id| *id != local_anchor).cloned().collect();
        let name = format!("sim-{}", local_anchor);
        return Ok(Box::new(SimulatedRadio::new(&name, &args.device_id, relays)));
    }

    let port = args.port.as_ref().ok_or("--port is required without --simulate")?;
    let mut radio = SerialRadio::open(port, &config.serial)?;
    radio.configure()?;
    Ok(Box::new(radio))
}
