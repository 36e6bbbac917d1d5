//! Demo harness: bring up one emulated device with the echo firmware, round
//! trip a few bytes over the virtual wire, and dump the pin table.

use std::path::Path;
use std::time::Duration;

use clap::Parser;

use virtuino::firmware::{self, EchoFirmware};
use virtuino::{Config, VirtualDeviceController, load_config};

#[derive(Debug, Parser)]
#[command(name = "virtuino", about = "Virtual serial microcontroller emulator")]
struct Args {
    /// Path to the device TOML config
    #[arg(long, default_value = "virtuino.toml")]
    config: String,

    /// Override the configured port name
    #[arg(long)]
    port: Option<String>,

    /// Override the configured board type (uno | mega)
    #[arg(long)]
    board: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = if Path::new(&args.config).exists() {
        load_config(&args.config)?
    } else {
        tracing::info!("no config at '{}', using defaults", args.config);
        Config::default()
    };
    let board = args.board.unwrap_or(config.device.board);
    let port = args.port.unwrap_or(config.device.port);

    let controller = VirtualDeviceController::new(Box::new(EchoFirmware::new()));
    let resolved = controller.set_board(&board);
    tracing::info!("emulating {} board on {}", resolved, port);

    controller.connect(&port)?;
    let host = controller
        .host_endpoint()
        .ok_or("virtual uart did not come up")?;

    // consume the begin handshake the device emits on connect
    let mut begin = Vec::new();
    for _ in 0..firmware::begin_frame().len() {
        match host.read_timeout(Duration::from_millis(200)) {
            Some(byte) => begin.push(byte),
            None => break,
        }
    }
    tracing::info!("begin handshake: {:?}", begin);

    let payload = [0x01, 0x02, 0x03];
    host.write_all(&payload);
    let mut echoed = Vec::new();
    while echoed.len() < payload.len() {
        match host.read_timeout(Duration::from_millis(200)) {
            Some(byte) => echoed.push(byte),
            None => break,
        }
    }
    tracing::info!("sent {:?}, echoed {:?}", payload, echoed);

    let pins = controller.pin_table();
    tracing::info!("pin table has {} entries", pins.len());
    for pin in &pins {
        tracing::debug!(
            "pin {:>2} {:<3} digital={} analog={} pwm={} rx={} tx={} writable={}",
            pin.address,
            pin.name,
            pin.digital,
            pin.analog,
            pin.pwm,
            pin.rx,
            pin.tx,
            pin.writable
        );
    }

    controller.disconnect();
    controller.stop();
    tracing::info!("done");
    Ok(())
}
