mod analog;
mod broker;
mod clock;
mod config;
mod cycle;
mod decision;
mod outputs;
mod ports;
mod protocol;
mod retained;
mod session;
mod telemetry;
mod watchdog;

#[cfg(feature = "adc")]
mod adc;
#[cfg(feature = "sim")]
mod sim;

// The only BLE central adapter on this target is the simulator.
#[cfg(not(feature = "sim"))]
compile_error!("build with the `sim` feature: no hardware BLE central adapter exists yet");

use anyhow::{Context, Result};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use broker::MqttSink;
use clock::SystemClock;
use cycle::CyclePorts;
use outputs::{GpioOutputs, OutputPins, SharedOutputs};
use retained::FileStore;
use sim::{HostLink, SimCentral, SimDevice, SimPower};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    info!(
        devices = cfg.sensors.devices.len(),
        broker = %cfg.broker.host,
        "config loaded"
    );

    // ── Adapters ────────────────────────────────────────────────────
    let credentials = cfg
        .broker
        .username
        .as_deref()
        .zip(cfg.broker.password.as_deref());
    let sink = MqttSink::new(
        &cfg.broker.client_id,
        &cfg.broker.host,
        cfg.broker.port,
        credentials,
    );

    let outputs = SharedOutputs::new(
        GpioOutputs::new(
            OutputPins {
                pump: cfg.pins.pump as u8,
                status_led: cfg.pins.status_led as u8,
            },
            cfg.pins.active_low,
        )
        .context("failed to initialise outputs")?,
    );

    let ble = SimCentral::new(
        cfg.device_macs()
            .into_iter()
            .map(|mac| (mac, SimDevice::default()))
            .collect(),
    );

    #[cfg(feature = "adc")]
    let adc = adc::Ads1115::new(0x48).context("failed to initialise ADS1115")?;
    #[cfg(not(feature = "adc"))]
    let adc = sim::SimAdc;

    let mut ports = CyclePorts {
        ble,
        network: HostLink::new(),
        sink,
        adc,
        outputs,
        power: SimPower,
        clock: SystemClock::new(),
        store: FileStore::new(&cfg.retained.path),
    };

    // ── One wake cycle, then deep sleep ─────────────────────────────
    let report = cycle::run_cycle(&cfg, &mut ports).await;
    info!(
        boot_count = report.boot_count,
        online = report.online,
        "cycle report (deep sleep is simulated on this target)"
    );
    Ok(())
}
