//! The wake-cycle orchestrator: one pass from wake to deep sleep.
//!
//! All platform effects arrive through the capability traits, so the whole
//! cycle runs unchanged against production adapters, the simulators, or test
//! fakes. The orchestrator exclusively owns the readings vector and the
//! retained state for the duration of the cycle.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::analog::{self, AnalogSample};
use crate::config::Config;
use crate::decision::{self, IrrigationDecision, Thresholds};
use crate::outputs::SharedOutputs;
use crate::ports::{
    AnalogInput, BleCentral, MacAddress, NetworkLink, OutputBank, OutputLine, PowerController,
    RetainedStore, TelemetrySink, TimeSync,
};
use crate::protocol::SensorReading;
use crate::session;
use crate::telemetry::{self, SystemStatus};
use crate::watchdog::Watchdog;

// ---------------------------------------------------------------------------
// Ports bundle
// ---------------------------------------------------------------------------

/// Every capability one cycle consumes, injected by `main` (production or
/// sim adapters) or by tests (fakes).
pub struct CyclePorts<B, N, S, A, O, P, C, R> {
    pub ble: B,
    pub network: N,
    pub sink: S,
    pub adc: A,
    pub outputs: SharedOutputs<O>,
    pub power: P,
    pub clock: C,
    pub store: R,
}

/// What the cycle did, for logging and tests. On the device target the
/// report is never observed (deep sleep halts execution first).
#[derive(Debug)]
pub struct CycleReport {
    pub boot_count: u32,
    pub online: bool,
    pub readings: Vec<(MacAddress, SensorReading)>,
    pub analog: AnalogSample,
    pub decision: Option<IrrigationDecision>,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

pub async fn run_cycle<B, N, S, A, O, P, C, R>(
    cfg: &Config,
    ports: &mut CyclePorts<B, N, S, A, O, P, C, R>,
) -> CycleReport
where
    B: BleCentral,
    N: NetworkLink,
    S: TelemetrySink,
    A: AnalogInput,
    O: OutputBank + Send + 'static,
    P: PowerController,
    C: TimeSync,
    R: RetainedStore,
{
    let started = tokio::time::Instant::now();
    ports.outputs.set(OutputLine::StatusLed, true);

    // -- Retained counter: load, derive, increment, save ---------------------

    let state = ports.store.load();
    let first_boot = state.first_boot();
    let read_battery = state.reads_battery(cfg.sensors.battery_interval);
    info!(
        boot_count = state.boot_count,
        first_boot, read_battery, "wake cycle starting"
    );
    if let Err(e) = ports.store.save(&state.next()) {
        // Losing the counter costs an extra battery read, nothing worse.
        warn!("failed to persist wake counter: {e:#}");
    }

    // -- Watchdog -------------------------------------------------------------

    let sleep_for = Duration::from_secs(cfg.sleep.sleep_minutes * 60);
    let mut watchdog = Watchdog::arm(
        ports.power.clone(),
        ports.outputs.clone(),
        Duration::from_secs(cfg.sleep.emergency_timeout_sec),
        sleep_for,
    );

    // -- Sensor sessions, strictly in configured order ------------------------

    let macs = cfg.device_macs();
    let mut readings: Vec<(MacAddress, SensorReading)> = Vec::with_capacity(macs.len());

    match ports.ble.power_on().await {
        Ok(()) => {
            for mac in &macs {
                let reading =
                    session::process_device(&mut ports.ble, *mac, read_battery, cfg.sensors.max_retries)
                        .await;
                readings.push((*mac, reading));
            }
        }
        Err(e) => {
            error!("BLE radio failed to power on: {e}");
            for mac in &macs {
                readings.push((*mac, SensorReading::failed()));
            }
        }
    }

    // -- Network + broker, bounded retry then offline continuation ------------

    let retry_wait = Duration::from_secs(cfg.network.retry_wait_sec);

    let mut link_up = false;
    for attempt in 1..=cfg.network.retry_max {
        match ports.network.connect().await {
            Ok(()) => {
                link_up = true;
                break;
            }
            Err(e) => {
                warn!(attempt, "network connect failed: {e:#}");
                if attempt < cfg.network.retry_max {
                    tokio::time::sleep(retry_wait).await;
                }
            }
        }
    }

    let mut online = false;
    if link_up {
        for attempt in 1..=cfg.network.retry_max {
            match ports.sink.connect().await {
                Ok(()) => {
                    online = true;
                    break;
                }
                Err(e) => {
                    warn!(attempt, "broker connect failed: {e:#}");
                    if attempt < cfg.network.retry_max {
                        tokio::time::sleep(retry_wait).await;
                    }
                }
            }
        }
    }
    if !online {
        warn!("continuing offline — telemetry skipped this cycle");
    }

    if let Err(e) = ports.clock.synchronize(first_boot).await {
        warn!("time sync failed: {e:#}");
    }

    // -- Local measurements ----------------------------------------------------

    let analog = analog::sample_all(&mut ports.adc);

    // -- Telemetry --------------------------------------------------------------

    if online {
        let status = SystemStatus {
            connection: true,
            link_quality: ports.network.link_quality(),
            up_time_sec: started.elapsed().as_secs(),
            last_time: ports.clock.formatted_local_time(),
            analog,
            ip: ports.network.ip_address(),
        };
        if let Err(e) = telemetry::publish_system(&mut ports.sink, &cfg.base_topic, &status).await {
            warn!("status telemetry failed: {e:#}");
        }

        for (mac, reading) in readings.iter().filter(|(_, r)| r.success) {
            if let Err(e) =
                telemetry::publish_device_reading(&mut ports.sink, &cfg.base_topic, mac, reading)
                    .await
            {
                warn!(device = %mac, "sensor telemetry failed: {e:#}");
            }
        }
    }

    // -- Decision + actuation ----------------------------------------------------

    // The first configured device is the primary; without a good reading
    // from it this cycle does not water.
    let decision = match readings.first() {
        Some((_, primary)) if primary.success => {
            let thresholds = Thresholds {
                moisture_percent: cfg.irrigation.moisture_threshold_percent,
                water_percent: cfg.irrigation.water_threshold_percent,
            };
            let d = decision::decide(primary.moisture, analog.water_level_percent, &thresholds);
            info!(
                moisture = primary.moisture,
                water_level = analog.water_level_percent,
                pump_on = d.pump_on,
                water_empty = d.water_empty,
                "irrigation decision"
            );

            if online {
                if let Err(e) =
                    telemetry::publish_decision(&mut ports.sink, &cfg.base_topic, &d).await
                {
                    warn!("decision telemetry failed: {e:#}");
                }
            }
            if d.pump_on {
                decision::run_pump(
                    &mut ports.outputs,
                    Duration::from_secs(cfg.irrigation.pump_duration_sec),
                )
                .await;
            }
            Some(d)
        }
        _ => {
            warn!("primary device unread — skipping irrigation decision");
            None
        }
    };

    // -- Shutdown ------------------------------------------------------------------

    ports.sink.disconnect().await;
    ports.network.disconnect().await;
    ports.outputs.all_off();
    watchdog.cancel();

    let report = CycleReport {
        boot_count: state.boot_count,
        online,
        readings,
        analog,
        decision,
    };
    info!(
        elapsed_sec = started.elapsed().as_secs(),
        sleep_min = cfg.sleep.sleep_minutes,
        "cycle complete — entering deep sleep"
    );
    ports.power.enter_deep_sleep(sleep_for);
    report
}

// ===========================================================================
// Tests
// ===========================================================================
