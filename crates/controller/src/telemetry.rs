//! Telemetry topic layout and publish sequences.
//!
//! Two topic families under the configured base:
//!   `<base>/deviceData/<field>`   controller-level status, one field per topic
//!   `<base>/<MAC>/<field>`        one sensor's readings for this cycle
//!
//! Payloads are plain strings: floats with two decimals, integers bare, bools
//! `true`/`false`. Publish order is fixed so downstream consumers see a
//! deterministic sequence every cycle.

use anyhow::Result;
use tracing::debug;

use crate::analog::AnalogSample;
use crate::decision::IrrigationDecision;
use crate::ports::{MacAddress, TelemetrySink};
use crate::protocol::SensorReading;

// ---------------------------------------------------------------------------
// Topics and payload formatting
// ---------------------------------------------------------------------------

pub fn device_data_topic(base: &str, field: &str) -> String {
    format!("{base}/deviceData/{field}")
}

pub fn device_topic(base: &str, mac: &MacAddress, field: &str) -> String {
    format!("{base}/{mac}/{field}")
}

fn fmt_f32(v: f32) -> String {
    format!("{v:.2}")
}

fn fmt_bool(v: bool) -> String {
    if v { "true" } else { "false" }.to_string()
}

// ---------------------------------------------------------------------------
// Controller-level status
// ---------------------------------------------------------------------------

/// Everything the controller reports about itself each cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    /// Actual link state at publish time, not an assumption.
    pub connection: bool,
    pub link_quality: Option<i32>,
    pub up_time_sec: u64,
    pub last_time: String,
    pub analog: AnalogSample,
    pub ip: Option<String>,
}

/// Publish the controller status block in its fixed field order. Optional
/// fields the platform cannot provide are skipped, not published as dummies.
pub async fn publish_system<S: TelemetrySink>(
    sink: &mut S,
    base: &str,
    status: &SystemStatus,
) -> Result<()> {
    let t = |field: &str| device_data_topic(base, field);

    sink.publish(&t("connection"), fmt_bool(status.connection)).await?;
    if let Some(rssi) = status.link_quality {
        sink.publish(&t("link_quality"), rssi.to_string()).await?;
    }
    sink.publish(&t("up_time"), status.up_time_sec.to_string()).await?;
    sink.publish(&t("last_time"), status.last_time.clone()).await?;
    sink.publish(&t("system_battery"), fmt_f32(status.analog.system_battery_volts)).await?;
    sink.publish(&t("solar_voltage"), fmt_f32(status.analog.solar_volts)).await?;
    sink.publish(&t("water_level"), fmt_f32(status.analog.water_level_percent)).await?;
    sink.publish(&t("plant_level"), fmt_f32(status.analog.plant_level_percent)).await?;
    if let Some(ip) = &status.ip {
        sink.publish(&t("IP"), ip.clone()).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-device readings
// ---------------------------------------------------------------------------

/// Publish one sensor's reading. Callers only pass successful readings;
/// failed devices publish nothing. Battery goes out only when it was sampled
/// this cycle.
pub async fn publish_device_reading<S: TelemetrySink>(
    sink: &mut S,
    base: &str,
    mac: &MacAddress,
    reading: &SensorReading,
) -> Result<()> {
    debug!(device = %mac, "publishing sensor reading");
    let t = |field: &str| device_topic(base, mac, field);

    sink.publish(&t("temperature"), fmt_f32(reading.temperature)).await?;
    sink.publish(&t("moisture"), reading.moisture.to_string()).await?;
    sink.publish(&t("light"), reading.light.to_string()).await?;
    sink.publish(&t("conductivity"), reading.conductivity.to_string()).await?;
    if let Some(battery) = reading.battery {
        sink.publish(&t("battery"), battery.to_string()).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decision outcome
// ---------------------------------------------------------------------------

/// Publish the cycle's irrigation decision. Both fields go out every cycle
/// so consumers never see a stale retained `water_empty`.
pub async fn publish_decision<S: TelemetrySink>(
    sink: &mut S,
    base: &str,
    decision: &IrrigationDecision,
) -> Result<()> {
    sink.publish(&device_data_topic(base, "watering"), fmt_bool(decision.pump_on)).await?;
    sink.publish(&device_data_topic(base, "water_empty"), fmt_bool(decision.water_empty)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
