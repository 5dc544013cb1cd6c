//! Capability traits consumed by the wake-cycle core. Radio stacks, the
//! broker transport, analog reads, GPIO outputs, time sync, deep-sleep entry
//! and retained-state persistence are all injected through these seams so the
//! orchestrator stays independent of the target platform.
#![allow(async_fn_in_trait)]

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::retained::RetainedState;

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// 6-byte BLE hardware address. Parses both `"C4:7C:8D:61:37:19"` and the
/// bare 12-hex-digit form; renders uppercase colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != ':').collect();
        let colon_groups = s.split(':').count();
        if (s.contains(':') && colon_groups != 6)
            || hex.len() != 12
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(format!("invalid MAC address '{s}'"));
        }

        let mut bytes = [0u8; 6];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| format!("invalid MAC address '{s}'"))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

// ---------------------------------------------------------------------------
// BLE central
// ---------------------------------------------------------------------------

/// Failure reasons for individual BLE operations. No exceptions cross this
/// boundary; every operation reports one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    ConnectFailed,
    ServiceNotFound,
    CharacteristicNotFound,
    WriteFailed,
    ReadFailed,
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connection refused"),
            Self::ServiceNotFound => write!(f, "service not found"),
            Self::CharacteristicNotFound => write!(f, "characteristic not found"),
            Self::WriteFailed => write!(f, "characteristic write failed"),
            Self::ReadFailed => write!(f, "characteristic read failed"),
        }
    }
}

/// BLE central role. One connection is open at a time system-wide; the
/// session manager enforces this by construction (strictly sequential use).
pub trait BleCentral {
    type Conn: BleConnection;

    /// Bring up the radio stack. Called once per wake cycle.
    async fn power_on(&mut self) -> Result<(), BleError>;

    /// Open a connection to the peripheral at `addr`.
    async fn connect(&mut self, addr: MacAddress) -> Result<Self::Conn, BleError>;
}

/// An open connection to one peripheral.
pub trait BleConnection {
    /// Resolve the GATT service all further operations address.
    async fn resolve_service(&mut self, service_uuid: &str) -> Result<(), BleError>;

    async fn write_characteristic(&mut self, char_uuid: &str, value: &[u8])
        -> Result<(), BleError>;

    async fn read_characteristic(&mut self, char_uuid: &str) -> Result<Vec<u8>, BleError>;

    /// Release the link. Must succeed silently even after a failed operation;
    /// the session manager calls this on every exit path.
    async fn disconnect(&mut self);
}

// ---------------------------------------------------------------------------
// Network link + telemetry sink
// ---------------------------------------------------------------------------

/// Station-mode network association (Wi-Fi on the device target, host-managed
/// networking on a dev box).
pub trait NetworkLink {
    async fn connect(&mut self) -> Result<()>;
    async fn disconnect(&mut self);

    /// Received signal strength in dBm, if the link exposes one.
    fn link_quality(&self) -> Option<i32>;

    fn ip_address(&self) -> Option<String>;
}

/// Connection-oriented publish transport (MQTT in production).
pub trait TelemetrySink {
    async fn connect(&mut self) -> Result<()>;
    async fn publish(&mut self, topic: &str, payload: String) -> Result<()>;
    async fn disconnect(&mut self);
}

// ---------------------------------------------------------------------------
// Local hardware
// ---------------------------------------------------------------------------

/// Local analog channels sampled once per wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogChannel {
    SystemBattery,
    SolarVoltage,
    WaterLevel,
    PlantLevel,
}

pub trait AnalogInput {
    /// Single-shot raw read, 12-bit range (0–4095).
    fn read(&mut self, channel: AnalogChannel) -> Result<u16>;
}

/// Logical digital output lines driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    Pump,
    StatusLed,
}

pub trait OutputBank {
    fn set(&mut self, line: OutputLine, on: bool);
    fn all_off(&mut self);
}

/// Deep-sleep entry. Cloned into the watchdog task, so implementations must
/// be cheap handles. Entering deep sleep halts execution on the device
/// target; it is not re-entrant-sensitive.
pub trait PowerController: Clone + Send + 'static {
    fn enter_deep_sleep(&self, sleep_for: Duration);
}

// ---------------------------------------------------------------------------
// Time + retained state
// ---------------------------------------------------------------------------

/// Wall-clock synchronization. A full sync (first boot) performs the slow
/// NTP exchange; the fast path just re-arms the timezone after deep sleep.
pub trait TimeSync {
    async fn synchronize(&mut self, full: bool) -> Result<()>;
    fn formatted_local_time(&self) -> String;
}

/// Persistence boundary for [`RetainedState`]. Loading never fails: a
/// missing or unreadable backing store reads as first power-on.
pub trait RetainedStore {
    fn load(&mut self) -> RetainedState;
    fn save(&mut self, state: &RetainedState) -> Result<()>;
}

// ===========================================================================
// Tests
// ===========================================================================
