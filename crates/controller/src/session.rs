//! Per-device BLE session lifecycle: connect → resolve service → force data
//! mode → stabilize → read data → (battery) → disconnect, with bounded
//! retries. Transient radio failures stay contained here; the caller only
//! sees a [`SensorReading`] whose `success` flag reflects the outcome.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ports::{BleCentral, BleConnection, BleError, MacAddress};
use crate::protocol::{self, SensorReading};

/// Delay between full lifecycle attempts on the same device.
const ATTEMPT_BACKOFF: Duration = Duration::from_secs(1);

/// Settle delay after a device's retry loop ends (success or exhaustion),
/// giving the constrained radio stack time before the next peripheral.
const DEVICE_SETTLE: Duration = Duration::from_millis(1500);

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Which lifecycle stage an attempt died at. Every variant funnels through
/// the same disconnect-then-retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Connect(BleError),
    ServiceResolve(BleError),
    ModeWrite(BleError),
    DataRead(BleError),
    /// Payload too short or out-of-range temperature — corrupt transport
    /// data, treated exactly like a radio failure.
    Decode,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::ServiceResolve(e) => write!(f, "service resolve: {e}"),
            Self::ModeWrite(e) => write!(f, "mode switch write: {e}"),
            Self::DataRead(e) => write!(f, "data read: {e}"),
            Self::Decode => write!(f, "payload decode failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Public operation
// ---------------------------------------------------------------------------

/// Run the full lifecycle against one device, retrying up to `max_retries`
/// complete attempts. Always ends with the inter-device settle delay.
pub async fn process_device<B: BleCentral>(
    ble: &mut B,
    mac: MacAddress,
    read_battery: bool,
    max_retries: u32,
) -> SensorReading {
    let mut result = SensorReading::failed();

    for attempt in 1..=max_retries {
        info!(device = %mac, attempt, max_retries, "starting sensor session");

        match attempt_once(ble, mac, read_battery).await {
            Ok(reading) => {
                info!(
                    device = %mac,
                    attempt,
                    temperature = reading.temperature,
                    moisture = reading.moisture,
                    "sensor read ok"
                );
                result = reading;
                break;
            }
            Err(e) => {
                warn!(device = %mac, attempt, "sensor session failed: {e}");
            }
        }

        if attempt < max_retries {
            tokio::time::sleep(ATTEMPT_BACKOFF).await;
        }
    }

    if !result.success {
        warn!(device = %mac, "device failed after {max_retries} attempt(s)");
    }

    tokio::time::sleep(DEVICE_SETTLE).await;
    result
}

// ---------------------------------------------------------------------------
// One lifecycle attempt
// ---------------------------------------------------------------------------

/// One complete attempt. Whatever happens after connect, the connection is
/// released before the result propagates.
async fn attempt_once<B: BleCentral>(
    ble: &mut B,
    mac: MacAddress,
    read_battery: bool,
) -> Result<SensorReading, SessionError> {
    let mut conn = ble.connect(mac).await.map_err(SessionError::Connect)?;
    let result = run_connected(&mut conn, read_battery).await;
    conn.disconnect().await;
    result
}

async fn run_connected<C: BleConnection>(
    conn: &mut C,
    read_battery: bool,
) -> Result<SensorReading, SessionError> {
    conn.resolve_service(protocol::SERVICE_UUID)
        .await
        .map_err(SessionError::ServiceResolve)?;

    // The sensor only serves live data after the mode switch, and needs a
    // moment to stabilize after the write.
    conn.write_characteristic(protocol::MODE_CHARACTERISTIC, &protocol::MODE_SWITCH_CMD)
        .await
        .map_err(SessionError::ModeWrite)?;
    tokio::time::sleep(protocol::MODE_STABILIZE_DELAY).await;

    let payload = conn
        .read_characteristic(protocol::DATA_CHARACTERISTIC)
        .await
        .map_err(SessionError::DataRead)?;
    debug!(len = payload.len(), "data payload read");

    let mut reading = protocol::decode_sensor_payload(&payload).ok_or(SessionError::Decode)?;

    // Battery is best-effort: its absence never fails the device.
    if read_battery {
        match conn.read_characteristic(protocol::BATTERY_CHARACTERISTIC).await {
            Ok(bytes) => match protocol::decode_battery_payload(&bytes) {
                Some(pct) => reading.battery = Some(pct),
                None => warn!("empty battery payload — continuing without battery level"),
            },
            Err(e) => warn!("battery read failed ({e}) — continuing without battery level"),
        }
    }

    Ok(reading)
}

// ===========================================================================
// Tests
// ===========================================================================
