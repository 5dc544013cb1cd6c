//! Binary codec for the soil sensor's GATT attributes.
//!
//! The sensor exposes one service with three characteristics: a write-only
//! mode switch, the live data payload, and the battery level. Data only
//! becomes live after the magic mode-switch command has been written and the
//! device has had a moment to stabilize.

use std::time::Duration;

// ---------------------------------------------------------------------------
// GATT layout
// ---------------------------------------------------------------------------

pub const SERVICE_UUID: &str = "00001204-0000-1000-8000-00805f9b34fb";
pub const MODE_CHARACTERISTIC: &str = "00001a00-0000-1000-8000-00805f9b34fb";
pub const DATA_CHARACTERISTIC: &str = "00001a01-0000-1000-8000-00805f9b34fb";
pub const BATTERY_CHARACTERISTIC: &str = "00001a02-0000-1000-8000-00805f9b34fb";

/// Magic bytes that switch the sensor into live-data mode.
pub const MODE_SWITCH_CMD: [u8; 2] = [0xA0, 0x1F];

/// The sensor needs this long after the mode write before its data
/// characteristic is trustworthy.
pub const MODE_STABILIZE_DELAY: Duration = Duration::from_millis(500);

/// Minimum data payload length covering every field we decode
/// (conductivity ends at offset 9).
const MIN_DATA_LEN: usize = 10;

/// Decoded temperature is sanity-checked against this range; anything
/// outside it means the transport garbled the payload. Raw units are
/// tenths of a degree.
const TEMP_RAW_MIN: i16 = -1000;
const TEMP_RAW_MAX: i16 = 2000;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One device's result for the current wake cycle. Readings are transient:
/// they are never persisted past the cycle that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// °C, decoded from a signed fixed-point source scaled by 0.1.
    pub temperature: f32,
    /// Percent, 0–100.
    pub moisture: u8,
    /// Lux.
    pub light: u16,
    /// µS/cm.
    pub conductivity: u16,
    /// Percent; only sampled every `battery_interval` cycles.
    pub battery: Option<u8>,
    pub success: bool,
}

impl SensorReading {
    /// Terminal-failure placeholder for a device that could not be read.
    pub fn failed() -> Self {
        Self {
            temperature: 0.0,
            moisture: 0,
            light: 0,
            conductivity: 0,
            battery: None,
            success: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the live-data payload. Little-endian layout:
///
/// ```text
/// offset 0..2   temperature, signed 16-bit, tenths of °C
/// offset 3..5   light, unsigned 16-bit
/// offset 7      moisture, unsigned 8-bit
/// offset 8..10  conductivity, unsigned 16-bit
/// ```
///
/// Returns `None` for short payloads or a temperature outside [-100, 200] °C
/// — both are treated as transport corruption and discard the whole reading.
pub fn decode_sensor_payload(payload: &[u8]) -> Option<SensorReading> {
    if payload.len() < MIN_DATA_LEN {
        return None;
    }

    let temp_raw = i16::from_le_bytes([payload[0], payload[1]]);
    if !(TEMP_RAW_MIN..=TEMP_RAW_MAX).contains(&temp_raw) {
        return None;
    }

    Some(SensorReading {
        temperature: f32::from(temp_raw) / 10.0,
        light: u16::from_le_bytes([payload[3], payload[4]]),
        moisture: payload[7],
        conductivity: u16::from_le_bytes([payload[8], payload[9]]),
        battery: None,
        success: true,
    })
}

/// Decode the battery payload: a single unsigned byte at offset 0.
pub fn decode_battery_payload(payload: &[u8]) -> Option<u8> {
    payload.first().copied()
}

// ---------------------------------------------------------------------------
// Encoding (simulator + test fixture)
// ---------------------------------------------------------------------------

/// Build a well-formed data payload. Used by the device simulator and tests;
/// the inverse of [`decode_sensor_payload`].
pub fn encode_sensor_payload(temp_raw: i16, light: u16, moisture: u8, conductivity: u16) -> [u8; MIN_DATA_LEN] {
    let t = temp_raw.to_le_bytes();
    let l = light.to_le_bytes();
    let c = conductivity.to_le_bytes();
    [t[0], t[1], 0x00, l[0], l[1], 0x00, 0x02, moisture, c[0], c[1]]
}

// ===========================================================================
// Tests
// ===========================================================================
