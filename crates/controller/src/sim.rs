//! Simulated adapters for local development (feature `sim`).
//!
//! A scripted BLE central serving plausible sensor payloads with per-device
//! failure injection, a noisy ADC, a host network link, and a power
//! controller that turns deep sleep into process exit, so a full wake cycle
//! runs end to end on a dev box with no hardware attached.

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use crate::ports::{
    AnalogChannel, AnalogInput, BleCentral, BleConnection, BleError, MacAddress, NetworkLink,
    PowerController,
};
use crate::protocol::{self, encode_sensor_payload};

// ---------------------------------------------------------------------------
// BLE central
// ---------------------------------------------------------------------------

/// Per-device behaviour script.
#[derive(Debug, Clone, Copy)]
pub struct SimDevice {
    /// Connection attempts to reject before the device starts answering.
    pub fail_connects: u32,
    /// Base moisture percent; readings jitter around this.
    pub moisture: u8,
    /// Base temperature in tenths of °C.
    pub temp_raw: i16,
    pub battery: u8,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            fail_connects: 0,
            moisture: 45,
            temp_raw: 215,
            battery: 91,
        }
    }
}

struct SimDeviceState {
    script: SimDevice,
    rejected: u32,
}

pub struct SimCentral {
    devices: HashMap<MacAddress, SimDeviceState>,
}

impl SimCentral {
    pub fn new(devices: Vec<(MacAddress, SimDevice)>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|(mac, script)| (mac, SimDeviceState { script, rejected: 0 }))
                .collect(),
        }
    }
}

impl BleCentral for SimCentral {
    type Conn = SimConnection;

    async fn power_on(&mut self) -> Result<(), BleError> {
        info!("[sim-ble] radio powered on");
        Ok(())
    }

    async fn connect(&mut self, addr: MacAddress) -> Result<Self::Conn, BleError> {
        let state = self.devices.get_mut(&addr).ok_or(BleError::ConnectFailed)?;
        if state.rejected < state.script.fail_connects {
            state.rejected += 1;
            return Err(BleError::ConnectFailed);
        }

        let s = state.script;
        // Jitter around the scripted baseline so repeated cycles differ.
        let temp_raw = s.temp_raw + fastrand::i16(-5..=5);
        let moisture = s.moisture.saturating_add_signed(fastrand::i8(-2..=2));
        let light = fastrand::u16(50..400);
        let conductivity = fastrand::u16(200..600);

        Ok(SimConnection {
            data: encode_sensor_payload(temp_raw, light, moisture, conductivity).to_vec(),
            battery: s.battery,
            mode_written: false,
        })
    }
}

pub struct SimConnection {
    data: Vec<u8>,
    battery: u8,
    mode_written: bool,
}

impl BleConnection for SimConnection {
    async fn resolve_service(&mut self, service_uuid: &str) -> Result<(), BleError> {
        if service_uuid == protocol::SERVICE_UUID {
            Ok(())
        } else {
            Err(BleError::ServiceNotFound)
        }
    }

    async fn write_characteristic(
        &mut self,
        char_uuid: &str,
        value: &[u8],
    ) -> Result<(), BleError> {
        if char_uuid == protocol::MODE_CHARACTERISTIC && value == protocol::MODE_SWITCH_CMD {
            self.mode_written = true;
            Ok(())
        } else {
            Err(BleError::WriteFailed)
        }
    }

    async fn read_characteristic(&mut self, char_uuid: &str) -> Result<Vec<u8>, BleError> {
        match char_uuid {
            // Like the real sensor, data is only live after the mode switch.
            protocol::DATA_CHARACTERISTIC if self.mode_written => Ok(self.data.clone()),
            protocol::DATA_CHARACTERISTIC => Err(BleError::ReadFailed),
            protocol::BATTERY_CHARACTERISTIC => Ok(vec![self.battery]),
            _ => Err(BleError::CharacteristicNotFound),
        }
    }

    async fn disconnect(&mut self) {}
}

// ---------------------------------------------------------------------------
// ADC
// ---------------------------------------------------------------------------

/// Plausible mid-range analog values with per-read jitter.
pub struct SimAdc;

impl AnalogInput for SimAdc {
    fn read(&mut self, channel: AnalogChannel) -> Result<u16> {
        let base: u16 = match channel {
            AnalogChannel::SystemBattery => 720, // ≈ 3.9 V through the divider
            AnalogChannel::SolarVoltage => 930,  // ≈ 5.0 V
            AnalogChannel::WaterLevel => 2600,   // ≈ 63 %
            AnalogChannel::PlantLevel => 3100,   // ≈ 76 %
        };
        Ok(base.saturating_add_signed(fastrand::i16(-40..=40)).min(4095))
    }
}

// ---------------------------------------------------------------------------
// Network link
// ---------------------------------------------------------------------------

/// The dev host's own network. Association always succeeds immediately.
pub struct HostLink {
    connected: bool,
}

impl HostLink {
    pub fn new() -> Self {
        Self { connected: false }
    }
}

impl Default for HostLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for HostLink {
    async fn connect(&mut self) -> Result<()> {
        info!("[sim-net] link up");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn link_quality(&self) -> Option<i32> {
        if self.connected {
            Some(-55 - i32::from(fastrand::u8(0..20)))
        } else {
            None
        }
    }

    fn ip_address(&self) -> Option<String> {
        self.connected.then(|| "127.0.0.1".to_string())
    }
}

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------

/// Deep sleep on a dev host is process exit; a supervisor (or the operator)
/// plays the role of the wake timer.
#[derive(Clone)]
pub struct SimPower;

impl PowerController for SimPower {
    fn enter_deep_sleep(&self, sleep_for: std::time::Duration) {
        info!(
            sleep_min = sleep_for.as_secs() / 60,
            "[sim-power] entering deep sleep (exiting)"
        );
        std::process::exit(0);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::process_device;

    fn mac() -> MacAddress {
        "C4:7C:8D:61:37:19".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_device_serves_a_decodable_reading() {
        let mut ble = SimCentral::new(vec![(mac(), SimDevice::default())]);
        let reading = process_device(&mut ble, mac(), true, 3).await;
        assert!(reading.success);
        assert_eq!(reading.battery, Some(91));
        assert!((15.0..30.0).contains(&reading.temperature));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_injection_consumes_attempts() {
        let script = SimDevice {
            fail_connects: 2,
            ..SimDevice::default()
        };
        let mut ble = SimCentral::new(vec![(mac(), script)]);
        let reading = process_device(&mut ble, mac(), false, 3).await;
        assert!(reading.success);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_device_never_connects() {
        let mut ble = SimCentral::new(vec![]);
        let reading = process_device(&mut ble, mac(), false, 2).await;
        assert!(!reading.success);
    }

    #[tokio::test]
    async fn data_read_without_mode_switch_fails() {
        let mut ble = SimCentral::new(vec![(mac(), SimDevice::default())]);
        let mut conn = ble.connect(mac()).await.unwrap();
        assert_eq!(
            conn.read_characteristic(protocol::DATA_CHARACTERISTIC).await,
            Err(BleError::ReadFailed)
        );
    }

    #[test]
    fn sim_adc_values_stay_in_range() {
        let mut adc = SimAdc;
        for _ in 0..100 {
            for ch in [
                AnalogChannel::SystemBattery,
                AnalogChannel::SolarVoltage,
                AnalogChannel::WaterLevel,
                AnalogChannel::PlantLevel,
            ] {
                let v = adc.read(ch).unwrap();
                assert!(v <= 4095, "ADC out of range: {v}");
            }
        }
    }

    #[tokio::test]
    async fn host_link_reports_identity_only_when_up() {
        let mut link = HostLink::new();
        assert_eq!(link.ip_address(), None);
        link.connect().await.unwrap();
        assert!(link.ip_address().is_some());
        assert!(link.link_quality().is_some());
        link.disconnect().await;
        assert_eq!(link.link_quality(), None);
    }
}
