//! Raw analog readings → engineering units.
//!
//! The voltage inputs (system battery, solar panel) sit behind a divider
//! where 1024 counts ≈ 5.5 V; the level probes (water reservoir, plant pot)
//! use the full 12-bit range as 0–100 %.

use tracing::error;

use crate::ports::{AnalogChannel, AnalogInput};

/// Counts-per-full-scale for the level probes (12-bit ADC).
const LEVEL_FULL_SCALE: f32 = 4095.0;

/// Volts per count on the divider feeding the voltage channels.
const VOLTS_PER_COUNT: f32 = 5.5 / 1024.0;

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn to_voltage(raw: u16) -> f32 {
    f32::from(raw) * VOLTS_PER_COUNT
}

pub fn to_level_percent(raw: u16) -> f32 {
    (f32::from(raw) / LEVEL_FULL_SCALE * 100.0).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Per-cycle sample
// ---------------------------------------------------------------------------

/// All local analog channels, converted. Sampled once per wake cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSample {
    pub system_battery_volts: f32,
    pub solar_volts: f32,
    pub water_level_percent: f32,
    pub plant_level_percent: f32,
}

/// Read every channel. A failed channel reads as zero: for the water level
/// that fails safe (an unreadable reservoir probe reports empty, so the pump
/// stays off).
pub fn sample_all<A: AnalogInput>(adc: &mut A) -> AnalogSample {
    let mut raw = |channel: AnalogChannel| match adc.read(channel) {
        Ok(v) => v,
        Err(e) => {
            error!(?channel, "analog read failed: {e}");
            0
        }
    };

    AnalogSample {
        system_battery_volts: to_voltage(raw(AnalogChannel::SystemBattery)),
        solar_volts: to_voltage(raw(AnalogChannel::SolarVoltage)),
        water_level_percent: to_level_percent(raw(AnalogChannel::WaterLevel)),
        plant_level_percent: to_level_percent(raw(AnalogChannel::PlantLevel)),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};

    // -- Voltage conversion ---------------------------------------------------

    #[test]
    fn zero_counts_is_zero_volts() {
        assert_eq!(to_voltage(0), 0.0);
    }

    #[test]
    fn full_divider_scale_is_5v5() {
        let v = to_voltage(1024);
        assert!((v - 5.5).abs() < 1e-4, "expected 5.5 V, got {v}");
    }

    #[test]
    fn half_divider_scale() {
        let v = to_voltage(512);
        assert!((v - 2.75).abs() < 1e-4, "expected 2.75 V, got {v}");
    }

    // -- Level conversion -----------------------------------------------------

    #[test]
    fn zero_counts_is_empty() {
        assert_eq!(to_level_percent(0), 0.0);
    }

    #[test]
    fn full_scale_is_100_percent() {
        assert_eq!(to_level_percent(4095), 100.0);
    }

    #[test]
    fn mid_scale_is_about_half() {
        let pct = to_level_percent(2048);
        assert!((pct - 50.0).abs() < 0.1, "expected ~50 %, got {pct}");
    }

    #[test]
    fn over_range_clamps_to_100() {
        assert_eq!(to_level_percent(u16::MAX), 100.0);
    }

    // -- sample_all -----------------------------------------------------------

    struct FixedAdc;

    impl AnalogInput for FixedAdc {
        fn read(&mut self, channel: AnalogChannel) -> Result<u16> {
            Ok(match channel {
                AnalogChannel::SystemBattery => 1024,
                AnalogChannel::SolarVoltage => 512,
                AnalogChannel::WaterLevel => 2048,
                AnalogChannel::PlantLevel => 4095,
            })
        }
    }

    #[test]
    fn sample_all_converts_each_channel() {
        let s = sample_all(&mut FixedAdc);
        assert!((s.system_battery_volts - 5.5).abs() < 1e-4);
        assert!((s.solar_volts - 2.75).abs() < 1e-4);
        assert!((s.water_level_percent - 50.0).abs() < 0.1);
        assert_eq!(s.plant_level_percent, 100.0);
    }

    struct BrokenWaterAdc;

    impl AnalogInput for BrokenWaterAdc {
        fn read(&mut self, channel: AnalogChannel) -> Result<u16> {
            if channel == AnalogChannel::WaterLevel {
                bail!("bus error");
            }
            Ok(1000)
        }
    }

    #[test]
    fn failed_channel_reads_as_zero() {
        let s = sample_all(&mut BrokenWaterAdc);
        // Water probe failure fails safe (reads empty)…
        assert_eq!(s.water_level_percent, 0.0);
        // …without disturbing the other channels.
        assert!(s.system_battery_volts > 0.0);
    }
}
