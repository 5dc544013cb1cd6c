//! ADS1115 16-bit ADC driver over I2C, mapped onto the controller's four
//! analog channels (feature `adc`).
//!
//! Single-ended reads at PGA ±4.096 V, 128 SPS, single-shot mode. Channel
//! wiring: AIN0 = system battery divider, AIN1 = solar divider, AIN2 = water
//! level probe, AIN3 = plant pot probe.

use anyhow::Result;
use rppal::i2c::I2c;
use std::{thread, time::Duration};

use crate::ports::{AnalogChannel, AnalogInput};

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       — write 1 to start single-shot conversion
//   [14:12] MUX      — input multiplexer (channel selection)
//   [11:9]  PGA      — programmable gain amplifier
//   [8]     MODE     — 0 = continuous, 1 = single-shot
//   [7:5]   DR       — data rate
//   [4:0]   comparator controls (disabled)

/// Bits common to all channel reads:
///   OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot),
///   DR=100 (128 SPS), COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// MUX values for single-ended reads (AINx vs GND).
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

/// Conversion time at 128 SPS is ~7.8 ms. We wait 9 ms for margin.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register: conversion-ready flag when read.
const OS_READY_BIT: u16 = 1 << 15;

fn mux_index(channel: AnalogChannel) -> usize {
    match channel {
        AnalogChannel::SystemBattery => 0,
        AnalogChannel::SolarVoltage => 1,
        AnalogChannel::WaterLevel => 2,
        AnalogChannel::PlantLevel => 3,
    }
}

/// Build the config register value for a single-ended read on `channel`.
fn config_for_channel(channel: AnalogChannel) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[mux_index(channel)] << MUX_SHIFT)
}

/// Scale the ADS1115's 15-bit single-ended range down to the 12-bit counts
/// the engineering-unit conversions expect.
fn to_counts(raw: i16) -> u16 {
    ((raw.max(0) as u32) >> 3) as u16
}

// ── Driver ──────────────────────────────────────────────────────────────────

pub struct Ads1115 {
    i2c: I2c,
}

impl Ads1115 {
    /// Open I2C bus 1 and address the ADS1115 at `addr`.
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(addr)?;
        tracing::info!(addr = format_args!("0x{addr:02x}"), "ads1115 initialised");
        Ok(Self { i2c })
    }

    fn read_raw(&mut self, channel: AnalogChannel) -> Result<i16> {
        let config_bytes = config_for_channel(channel).to_be_bytes();

        // Write config register to start conversion.
        self.i2c.block_write(REG_CONFIG, &config_bytes)?;

        // Wait for conversion to complete.
        thread::sleep(CONVERSION_WAIT);

        // Poll the OS bit to confirm conversion is done. Normally one wait is
        // enough at 128 SPS; we retry briefly to be safe.
        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl AnalogInput for Ads1115 {
    fn read(&mut self, channel: AnalogChannel) -> Result<u16> {
        let raw = self.read_raw(channel)?;
        Ok(to_counts(raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
