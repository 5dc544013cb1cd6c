//! Irrigation decision engine: a pure mapping from the primary sensor's
//! moisture and the local reservoir level to a pump actuation decision.

use std::time::Duration;

use tracing::info;

use crate::ports::{OutputBank, OutputLine};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Water when moisture is at or below this (percent).
    pub moisture_percent: u8,
    /// Refuse to pump when the reservoir is below this (percent).
    pub water_percent: f32,
}

/// Derived fresh every cycle; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrrigationDecision {
    pub pump_on: bool,
    pub water_empty: bool,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decide whether to water.
///
/// - Moisture low and reservoir sufficient → pump on.
/// - Moisture low but reservoir below threshold → pump off, reservoir empty.
/// - Moisture adequate → pump off, reservoir state unreported.
pub fn decide(moisture: u8, water_level: f32, t: &Thresholds) -> IrrigationDecision {
    if moisture > t.moisture_percent {
        return IrrigationDecision {
            pump_on: false,
            water_empty: false,
        };
    }
    if water_level >= t.water_percent {
        IrrigationDecision {
            pump_on: true,
            water_empty: false,
        }
    } else {
        IrrigationDecision {
            pump_on: false,
            water_empty: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Actuation
// ---------------------------------------------------------------------------

/// Run the pump for a fixed duration, then switch it off. Blocking for the
/// whole run by design; config validation guarantees the watchdog timeout
/// leaves headroom beyond this duration.
pub async fn run_pump<O: OutputBank>(outputs: &mut O, duration: Duration) {
    info!(duration_sec = duration.as_secs(), "water pump on");
    outputs.set(OutputLine::Pump, true);
    tokio::time::sleep(duration).await;
    outputs.set(OutputLine::Pump, false);
    info!("water pump off");
}

// ===========================================================================
// Tests
// ===========================================================================
