//! Emergency deep-sleep watchdog.
//!
//! Armed at the start of every wake cycle; if the cycle overruns the
//! emergency timeout the watchdog drives every output off and forces deep
//! sleep directly, bypassing normal shutdown (in-flight telemetry is lost —
//! that is the accepted tradeoff for never stalling awake).

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::error;

use crate::outputs::SharedOutputs;
use crate::ports::{OutputBank, PowerController};

pub struct Watchdog {
    cancel: Option<oneshot::Sender<()>>,
}

impl Watchdog {
    /// Spawn the watchdog task. If not cancelled within `timeout`, it forces
    /// all outputs off and enters deep sleep for `sleep_for` from its own
    /// task context.
    pub fn arm<P, O>(
        power: P,
        outputs: SharedOutputs<O>,
        timeout: Duration,
        sleep_for: Duration,
    ) -> Self
    where
        P: PowerController,
        O: OutputBank + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut outputs = outputs;
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    error!(
                        timeout_sec = timeout.as_secs(),
                        "wake cycle overran — forcing emergency deep sleep"
                    );
                    // The overrun may have struck mid-watering; the pump and
                    // LED must not stay energized through sleep.
                    outputs.all_off();
                    power.enter_deep_sleep(sleep_for);
                }
                _ = rx => {
                    // Normal completion; stand down.
                }
            }
        });

        Self { cancel: Some(tx) }
    }

    /// Stand the watchdog down. Idempotent; a no-op if the timer has already
    /// fired (the cycle is ending either way).
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            // Send fails only if the task already fired and dropped the
            // receiver, which is exactly the already-fired no-op case.
            let _ = tx.send(());
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
