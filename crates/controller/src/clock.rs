//! Wall-clock adapter for host targets.
//!
//! The OS keeps the clock NTP-disciplined, so `synchronize` only
//! distinguishes the slow first-boot sync from the fast post-sleep re-arm
//! for logging parity with the device target.

use anyhow::Result;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::ports::TimeSync;

pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSync for SystemClock {
    async fn synchronize(&mut self, full: bool) -> Result<()> {
        if full {
            info!("full time sync (first boot)");
        } else {
            info!("fast time re-arm after sleep");
        }
        Ok(())
    }

    fn formatted_local_time(&self) -> String {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        now.format(&format).unwrap_or_default()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
