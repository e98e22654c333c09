//! Background register mutators.
//!
//! One worker per configured word bank periodically steps a list of
//! registers through the shared store, simulating live sensor values.
//! A worker serializes with client handlers only through the store lock;
//! each tick commits atomically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ModsimError, ModsimResult};
use crate::store::{RegisterStore, WordBank};

/// Auto-increment settings for one word bank
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoIncrementConfig {
    /// Whether the worker runs at all
    pub enabled: bool,
    /// Target register addresses; duplicates step once per occurrence
    pub addresses: Vec<u16>,
    /// Milliseconds between ticks
    pub interval_ms: u64,
    /// Step added per tick
    pub increment: u16,
    /// Wrap-to-zero threshold
    pub max: u16,
}

impl Default for AutoIncrementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses: Vec::new(),
            interval_ms: 1000,
            increment: 1,
            max: u16::MAX,
        }
    }
}

impl AutoIncrementConfig {
    /// Validate the record for one bank; only enabled slots are checked
    pub fn validate(&self, bank: WordBank) -> ModsimResult<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.interval_ms == 0 {
            return Err(ModsimError::configuration(format!(
                "{} auto-increment interval must be positive",
                bank
            )));
        }

        // An increment above max would wrap the threshold arithmetic.
        if self.increment > self.max {
            return Err(ModsimError::configuration(format!(
                "{} auto-increment step {} exceeds max {}",
                bank, self.increment, self.max
            )));
        }

        Ok(())
    }
}

/// Worker loop: sleep, re-check the run flag, tick the store
///
/// The flag is observed on each wake, so shutdown takes effect within
/// one interval. Ticks are not replayed when a tick overruns the
/// interval.
pub async fn run_worker(
    store: Arc<RegisterStore>,
    bank: WordBank,
    config: AutoIncrementConfig,
    running: Arc<AtomicBool>,
) {
    info!(
        "auto-increment worker for {} bank: {} register(s), every {}ms, step {} wrap {}",
        bank,
        config.addresses.len(),
        config.interval_ms,
        config.increment,
        config.max
    );

    let interval = Duration::from_millis(config.interval_ms);
    loop {
        tokio::time::sleep(interval).await;
        if !running.load(Ordering::Acquire) {
            break;
        }
        store.increment(bank, &config.addresses, config.increment, config.max);
    }

    debug!("auto-increment worker for {} bank stopped", bank);
}
