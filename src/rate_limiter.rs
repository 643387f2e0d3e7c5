use std::{collections::BTreeMap, sync::Arc, time::Duration};

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub min_interval_ms: u64,
    pub last_granted_ms_ago: Option<u64>,
    pub grants: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    last_granted: Option<Instant>,
    grants: u64,
}

#[derive(Debug)]
struct PlatformSlot {
    min_interval: Duration,
    // held for the whole read-wait-write so queued callers are spaced correctly
    gate: tokio::sync::Mutex<()>,
    state: parking_lot::Mutex<SlotState>,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    platforms: DashMap<Platform, Arc<PlatformSlot>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `platform` with a minimum spacing between calls. Returns false and keeps
    /// the existing registration if the platform is already known.
    pub fn initialize_platform(&self, platform: Platform, min_interval: Duration) -> bool {
        let mut inserted = false;
        self.platforms.entry(platform).or_insert_with(|| {
            inserted = true;
            Arc::new(PlatformSlot {
                min_interval,
                gate: tokio::sync::Mutex::new(()),
                state: parking_lot::Mutex::new(SlotState::default()),
            })
        });
        inserted
    }

    pub fn is_registered(&self, platform: Platform) -> bool {
        self.platforms.contains_key(&platform)
    }

    /// Waits until `platform` may be called again and returns how long it waited.
    /// Platforms that were never registered are not limited.
    pub async fn enforce_rate_limit(&self, platform: Platform) -> Duration {
        let Some(slot) = self.platforms.get(&platform).map(|s| Arc::clone(s.value())) else {
            return Duration::ZERO;
        };

        let _turn = slot.gate.lock().await;

        let wait = {
            let state = slot.state.lock();
            state
                .last_granted
                .map(|at| slot.min_interval.saturating_sub(at.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if !wait.is_zero() {
            debug!(platform = %platform, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }

        let mut state = slot.state.lock();
        state.last_granted = Some(Instant::now());
        state.grants += 1;

        wait
    }

    pub fn stats(&self) -> BTreeMap<Platform, RateLimitStats> {
        self.platforms
            .iter()
            .map(|entry| {
                let slot = entry.value();
                let state = slot.state.lock();
                (
                    *entry.key(),
                    RateLimitStats {
                        min_interval_ms: slot.min_interval.as_millis() as u64,
                        last_granted_ms_ago: state
                            .last_granted
                            .map(|at| at.elapsed().as_millis() as u64),
                        grants: state.grants,
                    },
                )
            })
            .collect()
    }

    pub fn reset_platform(&self, platform: Platform) {
        if let Some(slot) = self.platforms.get(&platform) {
            *slot.state.lock() = SlotState::default();
        }
    }

    pub fn reset_all(&self) {
        for slot in self.platforms.iter() {
            *slot.state.lock() = SlotState::default();
        }
    }
}
