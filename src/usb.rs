//! USB hot-plug watch
//!
//! Keeps the last observed device set for the lifetime of the process and
//! reports what was added or removed since the previous observation. Device
//! records are opaque `lsusb` lines compared by exact string equality.
//!
//! ```text
//!   uninitialized ──observe──▶ seeded ──observe──▶ seeded
//!         ▲                      │
//!         └──────── reset ───────┘
//! ```
//!
//! The device list itself usually comes through the probe cache, so an
//! unplug/replug inside one TTL window can go unseen. Every report carries
//! that window as `staleness_ttl_ms`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Last observed device set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbSnapshot {
    /// Device lines, sorted
    pub devices: BTreeSet<String>,
    /// When the set was captured
    pub captured_at: DateTime<Utc>,
}

/// Watch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No baseline yet
    Uninitialized,
    /// At least one snapshot captured
    Seeded,
}

/// Result of one watch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbWatchReport {
    /// Observation counter, 1 right after seeding
    pub token: u64,
    /// Full current device set, sorted
    pub current: Vec<String>,
    /// Devices not present in the previous snapshot, sorted
    pub added: Vec<String>,
    /// Devices gone since the previous snapshot, sorted
    pub removed: Vec<String>,
    /// Whether anything was added or removed
    pub changed: bool,
    /// Whether this call (re)seeded the baseline
    pub seeded: bool,
    /// Capture time of this observation
    pub captured_at: DateTime<Utc>,
    /// Capture time of the baseline diffed against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_captured_at: Option<DateTime<Utc>>,
    /// How stale the device list may be
    pub staleness_ttl_ms: u64,
}

/// Per-process USB watch state
#[derive(Debug, Clone)]
pub struct UsbWatch {
    snapshot: Option<UsbSnapshot>,
    token: u64,
    staleness_ttl: Duration,
}

impl UsbWatch {
    /// Create an uninitialized watch. `staleness_ttl` is the cache TTL of the
    /// device source, reported back to callers.
    pub fn new(staleness_ttl: Duration) -> Self {
        Self {
            snapshot: None,
            token: 0,
            staleness_ttl,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> WatchState {
        if self.snapshot.is_some() {
            WatchState::Seeded
        } else {
            WatchState::Uninitialized
        }
    }

    /// Stored baseline, if any
    pub fn snapshot(&self) -> Option<&UsbSnapshot> {
        self.snapshot.as_ref()
    }

    /// Drop the baseline; the next observation re-seeds
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.token = 0;
    }

    /// Record the current device set and diff it against the baseline
    pub fn observe<I>(&mut self, devices: I, reset: bool) -> UsbWatchReport
    where
        I: IntoIterator<Item = String>,
    {
        self.observe_at(devices, reset, Utc::now())
    }

    /// [`observe`](Self::observe) with an explicit capture time
    pub fn observe_at<I>(&mut self, devices: I, reset: bool, now: DateTime<Utc>) -> UsbWatchReport
    where
        I: IntoIterator<Item = String>,
    {
        if reset {
            self.reset();
        }

        let current: BTreeSet<String> = devices.into_iter().collect();
        let staleness_ttl_ms = self.staleness_ttl.as_millis() as u64;

        let report = match self.snapshot.take() {
            None => {
                self.token = 1;
                debug!(devices = current.len(), "usb watch seeded");
                UsbWatchReport {
                    token: self.token,
                    current: current.iter().cloned().collect(),
                    added: current.iter().cloned().collect(),
                    removed: Vec::new(),
                    changed: !current.is_empty(),
                    seeded: true,
                    captured_at: now,
                    previous_captured_at: None,
                    staleness_ttl_ms,
                }
            }
            Some(previous) => {
                self.token += 1;
                let added: Vec<String> = current.difference(&previous.devices).cloned().collect();
                let removed: Vec<String> =
                    previous.devices.difference(&current).cloned().collect();
                debug!(
                    token = self.token,
                    added = added.len(),
                    removed = removed.len(),
                    "usb watch diff"
                );
                UsbWatchReport {
                    token: self.token,
                    current: current.iter().cloned().collect(),
                    changed: !added.is_empty() || !removed.is_empty(),
                    added,
                    removed,
                    seeded: false,
                    captured_at: now,
                    previous_captured_at: Some(previous.captured_at),
                    staleness_ttl_ms,
                }
            }
        };

        self.snapshot = Some(UsbSnapshot {
            devices: current,
            captured_at: now,
        });
        report
    }
}
