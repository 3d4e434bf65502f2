//! Bounded wireless scan boundary.
//!
//! The radio itself sits behind [`RadioDriver`]. This module owns the sequencing around it:
//! acquire, configure, scan, collect at most `capacity` records, release.

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod simulated;

pub use simulated::{ScanFixture, SimulatedRadio};

use crate::error::{DriverError, ScanError};

/// Records kept from one scan.
pub const DEFAULT_SCAN_CAPACITY: usize = 10;

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(3000);

/// One discovered network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// Network name; empty for hidden networks.
    pub ssid: String,
    /// Signal strength in dBm.
    pub rssi: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Only report this network. `None` is a broadcast scan.
    pub target_filter: Option<String>,
    pub include_hidden: bool,
    pub capacity: usize,
    pub timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_filter: None,
            include_hidden: true,
            capacity: DEFAULT_SCAN_CAPACITY,
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// Results of one scan, strongest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResultSet {
    pub capacity: usize,
    /// Matching networks seen before truncation.
    pub discovered: usize,
    pub records: Vec<AccessPoint>,
}

impl ScanResultSet {
    pub fn is_truncated(&self) -> bool {
        self.discovered > self.records.len()
    }
}

/// Hardware seam. `init` brings up the radio and its supporting stack, `deinit` tears both
/// down. Calls arrive strictly paired.
pub trait RadioDriver {
    fn init(&mut self) -> Result<(), DriverError>;

    /// Blocking scan; returns everything the radio saw, in any order.
    fn scan(&mut self, config: &ScanConfig) -> Result<Vec<AccessPoint>, DriverError>;

    fn deinit(&mut self) -> Result<(), DriverError>;
}

/// Singleton owner of the radio.
pub struct ScanSubsystem<D: RadioDriver> {
    driver: D,
    acquired: bool,
}

impl<D: RadioDriver> ScanSubsystem<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            acquired: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Brings the radio up. On failure the driver is torn down again before returning.
    pub fn acquire(&mut self) -> Result<RadioLease<'_, D>, ScanError> {
        if self.acquired {
            tracing::error!("scan subsystem acquired twice");
            return Err(ScanError::AlreadyAcquired);
        }
        self.acquired = true;
        // from here on the lease releases on drop, including the failed-init path
        let lease = RadioLease { subsystem: self };
        if let Err(err) = lease.subsystem.driver.init() {
            tracing::error!(%err, "radio initialization failed");
            drop(lease);
            return Err(ScanError::SubsystemAcquisition(err));
        }
        Ok(lease)
    }

    /// Full acquire / scan / release cycle.
    pub fn scan(&mut self, config: &ScanConfig) -> Result<ScanResultSet, ScanError> {
        tracing::info!(capacity = config.capacity, "Starting scan");
        let mut lease = self.acquire()?;
        let result = lease.scan(config);
        lease.release();
        if let Ok(set) = &result {
            tracing::info!(found = set.records.len(), discovered = set.discovered, "Scan completed");
            for ap in &set.records {
                tracing::info!(ssid = %ap.ssid, rssi = ap.rssi, "access point");
            }
        }
        result
    }
}

/// An acquired radio. Released when dropped.
pub struct RadioLease<'a, D: RadioDriver> {
    subsystem: &'a mut ScanSubsystem<D>,
}

impl<D: RadioDriver> RadioLease<'_, D> {
    pub fn scan(&mut self, config: &ScanConfig) -> Result<ScanResultSet, ScanError> {
        let found = self
            .subsystem
            .driver
            .scan(config)
            .map_err(ScanError::ScanFailed)?;
        Ok(collect(found, config))
    }

    pub fn release(self) {}
}

impl<D: RadioDriver> Drop for RadioLease<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.subsystem.driver.deinit() {
            tracing::warn!(%err, "radio deinit failed");
        }
        self.subsystem.acquired = false;
    }
}

/// Filters, orders by descending strength and truncates to capacity.
pub fn collect(found: Vec<AccessPoint>, config: &ScanConfig) -> ScanResultSet {
    let mut records: Vec<AccessPoint> = found
        .into_iter()
        .filter(|ap| config.include_hidden || !ap.ssid.is_empty())
        .filter(|ap| match &config.target_filter {
            Some(target) => &ap.ssid == target,
            None => true,
        })
        .collect();
    let discovered = records.len();
    records.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    records.truncate(config.capacity);
    ScanResultSet {
        capacity: config.capacity,
        discovered,
        records,
    }
}
