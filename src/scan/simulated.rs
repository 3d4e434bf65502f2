//! Host-side radio backed by a JSON fixture.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{AccessPoint, RadioDriver, ScanConfig};
use crate::error::DriverError;

/// Fixture file layout.
///
/// ```json
/// { "networks": [{ "ssid": "lab", "rssi": -41 }], "scan_time_ms": 120 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanFixture {
    #[serde(default)]
    pub networks: Vec<AccessPoint>,
    /// Simulated scan duration, compared against the scan timeout.
    #[serde(default)]
    pub scan_time_ms: u64,
    #[serde(default)]
    pub fail_init: bool,
    #[serde(default)]
    pub fail_scan: bool,
}

impl ScanFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scan fixture: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing scan fixture: {}", path.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedRadio {
    fixture: ScanFixture,
    running: bool,
    inits: usize,
    deinits: usize,
}

impl SimulatedRadio {
    pub fn new(fixture: ScanFixture) -> Self {
        Self {
            fixture,
            ..Default::default()
        }
    }

    pub fn init_count(&self) -> usize {
        self.inits
    }

    pub fn deinit_count(&self) -> usize {
        self.deinits
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl RadioDriver for SimulatedRadio {
    fn init(&mut self) -> Result<(), DriverError> {
        self.inits += 1;
        if self.fixture.fail_init {
            return Err(DriverError::new("radio init failed"));
        }
        self.running = true;
        Ok(())
    }

    fn scan(&mut self, config: &ScanConfig) -> Result<Vec<AccessPoint>, DriverError> {
        if !self.running {
            return Err(DriverError::new("radio not started"));
        }
        if self.fixture.fail_scan {
            return Err(DriverError::new("scan aborted by radio"));
        }
        let took = Duration::from_millis(self.fixture.scan_time_ms);
        if took > config.timeout {
            return Err(DriverError::new(format!(
                "scan timed out after {} ms",
                config.timeout.as_millis()
            )));
        }
        Ok(self.fixture.networks.clone())
    }

    fn deinit(&mut self) -> Result<(), DriverError> {
        self.deinits += 1;
        self.running = false;
        Ok(())
    }
}
