//! Supervisor configuration.
//!
//! Configuration is small: the tick interval, the reboot threshold, and the
//! filter used to recognise the sensor among attached HID devices. It can be
//! loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! tick_interval_ms = 1000
//! reboot_threshold = 10
//!
//! [sensor]
//! product_contains = "ShadowSense"
//! vendor_id = 0x1234
//! reboot_report = [0x05, 0x01]
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REBOOT_THRESHOLD: u32 = 10;
pub const DEFAULT_PRODUCT_MATCH: &str = "ShadowSense";

/// Top-level configuration for [`DeviceSupervisor`](crate::supervisor::DeviceSupervisor)
/// and [`Runner`](crate::runner::Runner).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Time between ticks, in milliseconds. Must be non-zero.
    pub tick_interval_ms: u64,

    /// Number of ticks a handle may stay open before a reboot is forced.
    ///
    /// The reboot is issued on the tick where the counter first exceeds this value.
    pub reboot_threshold: u32,

    /// How to recognise the sensor among attached devices.
    pub sensor: SensorMatch,
}

/// Filter describing which attached devices count as the sensor.
///
/// All populated fields must match. `product_contains` is a case-insensitive
/// substring test against the product string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorMatch {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub product_contains: Option<String>,

    /// Feature report sent to request a device reboot.
    ///
    /// When `None` the HID backend reports reboot as unsupported.
    pub reboot_report: Option<Vec<u8>>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            reboot_threshold: DEFAULT_REBOOT_THRESHOLD,
            sensor: SensorMatch::default(),
        }
    }
}

impl Default for SensorMatch {
    fn default() -> Self {
        Self {
            vendor_id: None,
            product_id: None,
            product_contains: Some(DEFAULT_PRODUCT_MATCH.to_string()),
            reboot_report: None,
        }
    }
}

impl SupervisorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }
        if matches!(&self.sensor.reboot_report, Some(r) if r.is_empty()) {
            return Err(Error::InvalidConfig(
                "sensor.reboot_report must not be empty".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl SensorMatch {
    /// Returns `true` if a device with these identifiers passes the filter.
    pub fn matches(&self, vendor_id: u16, product_id: u16, product: Option<&str>) -> bool {
        if self.vendor_id.is_some_and(|v| v != vendor_id) {
            return false;
        }
        if self.product_id.is_some_and(|p| p != product_id) {
            return false;
        }
        match &self.product_contains {
            Some(needle) => product
                .map(|p| p.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            None => true,
        }
    }
}
