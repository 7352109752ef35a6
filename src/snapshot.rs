//! Per-tick capability snapshot and its text report.
//!
//! [`CapabilitySnapshot`] is an **owned**, immutable view of what the host and
//! the sensor layer reported on one tick. It is rebuilt from scratch every tick
//! by [`DeviceSupervisor::tick`](crate::supervisor::DeviceSupervisor::tick) and
//! carries no identity between ticks.
//!
//! [`Report`] is the text rendering handed to a
//! [`ReportSink`](crate::runner::ReportSink):
//!
//! ```text
//! 2 Tablet devices detected
//!
//! 2 ShadowSense devices detected
//! Device: Alpha
//! Device: Beta
//!
//! Pen and Touch with 4 touch points
//! ```

use serde::Serialize;
use std::fmt::{self, Write as _};

/// Capabilities and sensor devices observed on one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySnapshot {
    pub tablet_device_count: usize,
    /// Sensor device names in enumeration order.
    pub sensor_device_names: Vec<String>,
    pub has_pen: bool,
    pub has_touch: bool,
    /// `0` when touch is absent or the digitizer does not report a count.
    pub max_touch_points: u32,
}

impl CapabilitySnapshot {
    /// The final report line describing pen/touch support.
    pub fn capability_line(&self) -> String {
        match (self.has_pen, self.has_touch) {
            (false, false) => "No Pen or Touch available".to_string(),
            (true, false) => "Pen".to_string(),
            (false, true) => format!("Touch with {} touch points", self.max_touch_points),
            (true, true) => format!("Pen and Touch with {} touch points", self.max_touch_points),
        }
    }

    /// Render the full report text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{} Tablet devices detected", self.tablet_device_count);
        out.push('\n');
        let _ = writeln!(out, "{} ShadowSense devices detected", self.sensor_device_names.len());
        for name in &self.sensor_device_names {
            let _ = writeln!(out, "Device: {name}");
        }
        out.push('\n');
        out.push_str(&self.capability_line());
        out
    }
}

/// A snapshot together with its rendered text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    snapshot: CapabilitySnapshot,
    text: String,
}

impl Report {
    pub fn new(snapshot: CapabilitySnapshot) -> Self {
        let text = snapshot.render();
        Self { snapshot, text }
    }

    #[inline]
    pub fn snapshot(&self) -> &CapabilitySnapshot {
        &self.snapshot
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consume the report and return the snapshot.
    #[inline]
    pub fn into_snapshot(self) -> CapabilitySnapshot {
        self.snapshot
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
