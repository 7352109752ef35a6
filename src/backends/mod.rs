//! Concrete collaborators for the supervisor.
//!
//! - [`virtual_sensor`] — in-memory simulated sensor (always available).
//! - `hid` — sensor client over `hidapi` (feature **`hid`**, default).
//! - `windows` — Win32 capability metrics (Windows only).
//!
//! [`platform_metrics`] picks the metrics source for the current target.

use crate::capability::MetricsSource;

pub mod virtual_sensor;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

#[cfg(target_os = "windows")]
#[cfg_attr(docsrs, doc(cfg(target_os = "windows")))]
pub mod windows;

/// Metrics source for the current platform.
///
/// Windows reads the Win32 system metrics; other targets report nothing.
pub fn platform_metrics() -> Box<dyn MetricsSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(crate::backends::windows::Win32Metrics)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(crate::capability::NullMetrics)
    }
}
