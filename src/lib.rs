//! touchsense — touch/pen capability reporter and ShadowSense sensor supervisor.
//!
//! Reports what pen and touch input the host supports, lists attached
//! ShadowSense sensors, and keeps a connection to one sensor alive: opening it
//! when it appears, rebooting it periodically, and releasing it when it is
//! removed.
//!
//! The pieces, leaves first:
//! - [`CapabilityProbe`] over a [`MetricsSource`] (Win32 metrics on Windows).
//! - [`SensorDeviceClient`], implemented by the HID and virtual backends.
//! - [`DeviceSupervisor`], the open/reboot/close state machine.
//! - [`Runner`], the fixed-interval tick loop feeding a [`ReportSink`].

pub mod backends;
pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod listeners;
pub mod runner;
pub mod snapshot;
pub mod supervisor;

pub use capability::*;
pub use config::*;
pub use device::*;
pub use error::{Error, Result};
pub use listeners::*;
pub use runner::*;
pub use snapshot::*;
pub use supervisor::*;
