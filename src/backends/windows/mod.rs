#![cfg(target_os = "windows")]

//! Windows platform backends.
//!
//! Only the capability metrics live here; the sensor itself is reached through
//! `hidapi`, which is cross-platform.

pub mod metrics;

pub use metrics::Win32Metrics;
