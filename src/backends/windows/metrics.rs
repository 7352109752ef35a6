//! Win32 digitizer metrics.
//!
//! Reads `SM_DIGITIZER` and `SM_MAXIMUMTOUCHES` through `GetSystemMetrics`, and
//! counts pointer devices (pen, touch, touchpad) through `GetPointerDevices`.
//! Failed calls read as zero.

#![cfg(target_os = "windows")]

use crate::capability::MetricsSource;
use windows_sys::Win32::UI::Controls::GetPointerDevices;
use windows_sys::Win32::UI::WindowsAndMessaging::GetSystemMetrics;

// Local constants (avoid relying on module exports that vary by windows-sys version)
const SM_DIGITIZER: i32 = 94;
const SM_MAXIMUMTOUCHES: i32 = 95;

/// [`MetricsSource`] backed by the Win32 system metrics API.
#[derive(Clone, Copy, Debug, Default)]
pub struct Win32Metrics;

impl MetricsSource for Win32Metrics {
    fn digitizer_bits(&self) -> u32 {
        // SAFETY: GetSystemMetrics takes an index by value and has no preconditions.
        let bits = unsafe { GetSystemMetrics(SM_DIGITIZER) };
        bits.max(0) as u32
    }

    fn max_touches(&self) -> u32 {
        // SAFETY: as above.
        let touches = unsafe { GetSystemMetrics(SM_MAXIMUMTOUCHES) };
        touches.max(0) as u32
    }

    fn pointer_device_count(&self) -> usize {
        let mut count: u32 = 0;
        // SAFETY: a null device array asks only for the count, written to `count`.
        let ok = unsafe { GetPointerDevices(&mut count, core::ptr::null_mut()) };
        if ok == 0 {
            0
        } else {
            count as usize
        }
    }
}
