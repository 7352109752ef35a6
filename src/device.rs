//! Sensor device abstraction.
//!
//! [`SensorDeviceClient`] is the seam between the supervisor and a concrete
//! sensor backend (HID, simulated, or a test fake). A client owns at most one
//! open connection at a time; the supervisor decides when to open, reboot and
//! close it.
//!
//! # Removal notifications
//! Clients deliver "device removed" through listeners registered with
//! [`SensorDeviceClient::subscribe_removed`]. A listener fires at most once per
//! open handle. Clients may invoke listeners from any thread, including from
//! inside a client call, so a listener must not block or call back into the
//! client.

use crate::error::Result;
use serde::Serialize;

/// Identifier returned by [`SensorDeviceClient::subscribe_removed`].
pub type ListenerId = u64;

/// Callback fired when the open device is removed.
pub type RemovalListener = Box<dyn FnMut() + Send>;

/// Description of one enumerable sensor device.
///
/// Only `name` feeds the report; the rest is best-effort diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SensorDeviceInfo {
    /// Human-readable device name (product string when available).
    pub name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial_number: Option<String>,
    /// OS path; opaque and may change across reconnects.
    pub path: Option<String>,
}

impl SensorDeviceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

pub trait SensorDeviceClient: Send {
    /// Open a connection to the sensor. `Err` is routine when none is attached.
    fn open(&mut self) -> Result<()>;

    /// Close the open connection.
    fn close(&mut self) -> Result<()>;

    /// Ask the open device to reboot.
    fn reboot(&mut self) -> Result<()>;

    /// Enumerate attached sensors, independent of whether one is open.
    fn list_devices(&mut self) -> Vec<SensorDeviceInfo>;

    fn subscribe_removed(&mut self, listener: RemovalListener) -> ListenerId;

    fn unsubscribe_removed(&mut self, id: ListenerId);
}

impl<C: SensorDeviceClient + ?Sized> SensorDeviceClient for Box<C> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
    fn reboot(&mut self) -> Result<()> {
        (**self).reboot()
    }
    fn list_devices(&mut self) -> Vec<SensorDeviceInfo> {
        (**self).list_devices()
    }
    fn subscribe_removed(&mut self, listener: RemovalListener) -> ListenerId {
        (**self).subscribe_removed(listener)
    }
    fn unsubscribe_removed(&mut self, id: ListenerId) {
        (**self).unsubscribe_removed(id)
    }
}
