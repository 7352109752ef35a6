//! In-memory simulated sensor.
//!
//! [`VirtualSensor`] implements [`SensorDeviceClient`] without hardware. A
//! cloneable [`VirtualSensorControl`] drives it from elsewhere: plug and unplug
//! the device, make opens or reboots fail, and read back how many times each
//! command was issued. Unplugging an open device fires the removal listeners
//! once, the way a real disconnect would.

use crate::device::{ListenerId, RemovalListener, SensorDeviceClient, SensorDeviceInfo};
use crate::error::{Error, Result};
use crate::listeners::RemovalLatch;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of times each command reached the sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub open: usize,
    pub close: usize,
    pub reboot: usize,
}

#[derive(Debug, Default)]
struct Shared {
    names: Vec<String>,
    plugged: bool,
    open: bool,
    fail_opens: bool,
    fail_reboots: bool,
    calls: CallCounts,
    removal: RemovalLatch,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated sensor client.
#[derive(Debug)]
pub struct VirtualSensor {
    shared: Arc<Mutex<Shared>>,
}

/// Remote control for a [`VirtualSensor`].
#[derive(Clone, Debug)]
pub struct VirtualSensorControl {
    shared: Arc<Mutex<Shared>>,
}

impl VirtualSensor {
    /// Create a plugged-in sensor that enumerates as `names`.
    pub fn new<I, S>(names: I) -> (Self, VirtualSensorControl)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared = Arc::new(Mutex::new(Shared {
            names: names.into_iter().map(Into::into).collect(),
            plugged: true,
            ..Shared::default()
        }));
        (
            Self {
                shared: shared.clone(),
            },
            VirtualSensorControl { shared },
        )
    }
}

impl SensorDeviceClient for VirtualSensor {
    fn open(&mut self) -> Result<()> {
        let mut s = lock(&self.shared);
        s.calls.open += 1;
        if !s.plugged {
            return Err(Error::NoDevice);
        }
        if s.fail_opens {
            return Err(Error::Disconnected);
        }
        s.open = true;
        s.removal.reset();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut s = lock(&self.shared);
        s.calls.close += 1;
        if !s.open {
            return Err(Error::NotOpen);
        }
        s.open = false;
        Ok(())
    }

    fn reboot(&mut self) -> Result<()> {
        let mut s = lock(&self.shared);
        s.calls.reboot += 1;
        if !s.open {
            return Err(Error::NotOpen);
        }
        if !s.plugged {
            return Err(Error::Disconnected);
        }
        if s.fail_reboots {
            return Err(Error::Unsupported("simulated reboot failure"));
        }
        Ok(())
    }

    fn list_devices(&mut self) -> Vec<SensorDeviceInfo> {
        let s = lock(&self.shared);
        if !s.plugged {
            return Vec::new();
        }
        s.names
            .iter()
            .enumerate()
            .map(|(i, name)| SensorDeviceInfo {
                name: name.clone(),
                path: Some(format!("virtual:{i}")),
                ..SensorDeviceInfo::default()
            })
            .collect()
    }

    fn subscribe_removed(&mut self, listener: RemovalListener) -> ListenerId {
        let mut s = lock(&self.shared);
        let handle_open = s.open;
        s.removal.subscribe(listener, handle_open)
    }

    fn unsubscribe_removed(&mut self, id: ListenerId) {
        lock(&self.shared).removal.unsubscribe(id);
    }
}

impl VirtualSensorControl {
    pub fn plug(&self) {
        lock(&self.shared).plugged = true;
    }

    /// Disconnect the device. Fires removal listeners if a handle is open.
    pub fn unplug(&self) {
        let mut s = lock(&self.shared);
        s.plugged = false;
        if s.open {
            s.removal.fire();
        }
    }

    pub fn fail_opens(&self, fail: bool) {
        lock(&self.shared).fail_opens = fail;
    }

    pub fn fail_reboots(&self, fail: bool) {
        lock(&self.shared).fail_reboots = fail;
    }

    pub fn is_plugged(&self) -> bool {
        lock(&self.shared).plugged
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    pub fn calls(&self) -> CallCounts {
        lock(&self.shared).calls
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.shared).removal.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn open_requires_plugged_device() {
        let (mut sensor, control) = VirtualSensor::new(["A"]);
        control.unplug();
        assert!(matches!(sensor.open(), Err(Error::NoDevice)));
        assert!(sensor.list_devices().is_empty());

        control.plug();
        sensor.open().unwrap();
        assert!(control.is_open());
        assert_eq!(sensor.list_devices()[0].name, "A");
    }

    #[test]
    fn unplug_fires_listeners_once_per_handle() {
        let (mut sensor, control) = VirtualSensor::new(["A"]);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        sensor.open().unwrap();
        sensor.subscribe_removed(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        control.unplug();
        control.unplug();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sensor.close().unwrap();
        assert!(matches!(sensor.close(), Err(Error::NotOpen)));
        assert_eq!(control.calls().close, 2);
    }

    #[test]
    fn reboot_needs_open_handle() {
        let (mut sensor, control) = VirtualSensor::new(["A"]);
        assert!(matches!(sensor.reboot(), Err(Error::NotOpen)));
        sensor.open().unwrap();
        sensor.reboot().unwrap();
        control.fail_reboots(true);
        assert!(matches!(sensor.reboot(), Err(Error::Unsupported(_))));
        assert_eq!(control.calls().reboot, 3);
    }
}
