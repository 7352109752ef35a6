//! hidapi-backed sensor client.
//!
//! [`HidSensorClient`] recognises the sensor among attached HID devices using a
//! [`SensorMatch`] filter and keeps at most one of them open.
//!
//! - **Enumeration** refreshes the `hidapi` device list on every call and
//!   collapses multi-interface devices to one entry per (VID, PID, serial).
//! - **Removal** is detected by a watcher thread that owns the open device and
//!   keeps reading input reports; the first read error fires the removal
//!   listeners, once.
//! - **Reboot** is handed to the watcher, which sends the configured feature
//!   report between reads. Without a report, reboot is [`Error::Unsupported`].
//!
//! Input reports read by the watcher are discarded; touch data still reaches
//! the OS through its own handle.

use crate::config::SensorMatch;
use crate::device::{ListenerId, RemovalListener, SensorDeviceClient, SensorDeviceInfo};
use crate::error::{Error, Result};
use crate::listeners::RemovalLatch;
use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Upper bound on how long a queued command waits behind a watcher read.
const WATCH_READ_TIMEOUT_MS: i32 = 50;

/// Input report buffer; the watcher only cares whether the read succeeds.
const REPORT_BUF_LEN: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identifying fields of one enumerated HID interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HidEntry {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub product: Option<String>,
    pub path: String,
}

impl From<&DeviceInfo> for HidEntry {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            serial_number: info.serial_number().map(str::to_string),
            product: info.product_string().map(str::to_string),
            path: info.path().to_string_lossy().to_string(),
        }
    }
}

impl HidEntry {
    fn name(&self) -> String {
        self.product.as_deref().unwrap_or("Unknown").to_string()
    }

    fn describe(self) -> SensorDeviceInfo {
        SensorDeviceInfo {
            name: self.name(),
            vendor_id: Some(self.vendor_id),
            product_id: Some(self.product_id),
            serial_number: self.serial_number,
            path: Some(self.path),
        }
    }
}

/// Keep the entries that pass `filter`, one per (VID, PID, serial), in
/// enumeration order.
pub fn select_sensors<I>(filter: &SensorMatch, entries: I) -> Vec<SensorDeviceInfo>
where
    I: IntoIterator<Item = HidEntry>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| filter.matches(e.vendor_id, e.product_id, e.product.as_deref()))
        .filter(|e| seen.insert((e.vendor_id, e.product_id, e.serial_number.clone())))
        .map(HidEntry::describe)
        .collect()
}

/// Work the watcher performs on the device it owns.
enum Command {
    Reboot {
        report: Vec<u8>,
        reply: Sender<Result<()>>,
    },
}

/// The watcher thread for the open device. Dropping `commands` stops it.
struct Watch {
    name: String,
    commands: Option<Sender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl Watch {
    fn stop(&mut self) {
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("[HID] watcher for {} panicked", self.name);
            }
        }
    }
}

pub struct HidSensorClient {
    api: HidApi,
    filter: SensorMatch,
    open: Option<Watch>,
    removal: Arc<Mutex<RemovalLatch>>,
}

impl HidSensorClient {
    /// Initialise `hidapi`. Fails only if the HID subsystem is unavailable.
    pub fn new(filter: SensorMatch) -> Result<Self> {
        Ok(Self {
            api: HidApi::new()?,
            filter,
            open: None,
            removal: Arc::new(Mutex::new(RemovalLatch::new())),
        })
    }

    fn refresh(&mut self) {
        if let Err(e) = self.api.refresh_devices() {
            warn!("[HID] device refresh failed, using stale list: {e}");
        }
    }
}

/// The device calls the watcher makes; lets the loop run against a fake.
trait WatchedDevice {
    fn read_report(&self, buf: &mut [u8]) -> Result<usize>;
    fn send_feature(&self, report: &[u8]) -> Result<()>;
}

impl WatchedDevice for HidDevice {
    fn read_report(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.read_timeout(buf, WATCH_READ_TIMEOUT_MS)?)
    }

    fn send_feature(&self, report: &[u8]) -> Result<()> {
        Ok(self.send_feature_report(report)?)
    }
}

/// Serve commands and read until the device errors or the command sender is
/// dropped; on a read error fire removal once.
fn watch<D: WatchedDevice>(
    device: D,
    commands: Receiver<Command>,
    removal: Arc<Mutex<RemovalLatch>>,
) {
    let mut buf = [0u8; REPORT_BUF_LEN];
    loop {
        match commands.try_recv() {
            Ok(Command::Reboot { report, reply }) => {
                // The requester may have given up; nothing to do then.
                let _ = reply.send(device.send_feature(&report));
                continue;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if let Err(e) = device.read_report(&mut buf) {
            if matches!(commands.try_recv(), Err(TryRecvError::Disconnected)) {
                break;
            }
            debug!("[HID] read failed, treating sensor as removed: {e}");
            lock(&removal).fire();
            break;
        }
    }
}

impl SensorDeviceClient for HidSensorClient {
    fn open(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Ok(());
        }
        self.refresh();

        let info = self
            .api
            .device_list()
            .find(|info| {
                self.filter
                    .matches(info.vendor_id(), info.product_id(), info.product_string())
            })
            .ok_or(Error::NoDevice)?;
        let name = HidEntry::from(info).name();
        let device = info.open_device(&self.api)?;

        lock(&self.removal).reset();

        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new().name("touchsense-hid-watch".into()).spawn({
            let removal = self.removal.clone();
            move || watch(device, rx, removal)
        })?;

        info!("[HID] opened {name}");
        self.open = Some(Watch {
            name,
            commands: Some(tx),
            thread: Some(thread),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut watch = self.open.take().ok_or(Error::NotOpen)?;
        watch.stop();
        debug!("[HID] closed {}", watch.name);
        Ok(())
    }

    fn reboot(&mut self) -> Result<()> {
        let watch = self.open.as_ref().ok_or(Error::NotOpen)?;
        let report = self
            .filter
            .reboot_report
            .clone()
            .ok_or(Error::Unsupported("no sensor.reboot_report configured"))?;
        let commands = watch.commands.as_ref().ok_or(Error::Disconnected)?;

        let (reply, outcome) = mpsc::channel();
        commands
            .send(Command::Reboot { report, reply })
            .map_err(|_| Error::Disconnected)?;
        outcome.recv().map_err(|_| Error::Disconnected)??;
        info!("[HID] reboot requested for {}", watch.name);
        Ok(())
    }

    fn list_devices(&mut self) -> Vec<SensorDeviceInfo> {
        self.refresh();
        select_sensors(&self.filter, self.api.device_list().map(HidEntry::from))
    }

    fn subscribe_removed(&mut self, listener: RemovalListener) -> ListenerId {
        // The watcher may have seen the device go away before anyone subscribed.
        let handle_open = self.open.is_some();
        lock(&self.removal).subscribe(listener, handle_open)
    }

    fn unsubscribe_removed(&mut self, id: ListenerId) {
        lock(&self.removal).unsubscribe(id);
    }
}

impl Drop for HidSensorClient {
    fn drop(&mut self) {
        if let Some(mut watch) = self.open.take() {
            watch.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn entry(vid: u16, pid: u16, serial: Option<&str>, product: &str, path: &str) -> HidEntry {
        HidEntry {
            vendor_id: vid,
            product_id: pid,
            serial_number: serial.map(str::to_string),
            product: Some(product.to_string()),
            path: path.to_string(),
        }
    }

    #[test]
    fn multi_interface_device_is_listed_once() {
        let entries = vec![
            entry(0x2a6e, 0x0001, Some("SN1"), "ShadowSense Touch", "mi_00"),
            entry(0x2a6e, 0x0001, Some("SN1"), "ShadowSense Touch", "mi_01"),
            entry(0x2a6e, 0x0001, Some("SN1"), "ShadowSense Touch", "mi_02"),
            entry(0x046d, 0xc077, None, "USB Optical Mouse", "mouse"),
        ];
        let found = select_sensors(&SensorMatch::default(), entries);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ShadowSense Touch");
        assert_eq!(found[0].serial_number.as_deref(), Some("SN1"));
        assert_eq!(found[0].path.as_deref(), Some("mi_00"));
    }

    #[test]
    fn distinct_serials_are_separate_sensors() {
        let entries = vec![
            entry(0x2a6e, 0x0001, Some("SN1"), "ShadowSense A", "a0"),
            entry(0x2a6e, 0x0001, Some("SN2"), "ShadowSense B", "b0"),
            entry(0x2a6e, 0x0001, Some("SN2"), "ShadowSense B", "b1"),
            entry(0x2a6e, 0x0001, None, "ShadowSense C", "c0"),
            entry(0x2a6e, 0x0001, None, "ShadowSense C", "c1"),
        ];
        let names: Vec<_> = select_sensors(&SensorMatch::default(), entries)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["ShadowSense A", "ShadowSense B", "ShadowSense C"]);
    }

    #[test]
    fn filter_is_applied_before_dedup() {
        let filter = SensorMatch {
            vendor_id: Some(0x2a6e),
            product_contains: None,
            ..SensorMatch::default()
        };
        let entries = vec![
            entry(0x1111, 0x0001, Some("SN1"), "Other", "x"),
            entry(0x2a6e, 0x0001, Some("SN1"), "Sensor", "y"),
            HidEntry {
                product: None,
                ..entry(0x2a6e, 0x0002, None, "", "z")
            },
        ];
        let found = select_sensors(&filter, entries);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path.as_deref(), Some("y"));
        assert_eq!(found[1].name, "Unknown");
    }

    /// Blocks each read for a while and fails reads once `gone` is set.
    struct FakeDevice {
        read_delay: Duration,
        gone: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl WatchedDevice for FakeDevice {
        fn read_report(&self, _buf: &mut [u8]) -> Result<usize> {
            thread::sleep(self.read_delay);
            if self.gone.load(Ordering::SeqCst) {
                Err(Error::Disconnected)
            } else {
                Ok(0)
            }
        }

        fn send_feature(&self, report: &[u8]) -> Result<()> {
            lock(&self.sent).push(report.to_vec());
            Ok(())
        }
    }

    fn spawn_fake(
        read_delay: Duration,
    ) -> (
        Sender<Command>,
        JoinHandle<()>,
        Arc<AtomicBool>,
        Arc<Mutex<Vec<Vec<u8>>>>,
        Arc<AtomicUsize>,
    ) {
        let gone = Arc::new(AtomicBool::new(false));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let removal = Arc::new(Mutex::new(RemovalLatch::new()));
        let h = hits.clone();
        lock(&removal).subscribe(
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
            true,
        );
        let device = FakeDevice {
            read_delay,
            gone: gone.clone(),
            sent: sent.clone(),
        };
        let (tx, rx) = mpsc::channel();
        let thread = thread::spawn(move || watch(device, rx, removal));
        (tx, thread, gone, sent, hits)
    }

    #[test]
    fn reboot_is_served_between_reads() {
        let (tx, thread, _gone, sent, hits) = spawn_fake(Duration::from_millis(20));

        for round in 0..5u8 {
            let started = Instant::now();
            let (reply, outcome) = mpsc::channel();
            tx.send(Command::Reboot {
                report: vec![0x01, round],
                reply,
            })
            .unwrap();
            outcome.recv().unwrap().unwrap();
            // One in-flight read at most, never a queue of them.
            assert!(started.elapsed() < Duration::from_millis(200));
        }

        drop(tx);
        thread.join().unwrap();
        assert_eq!(lock(&sent).len(), 5);
        assert_eq!(lock(&sent)[4], vec![0x01, 4]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn read_error_fires_removal_once_and_ends_watch() {
        let (tx, thread, gone, _sent, hits) = spawn_fake(Duration::from_millis(1));

        gone.store(true, Ordering::SeqCst);
        thread.join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (reply, _outcome) = mpsc::channel();
        assert!(tx
            .send(Command::Reboot {
                report: vec![0x01],
                reply
            })
            .is_err());
    }
}
