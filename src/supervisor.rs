//! Sensor device lifecycle supervisor.
//!
//! [`DeviceSupervisor`] owns at most one open sensor handle and drives it
//! through a two-state machine on every [`tick`](DeviceSupervisor::tick):
//!
//! | state        | tick does                                                          |
//! |--------------|--------------------------------------------------------------------|
//! | `NoDevice`   | try to open; on success subscribe to removal, counter = 0          |
//! | `DeviceOpen` | counter += 1; if counter > threshold, reboot and counter = 0       |
//!
//! A removal notification moves `DeviceOpen` back to `NoDevice`: the listener
//! is unsubscribed, the handle is closed and forgotten.
//!
//! Every tick, whatever the state, also builds a [`CapabilitySnapshot`] from the
//! [`CapabilityProbe`] and the sensor enumeration and returns it as a [`Report`].
//!
//! ## Serialisation
//! The tick body and removal handling run under one mutex, so exactly one of
//! them mutates supervisor state at a time and ticks never overlap. Removal
//! listeners do not take that lock; they post a [`Notice`] to a channel. The
//! notice is applied either by [`handle_notice`](DeviceSupervisor::handle_notice)
//! (usually from the [`Runner`](crate::runner::Runner)) or at the start of the
//! next tick, before any open attempt.
//!
//! Open failures are routine and only logged at debug level. Reboot and close
//! failures are logged as warnings and never change the next transition.

use crate::capability::{CapabilityProbe, MetricsSource};
use crate::config::SupervisorConfig;
use crate::device::{ListenerId, SensorDeviceClient};
use crate::snapshot::{CapabilitySnapshot, Report};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

/// Observable supervisor state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    NoDevice,
    /// `ticks` counts ticks since the handle was opened or last rebooted.
    DeviceOpen { ticks: u32 },
}

/// Message delivered to the supervisor outside the tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The handle opened as `generation` was removed.
    Removed { generation: u64 },
    /// Wakes a waiting runner without changing state.
    Wake,
}

#[derive(Debug)]
struct OpenHandle {
    generation: u64,
    listener: ListenerId,
    ticks: u32,
}

struct Inner<C> {
    client: C,
    open: Option<OpenHandle>,
    next_generation: u64,
}

pub struct DeviceSupervisor<C: SensorDeviceClient, M: MetricsSource> {
    inner: Mutex<Inner<C>>,
    probe: CapabilityProbe<M>,
    reboot_threshold: u32,
    notices_tx: Sender<Notice>,
    notices_rx: Mutex<Receiver<Notice>>,
}

impl<C: SensorDeviceClient, M: MetricsSource> DeviceSupervisor<C, M> {
    pub fn new(client: C, metrics: M, config: &SupervisorConfig) -> Self {
        Self::with_threshold(client, metrics, config.reboot_threshold)
    }

    pub fn with_threshold(client: C, metrics: M, reboot_threshold: u32) -> Self {
        let (notices_tx, notices_rx) = mpsc::channel();
        Self {
            inner: Mutex::new(Inner {
                client,
                open: None,
                next_generation: 0,
            }),
            probe: CapabilityProbe::new(metrics),
            reboot_threshold,
            notices_tx,
            notices_rx: Mutex::new(notices_rx),
        }
    }

    /// Run one tick: apply pending notices, advance the state machine, and
    /// report current capabilities.
    pub fn tick(&self) -> Report {
        let mut inner = self.lock();

        self.drain_notices(&mut inner);

        if inner.open.is_none() {
            self.try_open(&mut inner);
        } else if self.advance_counter(&mut inner) {
            info!("sensor open for more than {} ticks, rebooting", self.reboot_threshold);
            if let Err(e) = inner.client.reboot() {
                warn!("sensor reboot failed: {e}");
            }
        }

        Report::new(self.snapshot(&mut inner))
    }

    /// Apply a notice immediately.
    pub fn handle_notice(&self, notice: Notice) {
        let mut inner = self.lock();
        Self::apply(&mut inner, notice);
    }

    /// Wait up to `timeout` for a notice. Returns `None` on timeout.
    pub fn wait_notice(&self, timeout: Duration) -> Option<Notice> {
        let rx = self.notices_rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.recv_timeout(timeout) {
            Ok(notice) => Some(notice),
            Err(RecvTimeoutError::Timeout) => None,
            // We hold a sender ourselves, so the channel cannot disconnect.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// A sender that can post notices (e.g. to wake a waiting runner).
    pub fn notifier(&self) -> Sender<Notice> {
        self.notices_tx.clone()
    }

    pub fn state(&self) -> SupervisorState {
        match &self.lock().open {
            None => SupervisorState::NoDevice,
            Some(h) => SupervisorState::DeviceOpen { ticks: h.ticks },
        }
    }

    /// Close the open handle, if any. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        Self::release(&mut inner, "shutdown");
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain_notices(&self, inner: &mut Inner<C>) {
        // A runner blocked in `wait_notice` holds the receiver and will deliver
        // the notice itself.
        let rx = match self.notices_rx.try_lock() {
            Ok(rx) => rx,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        while let Ok(notice) = rx.try_recv() {
            Self::apply(inner, notice);
        }
    }

    fn apply(inner: &mut Inner<C>, notice: Notice) {
        match notice {
            Notice::Removed { generation } => {
                if inner.open.as_ref().map(|h| h.generation) == Some(generation) {
                    info!("sensor device removed");
                    Self::release(inner, "removal");
                } else {
                    debug!("ignoring stale removal notice (generation {generation})");
                }
            }
            Notice::Wake => {}
        }
    }

    fn try_open(&self, inner: &mut Inner<C>) {
        match inner.client.open() {
            Ok(()) => {
                let generation = inner.next_generation;
                inner.next_generation += 1;

                let tx = self.notices_tx.clone();
                let listener = inner.client.subscribe_removed(Box::new(move || {
                    let _ = tx.send(Notice::Removed { generation });
                }));

                inner.open = Some(OpenHandle {
                    generation,
                    listener,
                    ticks: 0,
                });
                info!("sensor device opened (generation {generation})");
            }
            Err(e) => debug!("sensor open failed: {e}"),
        }
    }

    /// Bump the tick counter; returns `true` (and resets it) when a reboot is due.
    fn advance_counter(&self, inner: &mut Inner<C>) -> bool {
        let Some(handle) = inner.open.as_mut() else {
            return false;
        };
        handle.ticks = handle.ticks.saturating_add(1);
        if handle.ticks > self.reboot_threshold {
            handle.ticks = 0;
            true
        } else {
            false
        }
    }

    fn release(inner: &mut Inner<C>, reason: &str) {
        let Some(handle) = inner.open.take() else {
            return;
        };
        inner.client.unsubscribe_removed(handle.listener);
        match inner.client.close() {
            Ok(()) => debug!("sensor handle {} closed ({reason})", handle.generation),
            Err(e) => warn!("sensor close failed ({reason}): {e}"),
        }
    }

    fn snapshot(&self, inner: &mut Inner<C>) -> CapabilitySnapshot {
        let flags = self.probe.digitizer_flags();
        let max_touch_points = if flags.has_touch {
            self.probe.max_touch_points()
        } else {
            0
        };
        CapabilitySnapshot {
            tablet_device_count: self.probe.pointer_device_count(),
            sensor_device_names: inner
                .client
                .list_devices()
                .into_iter()
                .map(|d| d.name)
                .collect(),
            has_pen: flags.has_pen,
            has_touch: flags.has_touch,
            max_touch_points,
        }
    }
}

impl<C: SensorDeviceClient, M: MetricsSource> Drop for DeviceSupervisor<C, M> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::release(inner, "drop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_sensor::VirtualSensor;
    use crate::capability::tests::FixedMetrics;
    use crate::capability::{NID_INTEGRATED_PEN, NID_INTEGRATED_TOUCH, NID_MULTI_INPUT, NID_READY};

    fn supervisor(
        threshold: u32,
    ) -> (
        DeviceSupervisor<VirtualSensor, FixedMetrics>,
        crate::backends::virtual_sensor::VirtualSensorControl,
    ) {
        let (sensor, control) = VirtualSensor::new(["Alpha", "Beta"]);
        let sup = DeviceSupervisor::with_threshold(sensor, FixedMetrics::default(), threshold);
        (sup, control)
    }

    #[test]
    fn failed_open_stays_in_no_device() {
        let (sup, control) = supervisor(10);
        control.unplug();

        sup.tick();
        sup.tick();

        assert_eq!(sup.state(), SupervisorState::NoDevice);
        assert_eq!(control.calls().open, 2);
        assert_eq!(control.listener_count(), 0);
    }

    #[test]
    fn successful_open_enters_device_open_at_zero() {
        let (sup, control) = supervisor(10);

        sup.tick();

        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
        assert!(control.is_open());
        assert_eq!(control.listener_count(), 1);
    }

    #[test]
    fn open_retries_until_device_appears() {
        let (sup, control) = supervisor(10);
        control.unplug();
        sup.tick();
        assert_eq!(sup.state(), SupervisorState::NoDevice);

        control.plug();
        sup.tick();
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
        assert_eq!(control.calls().open, 2);
    }

    #[test]
    fn reboot_fires_once_on_threshold_plus_one() {
        let (sup, control) = supervisor(10);
        sup.tick(); // open

        for i in 1..=10 {
            sup.tick();
            assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: i });
            assert_eq!(control.calls().reboot, 0);
        }

        sup.tick(); // 11th tick in DeviceOpen
        assert_eq!(control.calls().reboot, 1);
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });

        // Counter restarts from the reboot.
        for _ in 0..10 {
            sup.tick();
        }
        assert_eq!(control.calls().reboot, 1);
        sup.tick();
        assert_eq!(control.calls().reboot, 2);
    }

    #[test]
    fn failed_reboot_still_resets_counter() {
        let (sup, control) = supervisor(1);
        control.fail_reboots(true);
        sup.tick(); // open
        sup.tick(); // 1
        sup.tick(); // 2 > 1 -> reboot (fails)

        assert_eq!(control.calls().reboot, 1);
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
        assert!(control.is_open());
    }

    #[test]
    fn max_threshold_counter_saturates_without_reboot() {
        let (sup, control) = supervisor(u32::MAX);
        sup.tick(); // open
        if let Some(handle) = sup.lock().open.as_mut() {
            handle.ticks = u32::MAX - 1;
        }

        sup.tick(); // MAX - 1 -> MAX
        sup.tick(); // saturates at MAX
        sup.tick();

        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: u32::MAX });
        assert_eq!(control.calls().reboot, 0);
    }

    #[test]
    fn removal_closes_once_and_reopens_on_next_tick() {
        let (sup, control) = supervisor(10);
        sup.tick();
        sup.tick();

        control.unplug();
        let notice = sup.wait_notice(Duration::from_secs(1)).expect("removal notice");
        sup.handle_notice(notice);

        assert_eq!(sup.state(), SupervisorState::NoDevice);
        assert_eq!(control.calls().close, 1);
        assert_eq!(control.listener_count(), 0);
        assert!(!control.is_open());

        control.plug();
        sup.tick();
        assert_eq!(control.calls().open, 2);
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
    }

    #[test]
    fn pending_removal_is_applied_before_next_open() {
        let (sup, control) = supervisor(10);
        sup.tick();

        control.unplug();
        control.plug();
        // No runner delivered the notice; the tick must drain it first.
        sup.tick();

        let calls = control.calls();
        assert_eq!(calls.close, 1);
        assert_eq!(calls.open, 2);
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
    }

    #[test]
    fn stale_removal_notice_is_ignored() {
        let (sup, control) = supervisor(10);
        sup.tick();
        control.unplug();
        let notice = sup.wait_notice(Duration::from_secs(1)).expect("removal notice");
        sup.handle_notice(notice);
        control.plug();
        sup.tick(); // reopened as generation 1

        sup.handle_notice(notice);

        assert_eq!(control.calls().close, 1);
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 0 });
    }

    #[test]
    fn shutdown_closes_open_handle_once() {
        let (sup, control) = supervisor(10);
        sup.tick();
        sup.shutdown();
        sup.shutdown();
        drop(sup);
        assert_eq!(control.calls().close, 1);
    }

    #[test]
    fn drop_closes_open_handle() {
        let (sup, control) = supervisor(10);
        sup.tick();
        drop(sup);
        assert_eq!(control.calls().close, 1);
        assert!(!control.is_open());
    }

    #[test]
    fn wait_notice_times_out_without_events() {
        let (sup, _control) = supervisor(10);
        assert_eq!(sup.wait_notice(Duration::from_millis(10)), None);
    }

    #[test]
    fn report_lists_sensors_even_without_open_handle() {
        let (sensor, control) = VirtualSensor::new(["Alpha", "Beta"]);
        control.fail_opens(true);
        let metrics = FixedMetrics {
            bits: NID_READY | NID_MULTI_INPUT | NID_INTEGRATED_PEN | NID_INTEGRATED_TOUCH,
            touches: 4,
            pointers: 2,
        };
        let sup = DeviceSupervisor::with_threshold(sensor, metrics, 10);

        let report = sup.tick();

        assert_eq!(sup.state(), SupervisorState::NoDevice);
        assert_eq!(
            report.as_str(),
            "2 Tablet devices detected\n\n2 ShadowSense devices detected\nDevice: Alpha\nDevice: Beta\n\nPen and Touch with 4 touch points"
        );
    }

    #[test]
    fn touch_points_skipped_when_touch_absent() {
        let (sensor, _control) = VirtualSensor::new(Vec::<String>::new());
        let metrics = FixedMetrics {
            bits: NID_READY | NID_MULTI_INPUT | NID_INTEGRATED_PEN,
            touches: 4,
            pointers: 1,
        };
        let sup = DeviceSupervisor::with_threshold(sensor, metrics, 10);

        let snap = sup.tick().into_snapshot();

        assert!(snap.has_pen);
        assert!(!snap.has_touch);
        assert_eq!(snap.max_touch_points, 0);
        assert_eq!(snap.capability_line(), "Pen");
    }

    #[test]
    fn wake_notice_changes_nothing() {
        let (sup, control) = supervisor(10);
        sup.tick();
        sup.notifier().send(Notice::Wake).unwrap();
        sup.tick();
        assert_eq!(sup.state(), SupervisorState::DeviceOpen { ticks: 1 });
        assert_eq!(control.calls().close, 0);
    }
}
