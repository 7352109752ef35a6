//! Fixed-interval tick loop and report sinks.
//!
//! [`Runner::run`] drives a [`DeviceSupervisor`] from a single thread. Between
//! ticks it blocks on the supervisor's notice channel, so removal notices are
//! applied as soon as they arrive rather than on the next tick. Ticks never
//! overlap: if a tick overruns the interval, the next one starts right after
//! it finishes, and missed ticks are not replayed.
//!
//! ```no_run
//! use touchsense::backends::{platform_metrics, virtual_sensor::VirtualSensor};
//! use touchsense::{DeviceSupervisor, Runner, SupervisorConfig, TextSink};
//!
//! let cfg = SupervisorConfig::default();
//! let (sensor, _control) = VirtualSensor::new(["ShadowSense"]);
//! let sup = DeviceSupervisor::new(sensor, platform_metrics(), &cfg);
//! let mut sink = TextSink::new(std::io::stdout());
//! Runner::new(cfg.tick_interval()).with_tick_limit(3).run(&sup, &mut sink);
//! ```

use crate::capability::MetricsSource;
use crate::device::SensorDeviceClient;
use crate::snapshot::Report;
use crate::supervisor::{DeviceSupervisor, Notice};
use log::warn;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Receives the report produced by every tick.
pub trait ReportSink {
    fn display(&mut self, report: &Report);
}

impl<F: FnMut(&Report)> ReportSink for F {
    fn display(&mut self, report: &Report) {
        self(report)
    }
}

/// Writes the report text followed by a blank line.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn display(&mut self, report: &Report) {
        let result = writeln!(self.out, "{report}\n").and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!("failed to write report: {e}");
        }
    }
}

/// Writes each snapshot as one line of JSON.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn display(&mut self, report: &Report) {
        let result = serde_json::to_writer(&mut self.out, report.snapshot())
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!("failed to write report: {e}");
        }
    }
}

/// Stops a [`Runner`] from another thread.
#[derive(Clone, Debug)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Sender<Notice>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // The runner may be parked waiting for the next tick.
        let _ = self.wake.send(Notice::Wake);
    }
}

/// Single-threaded tick scheduler.
#[derive(Debug)]
pub struct Runner {
    interval: Duration,
    tick_limit: Option<u64>,
    stopped: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tick_limit: None,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop after `ticks` ticks.
    pub fn with_tick_limit(mut self, ticks: u64) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    pub fn stop_handle<C, M>(&self, supervisor: &DeviceSupervisor<C, M>) -> StopHandle
    where
        C: SensorDeviceClient,
        M: MetricsSource,
    {
        StopHandle {
            stopped: self.stopped.clone(),
            wake: supervisor.notifier(),
        }
    }

    /// Tick until stopped or the tick limit is reached, then shut the
    /// supervisor down. Returns the number of ticks run.
    pub fn run<C, M, S>(&self, supervisor: &DeviceSupervisor<C, M>, sink: &mut S) -> u64
    where
        C: SensorDeviceClient,
        M: MetricsSource,
        S: ReportSink + ?Sized,
    {
        let mut ticks = 0u64;
        let mut next = Instant::now();

        while !self.stopped.load(Ordering::Acquire) {
            if self.tick_limit.is_some_and(|limit| ticks >= limit) {
                break;
            }

            let now = Instant::now();
            if now < next {
                if let Some(notice) = supervisor.wait_notice(next - now) {
                    supervisor.handle_notice(notice);
                }
                continue;
            }

            let report = supervisor.tick();
            sink.display(&report);
            ticks += 1;

            next += self.interval;
            let finished = Instant::now();
            if next < finished {
                next = finished;
            }
        }

        supervisor.shutdown();
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CapabilitySnapshot;

    fn report() -> Report {
        Report::new(CapabilitySnapshot {
            tablet_device_count: 1,
            sensor_device_names: vec!["Alpha".into()],
            has_pen: false,
            has_touch: true,
            max_touch_points: 10,
        })
    }

    #[test]
    fn text_sink_writes_report_and_separator() {
        let mut sink = TextSink::new(Vec::new());
        sink.display(&report());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "1 Tablet devices detected\n\n1 ShadowSense devices detected\nDevice: Alpha\n\nTouch with 10 touch points\n\n"
        );
    }

    #[test]
    fn json_sink_writes_one_object_per_line() {
        let mut sink = JsonSink::new(Vec::new());
        sink.display(&report());
        sink.display(&report());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["max_touch_points"], 10);
        assert_eq!(value["sensor_device_names"][0], "Alpha");
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        let mut sink = |r: &Report| seen.push(r.as_str().to_string());
        sink.display(&report());
        assert_eq!(seen.len(), 1);
    }
}
