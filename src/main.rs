use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use touchsense::backends::platform_metrics;
use touchsense::backends::virtual_sensor::{VirtualSensor, VirtualSensorControl};
use touchsense::{
    DeviceSupervisor, JsonSink, ReportSink, Runner, SensorDeviceClient, SupervisorConfig, TextSink,
};

/// Ticks between simulated plug/unplug events in `--simulate` mode.
const SIMULATED_TOGGLE_TICKS: u32 = 15;

#[derive(Parser, Debug)]
#[command(name = "touchsense", version, about = "Report pen/touch capabilities and supervise a ShadowSense sensor")]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick interval in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Ticks before a forced sensor reboot (overrides config)
    #[arg(long)]
    reboot_threshold: Option<u32>,

    /// Print a single report and exit
    #[arg(long, conflicts_with = "ticks")]
    once: bool,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Emit JSON snapshots instead of text reports
    #[arg(long)]
    json: bool,

    /// Use a simulated sensor that is plugged and unplugged periodically
    #[arg(long)]
    simulate: bool,
}

fn load_config(cli: &Cli) -> touchsense::Result<SupervisorConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };
    if let Some(ms) = cli.interval_ms {
        cfg.tick_interval_ms = ms;
    }
    if let Some(threshold) = cli.reboot_threshold {
        cfg.reboot_threshold = threshold;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn spawn_simulation(control: VirtualSensorControl, cfg: &SupervisorConfig) {
    let period = cfg.tick_interval() * SIMULATED_TOGGLE_TICKS;
    thread::spawn(move || loop {
        thread::sleep(period);
        if control.is_plugged() {
            info!("[SIM] unplugging sensor");
            control.unplug();
        } else {
            info!("[SIM] plugging sensor");
            control.plug();
        }
    });
}

fn sensor_client(cli: &Cli, cfg: &SupervisorConfig) -> touchsense::Result<Box<dyn SensorDeviceClient>> {
    if cli.simulate {
        let (sensor, control) = VirtualSensor::new(["ShadowSense (simulated)"]);
        spawn_simulation(control, cfg);
        return Ok(Box::new(sensor));
    }

    #[cfg(feature = "hid")]
    {
        let client = touchsense::backends::hid::HidSensorClient::new(cfg.sensor.clone())?;
        Ok(Box::new(client))
    }

    #[cfg(not(feature = "hid"))]
    {
        warn!("built without the `hid` feature; no sensor will be found");
        let (sensor, control) = VirtualSensor::new(Vec::<String>::new());
        control.unplug();
        Ok(Box::new(sensor))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let client = sensor_client(&cli, &cfg)?;
    let supervisor = DeviceSupervisor::new(client, platform_metrics(), &cfg);

    let mut sink: Box<dyn ReportSink> = if cli.json {
        Box::new(JsonSink::new(std::io::stdout()))
    } else {
        Box::new(TextSink::new(std::io::stdout()))
    };

    let mut runner = Runner::new(cfg.tick_interval());
    if cli.once {
        runner = runner.with_tick_limit(1);
    } else if let Some(ticks) = cli.ticks {
        runner = runner.with_tick_limit(ticks);
    }

    info!(
        "supervising sensor every {} ms, reboot after {} ticks",
        cfg.tick_interval_ms, cfg.reboot_threshold
    );
    let ticks = runner.run(&supervisor, sink.as_mut());
    if ticks == 0 {
        warn!("no ticks were run");
    }
    Ok(())
}
