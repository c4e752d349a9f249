// src/main.rs
mod net;

use anyhow::Result;
use flight_comm::commander::VehicleState;
use flight_comm::config::{self, LinkKind};
use flight_comm::link::{ActiveLink, Link, RadioLink, UsbLink};
use flight_comm::{Clock, FlightCore, NoPlanner, SystemClock};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const DIAG_PERIOD: Duration = Duration::from_secs(1);
const MONITOR_PERIOD: Duration = Duration::from_millis(flight_comm::router::queue_monitor::REPORT_INTERVAL_MS);
const STABILIZER_PERIOD: Duration = Duration::from_millis(10);

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env()
        .add_directive("flight_comm=info".parse()?)
        .add_directive("link_protocol=info".parse()?)
        .add_directive("tokio=warn".parse()?);

    match log_dir {
        Some(dir) => {
            let (file, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "flight_comm.log"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(file))
                .with_ansi(false)
                .compact()
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).compact().init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------- config + logging ----------
    let cfg = config::Cli::parse_and_build_config()?;
    let _log_guard = init_tracing(cfg.log_dir.as_deref())?;
    info!(?cfg, "flight comm core starting");

    // -------- core ----------
    let clock = SystemClock::shared();
    let core = FlightCore::start(&cfg.core, clock.clone(), Arc::new(NoPlanner))?;

    // -------- physical link ----------
    let (tx_sock, rx_sock) = net::udp::connect(&cfg)?;
    let radio = match cfg.link {
        LinkKind::Radio => {
            let radio = Arc::new(RadioLink::new(Arc::new(net::udp::UdpSyslink::new(tx_sock)), clock.clone()));
            radio.configure(&cfg.core.radio);
            core.router().set_link(ActiveLink::Radio(radio.clone()));
            net::udp::spawn_radio_rx(rx_sock, radio.clone());
            Some(radio)
        }
        LinkKind::Usb => {
            let usb = Arc::new(UsbLink::new(Arc::new(net::udp::UdpUsbDevice::new(tx_sock))));
            core.router().set_link(ActiveLink::Usb(usb.clone()));
            net::udp::spawn_usb_rx(rx_sock, usb);
            None
        }
    };

    if !core.self_test() {
        warn!("self test failed");
    }
    core.console().puts("flight comm core ready\n");

    // -------- background loops ----------
    // 1) Diagnostics
    {
        let core = core.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(DIAG_PERIOD);
            loop {
                tick.tick().await;
                let rates = core.router().rates();
                let c = core.commander();
                info!(
                    event = "diag",
                    rx_rate = rates.rx_rate,
                    tx_rate = rates.tx_rate,
                    connected = core.router().is_connected(),
                    rssi = radio.as_ref().map(|r| r.rssi()),
                    link_up = radio.as_ref().map(|r| r.is_connected()),
                    priority = c.active_priority().level(),
                    inactivity_ms = c.inactivity_time(),
                    failsafe = ?c.failsafe_state(),
                    app_overflow = core.app_channel().has_overflow_occurred()
                );
            }
        });
    }

    // 2) Queue monitor
    {
        let core = core.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(MONITOR_PERIOD);
            tick.tick().await;
            loop {
                tick.tick().await;
                core.router().queue_monitor().report();
            }
        });
    }

    // 3) Stand-in stabilizer polling the arbiter at 100 Hz
    {
        let core = core.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(STABILIZER_PERIOD);
            loop {
                tick.tick().await;
                let state = VehicleState { timestamp_ms: clock.now_ms(), ..Default::default() };
                let sp = core.commander().get_setpoint(&state);
                trace!(thrust = sp.thrust, mode = ?sp.mode, "setpoint");
            }
        });
    }

    info!("core running. Press Ctrl+C to stop...");

    // -------- graceful shutdown ----------
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received; stopping core");
    tokio::task::spawn_blocking(move || core.shutdown()).await?;
    Ok(())
}
