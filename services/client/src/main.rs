use std::net::SocketAddr;
use std::sync::Arc;

use alarm_core::{ClientRuntimeState, Sensor};
use alarm_host::clock::SystemClock;
use alarm_host::config;
use alarm_host::fakes::{FakeTelephony, RecordingDispatch};
use alarm_host::logger::CsvLogger;
use client::{run_worker, SharedClient, WorkerConfig};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/alarmd/client.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "alarm-client starting");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let requested_client_id = args.next();

    let cfg = match config::load_config_from_path(std::path::Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config '{config_path}': {e}");
            std::process::exit(1);
        }
    };

    let client_count = cfg.clients.len();
    let client_cfg = match requested_client_id {
        Some(id) => cfg.clients.into_iter().find(|c| c.client_id == id),
        None if client_count == 1 => cfg.clients.into_iter().next(),
        None => None,
    };
    let Some(client_cfg) = client_cfg else {
        eprintln!(
            "FATAL: config defines {client_count} client(s); pass the client_id as a second argument"
        );
        std::process::exit(1);
    };

    info!(
        client_id = %client_cfg.client_id,
        sensors = client_cfg.sensors.len(),
        "config loaded"
    );

    let mut state = ClientRuntimeState::new(
        client_cfg.client_id.clone(),
        client_cfg.client_pin.clone().unwrap_or_default(),
        client_cfg.egress_delay,
    );
    for sensor in &client_cfg.sensors {
        let mut s = Sensor::new(sensor.sensor_id.clone(), sensor.disarm_delay);
        if let Some(device) = &sensor.device {
            s = s.with_device(device.clone());
        }
        state.add_sensor(s);
    }
    let shared = Arc::new(SharedClient::new(state));

    let ip_socket = match &client_cfg.server_ip {
        Some(addr) => {
            let server_addr: SocketAddr = addr.parse().unwrap_or_else(|e| {
                eprintln!("FATAL: invalid server_ip '{addr}': {e}");
                std::process::exit(1);
            });
            let sock = tokio::net::UdpSocket::bind(("0.0.0.0", 0)).await.unwrap_or_else(|e| {
                eprintln!("FATAL: failed to bind client UDP socket: {e}");
                std::process::exit(1);
            });
            sock.connect(server_addr).await.unwrap_or_else(|e| {
                eprintln!("FATAL: failed to connect to server {server_addr}: {e}");
                std::process::exit(1);
            });
            info!(server = %server_addr, "IP transport connected");
            Some(Arc::new(sock))
        }
        None => None,
    };

    let clock = SystemClock;
    let telephony = FakeTelephony::new(false);
    let dispatch = RecordingDispatch::new();
    let logger = client_cfg
        .logfile
        .as_deref()
        .map(CsvLogger::new)
        .unwrap_or_else(|| CsvLogger::new("/var/log/alarmd/client-events.csv"));

    let worker_cfg = WorkerConfig {
        ping_interval_secs: client_cfg.ping_interval,
        idle_line_hold_secs: client_cfg.idle_line_hold,
        dial_string: client_cfg.server_dialstr.clone(),
    };

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    run_worker(
        shared,
        ip_socket,
        worker_cfg,
        &clock,
        &telephony,
        &dispatch,
        &logger,
        shutdown_rx,
    )
    .await;
}
