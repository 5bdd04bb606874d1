use std::net::SocketAddr;

use alarm_host::clock::SystemClock;
use alarm_host::config;
use alarm_host::fakes::RecordingDispatch;
use alarm_host::logger::CsvLogger;
use server::registry::ClientRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/alarmd/server.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "alarm-server starting");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let cfg = match config::load_config_from_path(std::path::Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config '{config_path}': {e}");
            std::process::exit(1);
        }
    };
    let Some(server_cfg) = cfg.server else {
        eprintln!("FATAL: config has no [server] section");
        std::process::exit(1);
    };

    info!(
        reporters = server_cfg.reporters.len(),
        bindaddr = %server_cfg.bindaddr,
        bindport = server_cfg.bindport,
        "config loaded"
    );

    let bind_addr: SocketAddr = format!("{}:{}", server_cfg.bindaddr, server_cfg.bindport)
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("FATAL: invalid bind address: {e}");
            std::process::exit(1);
        });
    let socket = tokio::net::UdpSocket::bind(bind_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("FATAL: failed to bind {bind_addr}: {e}");
            std::process::exit(1);
        });
    info!(addr = %bind_addr, "listening for reporter datagrams");

    let registry = ClientRegistry::from_config(&server_cfg);
    let clock = SystemClock;
    let logger = server_cfg
        .logfile
        .as_deref()
        .map(CsvLogger::new)
        .unwrap_or_else(|| CsvLogger::new("/var/log/alarmd/server-events.csv"));
    let dispatch = RecordingDispatch::new();
    let handlers = server_cfg.handlers.clone();
    let ip_loss_tolerance = server_cfg.ip_loss_tolerance;

    let listener = dispatcher::run(&socket, &registry, &clock, &logger, &dispatch, &handlers);
    let housekeeping = housekeeping_loop(&registry, &clock, &logger, &dispatch, ip_loss_tolerance);

    tokio::join!(listener, housekeeping);
}

use server::{dispatcher, housekeeping};

async fn housekeeping_loop<C, L, H>(
    registry: &ClientRegistry,
    clock: &C,
    logger: &L,
    dispatch: &H,
    ip_loss_tolerance: u64,
) where
    C: alarm_host::interfaces::Clock,
    L: alarm_host::interfaces::Logger,
    H: alarm_host::interfaces::HandlerDispatch,
{
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        interval.tick().await;
        housekeeping::tick(registry, clock, logger, dispatch, ip_loss_tolerance).await;
    }
}
