//! TOML configuration loading (§6.2/§3.3). Mirrors the teacher's
//! raw/validated split: a `Raw*` tree with every field `Option`, validated
//! into a non-`Option` tree with defaults applied and identifiers checked
//! against the telenumeric alphabet.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

const DEFAULT_PING_INTERVAL: u64 = 5;
const DEFAULT_EGRESS_DELAY: u64 = 30;
const DEFAULT_IDLE_LINE_HOLD: u64 = 30;
const DEFAULT_DISARM_DELAY: u32 = 60;
const DEFAULT_BINDPORT: u16 = 4589;

// ---------------------------------------------------------------------------
// Validated config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub clients: Vec<ClientConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bindport: u16,
    pub bindaddr: String,
    pub ip_loss_tolerance: u64,
    pub logfile: Option<String>,
    pub handlers: HashMap<String, String>,
    pub reporters: Vec<ReporterConfig>,
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub client_id: String,
    pub pin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_pin: Option<String>,
    pub server_ip: Option<String>,
    pub server_dialstr: Option<String>,
    pub ping_interval: u64,
    pub egress_delay: u64,
    pub idle_line_hold: u64,
    pub logfile: Option<String>,
    pub handlers: HashMap<String, String>,
    pub sensors: Vec<SensorConfig>,
    pub keypad: Option<KeypadConfig>,
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub sensor_id: String,
    pub device: Option<String>,
    pub disarm_delay: u32,
}

#[derive(Debug, Clone)]
pub struct KeypadConfig {
    pub keypad_device: Option<String>,
    pub pins: Vec<String>,
    pub prompt_audio: Option<String>,
    pub caller_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    server: Option<RawServerConfig>,
    #[serde(default, rename = "client")]
    clients: Vec<RawClientConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServerConfig {
    bindport: Option<u16>,
    bindaddr: Option<String>,
    ip_loss_tolerance: Option<u64>,
    logfile: Option<String>,
    #[serde(default)]
    handlers: HashMap<String, String>,
    #[serde(default, rename = "reporters")]
    reporters: Vec<RawReporterConfig>,
}

#[derive(Debug, Deserialize)]
struct RawReporterConfig {
    client_id: Option<String>,
    pin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClientConfig {
    client_id: Option<String>,
    client_pin: Option<String>,
    server_ip: Option<String>,
    server_dialstr: Option<String>,
    ping_interval: Option<u64>,
    egress_delay: Option<u64>,
    idle_line_hold: Option<u64>,
    logfile: Option<String>,
    #[serde(default)]
    handlers: HashMap<String, String>,
    #[serde(default, rename = "sensor")]
    sensors: Vec<RawSensorConfig>,
    keypad: Option<RawKeypadConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSensorConfig {
    sensor_id: Option<String>,
    device: Option<String>,
    disarm_delay: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawKeypadConfig {
    keypad_device: Option<String>,
    pins: Option<String>,
    prompt_audio: Option<String>,
    caller_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let server = match raw.server {
        Some(s) => Some(validate_server(s)?),
        None => None,
    };

    let mut clients = Vec::with_capacity(raw.clients.len());
    for (i, c) in raw.clients.into_iter().enumerate() {
        clients.push(validate_client(c, i)?);
    }

    Ok(Config { server, clients })
}

fn validate_server(raw: RawServerConfig) -> Result<ServerConfig, ConfigError> {
    let bindport = raw.bindport.unwrap_or(DEFAULT_BINDPORT);
    let bindaddr = raw.bindaddr.unwrap_or_else(|| "0.0.0.0".to_owned());
    let ip_loss_tolerance = raw
        .ip_loss_tolerance
        .unwrap_or(2 * DEFAULT_PING_INTERVAL);

    let mut reporters = Vec::with_capacity(raw.reporters.len());
    for (i, r) in raw.reporters.into_iter().enumerate() {
        let client_id = r
            .client_id
            .ok_or_else(|| ConfigError::MissingField(format!("server.reporters[{i}].client_id")))?;
        validate_telenumeric(&client_id, &format!("server.reporters[{i}].client_id"))?;
        if let Some(pin) = &r.pin {
            validate_telenumeric(pin, &format!("server.reporters[{i}].pin"))?;
        }
        reporters.push(ReporterConfig {
            client_id,
            pin: r.pin,
        });
    }

    Ok(ServerConfig {
        bindport,
        bindaddr,
        ip_loss_tolerance,
        logfile: raw.logfile,
        handlers: raw.handlers,
        reporters,
    })
}

fn validate_client(raw: RawClientConfig, index: usize) -> Result<ClientConfig, ConfigError> {
    let client_id = raw
        .client_id
        .ok_or_else(|| ConfigError::MissingField(format!("client[{index}].client_id")))?;
    validate_telenumeric(&client_id, &format!("client[{index}].client_id"))?;
    if let Some(pin) = &raw.client_pin {
        validate_telenumeric(pin, &format!("client[{index}].client_pin"))?;
    }

    let mut sensors = Vec::with_capacity(raw.sensors.len());
    for (i, s) in raw.sensors.into_iter().enumerate() {
        let sensor_id = s.sensor_id.ok_or_else(|| {
            ConfigError::MissingField(format!("client[{index}].sensor[{i}].sensor_id"))
        })?;
        validate_telenumeric(
            &sensor_id,
            &format!("client[{index}].sensor[{i}].sensor_id"),
        )?;
        sensors.push(SensorConfig {
            sensor_id,
            device: s.device,
            disarm_delay: s.disarm_delay.unwrap_or(DEFAULT_DISARM_DELAY),
        });
    }

    let keypad = match raw.keypad {
        Some(k) => Some(KeypadConfig {
            keypad_device: k.keypad_device,
            pins: k
                .pins
                .map(|s| s.split(',').map(|p| p.trim().to_owned()).collect())
                .unwrap_or_default(),
            prompt_audio: k.prompt_audio,
            caller_id: k.caller_id,
        }),
        None => None,
    };

    Ok(ClientConfig {
        client_id,
        client_pin: raw.client_pin,
        server_ip: raw.server_ip,
        server_dialstr: raw.server_dialstr,
        ping_interval: raw.ping_interval.unwrap_or(DEFAULT_PING_INTERVAL),
        egress_delay: raw.egress_delay.unwrap_or(DEFAULT_EGRESS_DELAY),
        idle_line_hold: raw.idle_line_hold.unwrap_or(DEFAULT_IDLE_LINE_HOLD),
        logfile: raw.logfile,
        handlers: raw.handlers,
        sensors,
        keypad,
    })
}

/// `[0-9A-D]`, per GLOSSARY "Telenumeric".
fn validate_telenumeric(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='D').contains(&c))
    {
        return Err(ConfigError::InvalidValue(format!(
            "{field} must be non-empty telenumeric (0-9, A-D), got '{value}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
