//! # Runtime Configuration
//!
//! Defaults, a TOML file and environment overrides, applied in that order.
//!
//! ## Config File Format
//!
//! ```toml
//! tick_ms = 10
//!
//! [fbts]
//! port = 5555
//! bind_ip = "0.0.0.0"
//! recv_timeout_ms = 200
//!
//! [[ms]]
//! name = "1"
//! layer2_socket = "/tmp/osmocom_l2"
//! sap_socket = "/tmp/osmocom_sap"
//! sim = "test"
//! imei = "000000000000000"
//! imei_random = false
//! channel_capability = "tch"
//! fbts_port = 5555
//!
//! [ms.test_card]
//! rplmn_mcc = 1
//! rplmn_mnc = 1
//! lac = 0
//! tmsi = 0xffffffff
//! imsi_attached = false
//! ```
//!
//! ## Environment
//!
//! `MS_FBTS_PORT`, `MS_FBTS_IP` and `MS_TICK_MS` override the file.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ms_01_lifecycle::domain::DEFAULT_FBTS_PORT;
use ms_01_lifecycle::{ChannelCapability, MsSettings, SimType, TestCardSettings};
use ms_02_fbts_ingest::{IngestConfig, DEFAULT_RECV_TIMEOUT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the station created when none is configured.
pub const DEFAULT_STATION_NAME: &str = "1";

/// Default main-loop tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// FBTS socket settings.
    pub fbts: FbtsConfig,
    /// Configured stations, in file order.
    pub stations: Vec<StationConfig>,
    /// Main-loop tick.
    pub tick: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fbts: FbtsConfig::default(),
            stations: Vec::new(),
            tick: DEFAULT_TICK,
        }
    }
}

/// FBTS socket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FbtsConfig {
    /// Port used by stations without their own `fbts_port`.
    pub port: u16,
    /// Bind address.
    pub bind_ip: IpAddr,
    /// Receive timeout of the ingest threads.
    pub recv_timeout: Duration,
}

impl Default for FbtsConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_FBTS_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

impl FbtsConfig {
    /// Socket settings for the ingest threads.
    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            bind_ip: self.bind_ip,
            recv_timeout: self.recv_timeout,
        }
    }
}

/// One configured station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub name: String,
    pub settings: MsSettings,
    /// Per-station port; the `[fbts]` port otherwise.
    pub fbts_port: Option<u16>,
}

impl StationConfig {
    /// Station with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: MsSettings::default(),
            fbts_port: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        info!(?path, stations = config.stations.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error on invalid TOML, unknown enum values, malformed IMEIs
    /// or duplicate station names.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;

        let defaults = FbtsConfig::default();
        let fbts = FbtsConfig {
            port: file.fbts.port.unwrap_or(defaults.port),
            bind_ip: file.fbts.bind_ip.unwrap_or(defaults.bind_ip),
            recv_timeout: file
                .fbts
                .recv_timeout_ms
                .map_or(defaults.recv_timeout, Duration::from_millis),
        };

        let mut names = HashSet::new();
        let mut stations = Vec::with_capacity(file.ms.len());
        for section in file.ms {
            if !names.insert(section.name.clone()) {
                return Err(invalid("ms.name", format!("duplicate station '{}'", section.name)));
            }
            stations.push(section.into_station()?);
        }

        Ok(Self {
            fbts,
            stations,
            tick: file.tick_ms.map_or(DEFAULT_TICK, Duration::from_millis),
        })
    }

    /// Apply `MS_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("MS_FBTS_PORT") {
            match value.parse() {
                Ok(port) => self.fbts.port = port,
                Err(_) => warn!(%value, "MS_FBTS_PORT is not a port number, ignored"),
            }
        }
        if let Some(value) = lookup("MS_FBTS_IP") {
            match value.parse() {
                Ok(ip) => self.fbts.bind_ip = ip,
                Err(_) => warn!(%value, "MS_FBTS_IP is not an IP address, ignored"),
            }
        }
        if let Some(value) = lookup("MS_TICK_MS") {
            match value.parse() {
                Ok(ms) => self.tick = Duration::from_millis(ms),
                Err(_) => warn!(%value, "MS_TICK_MS is not a number, ignored"),
            }
        }
    }

    /// Stations to create at start: the configured ones, or a single
    /// default station named `1`.
    #[must_use]
    pub fn stations_or_default(&self) -> Vec<StationConfig> {
        if self.stations.is_empty() {
            vec![StationConfig::new(DEFAULT_STATION_NAME)]
        } else {
            self.stations.clone()
        }
    }

    /// Final settings of a station, with the FBTS port resolved.
    #[must_use]
    pub fn settings_for(&self, station: &StationConfig) -> MsSettings {
        MsSettings {
            fbts_port: station.fbts_port.unwrap_or(self.fbts.port),
            ..station.settings.clone()
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    fbts: FbtsSection,
    #[serde(default)]
    ms: Vec<MsSection>,
    tick_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FbtsSection {
    port: Option<u16>,
    bind_ip: Option<IpAddr>,
    recv_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MsSection {
    name: String,
    layer2_socket: Option<PathBuf>,
    sap_socket: Option<PathBuf>,
    sim: Option<String>,
    imei: Option<String>,
    imei_random: Option<bool>,
    channel_capability: Option<String>,
    fbts_port: Option<u16>,
    #[serde(default)]
    test_card: TestCardSection,
}

#[derive(Debug, Deserialize, Default)]
struct TestCardSection {
    rplmn_mcc: Option<u16>,
    rplmn_mnc: Option<u16>,
    lac: Option<u16>,
    tmsi: Option<u32>,
    imsi_attached: Option<bool>,
}

impl MsSection {
    fn into_station(self) -> Result<StationConfig, ConfigError> {
        let d = MsSettings::default();
        let sim = match self.sim {
            Some(s) => s.parse::<SimType>().map_err(|e| invalid("ms.sim", e))?,
            None => d.sim,
        };
        let channel_capability = match self.channel_capability {
            Some(s) => s
                .parse::<ChannelCapability>()
                .map_err(|e| invalid("ms.channel_capability", e))?,
            None => d.channel_capability,
        };
        let imei = self.imei.unwrap_or(d.imei);
        if imei.len() != 15 || !imei.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("ms.imei", format!("'{imei}' is not 15 digits")));
        }

        let tc = self.test_card;
        let td = TestCardSettings::default();
        let settings = MsSettings {
            layer2_socket_path: self.layer2_socket.unwrap_or(d.layer2_socket_path),
            sap_socket_path: self.sap_socket.unwrap_or(d.sap_socket_path),
            sim,
            test_card: TestCardSettings {
                rplmn_mcc: tc.rplmn_mcc.unwrap_or(td.rplmn_mcc),
                rplmn_mnc: tc.rplmn_mnc.unwrap_or(td.rplmn_mnc),
                lac: tc.lac.unwrap_or(td.lac),
                tmsi: tc.tmsi.unwrap_or(td.tmsi),
                imsi_attached: tc.imsi_attached.unwrap_or(td.imsi_attached),
            },
            imei,
            imei_random: self.imei_random.unwrap_or(d.imei_random),
            channel_capability,
            fbts_port: d.fbts_port,
        };

        Ok(StationConfig {
            name: self.name,
            settings,
            fbts_port: self.fbts_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        let stations = config.stations_or_default();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "1");
    }

    #[test]
    fn test_full_station_section() {
        let config = AppConfig::parse(
            r#"
            [fbts]
            port = 6000
            recv_timeout_ms = 50

            [[ms]]
            name = "a"
            layer2_socket = "/tmp/l2_a"
            sim = "test"
            channel_capability = "sdcch"
            imei = "490154203237518"

            [ms.test_card]
            rplmn_mcc = 262
            rplmn_mnc = 42
            tmsi = 0x01020304
            imsi_attached = true

            [[ms]]
            name = "b"
            fbts_port = 6001
            "#,
        )
        .unwrap();

        assert_eq!(config.fbts.port, 6000);
        assert_eq!(config.fbts.recv_timeout, Duration::from_millis(50));

        let a = &config.stations[0];
        assert_eq!(a.settings.sim, SimType::Test);
        assert_eq!(a.settings.channel_capability, ChannelCapability::Sdcch);
        assert_eq!(a.settings.test_card.rplmn_mcc, 262);
        assert_eq!(a.settings.test_card.tmsi, 0x0102_0304);
        assert!(a.settings.test_card.imsi_attached);
        assert_eq!(a.settings.sap_socket_path, PathBuf::from("/tmp/osmocom_sap"));
        assert_eq!(config.settings_for(a).fbts_port, 6000);

        let b = &config.stations[1];
        assert_eq!(config.settings_for(b).fbts_port, 6001);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AppConfig::parse("[[ms]]\nname = \"x\"\nsim = \"usim\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            AppConfig::parse("[[ms]]\nname = \"x\"\nimei = \"123\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            AppConfig::parse("[[ms]]\nname = \"x\"\n[[ms]]\nname = \"x\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            AppConfig::parse("[fbts]\nport = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MS_FBTS_PORT", "7000"),
            ("MS_FBTS_IP", "127.0.0.1"),
            ("MS_TICK_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.fbts.port, 7000);
        assert_eq!(config.fbts.bind_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.tick, DEFAULT_TICK);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("/nonexistent/mobile.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
