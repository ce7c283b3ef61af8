//! Configuration module for serverwatch.
//!
//! Loads configuration from a TOML file and applies environment overrides.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chart::Rgb;
use crate::history::DEFAULT_SAMPLE_INTERVAL;

/// Default Minecraft server port.
pub const DEFAULT_GAME_PORT: u16 = 25565;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot: DiscordConfig,
    pub http: HttpConfig,
    pub presentation: PresentationConfig,
    pub history: HistoryConfig,
    pub targets: Vec<TargetConfig>,
}

/// Chat platform credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api/v10".to_string(),
        }
    }
}

/// Local query API settings. A port of 0 disables the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Global presentation defaults shared by every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub title: String,
    pub footer: Option<String>,
    pub online_color: Rgb,
    pub offline_color: Rgb,
    pub offline_fallback: String,
    pub motd_fallback: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            title: "Server Status".to_string(),
            footer: None,
            online_color: Rgb(0x2e, 0xcc, 0x71),
            offline_color: Rgb(0xe7, 0x4c, 0x3c),
            offline_fallback: "The server could not be reached.".to_string(),
            motd_fallback: "No message of the day.".to_string(),
        }
    }
}

/// History sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Minimum spacing between two distinct samples.
    pub sample_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL.as_secs(),
        }
    }
}

impl HistoryConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }
}

/// What image, if any, accompanies a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Chart,
    Banner,
    None,
}

/// A monitored game server and its posting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub name: String,
    /// `host` or `host:port`.
    pub address: String,
    /// Destination channel for the status message.
    pub channel_id: String,
    pub update_interval_secs: u64,
    pub display: DisplayMode,
    pub chart_color: Rgb,
    pub history_hours: u32,
    pub banner_url: Option<String>,
    pub show_next_update: bool,
    pub timeout_secs: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            channel_id: String::new(),
            update_interval_secs: 60,
            display: DisplayMode::Chart,
            chart_color: Rgb(0x58, 0x65, 0xf2),
            history_hours: 24,
            banner_url: None,
            show_next_update: true,
            timeout_secs: 5.0,
        }
    }
}

impl TargetConfig {
    /// Split the address into host and port, defaulting the port.
    pub fn endpoint(&self) -> (String, u16) {
        parse_address(&self.address).unwrap_or_else(|_| (self.address.clone(), DEFAULT_GAME_PORT))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_secs > 0.0 {
            Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(DEFAULT_TIMEOUT)
        } else {
            DEFAULT_TIMEOUT
        }
    }

    /// Number of samples that cover `history_hours` at the given spacing.
    pub fn history_capacity(&self, sample_interval: Duration) -> usize {
        let window = u64::from(self.history_hours.max(1)) * 3600;
        let spacing = sample_interval.as_secs().max(1);
        ((window / spacing) as usize).max(1)
    }
}

/// Parse `host`, `host:port` or `[v6]:port`.
pub fn parse_address(address: &str) -> Result<(String, u16), ConfigError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConfigError::Invalid("empty address".to_string()));
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::Invalid(format!("unterminated IPv6 address: {}", address)))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(p, address)?,
            None if tail.is_empty() => DEFAULT_GAME_PORT,
            None => return Err(ConfigError::Invalid(format!("invalid address: {}", address))),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        // A bare IPv6 literal has more than one colon and no port.
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), DEFAULT_GAME_PORT)),
        Some((host, port)) => Ok((host.to_string(), parse_port(port, address)?)),
        None => Ok((address.to_string(), DEFAULT_GAME_PORT)),
    }
}

fn parse_port(port: &str, address: &str) -> Result<u16, ConfigError> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ConfigError::Invalid(format!("invalid port in address: {}", address))),
    }
}

impl BotConfig {
    /// Load configuration from the file named by `SERVERWATCH_CONFIG`
    /// (default: "serverwatch.toml"), then apply environment overrides.
    ///
    /// Environment variables:
    /// - `SERVERWATCH_DISCORD_TOKEN`: bot token
    /// - `SERVERWATCH_HTTP_PORT`: local query API port
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::from_file(config_path())?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = env::var("SERVERWATCH_DISCORD_TOKEN") {
            self.bot.token = token;
        }

        if let Ok(port_str) = env::var("SERVERWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                self.http.port = port;
            }
        }
    }

    /// Check the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let mut channels = HashSet::new();

        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::Invalid("target name cannot be empty".to_string()));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate target name: {}", target.name)));
            }
            if target.channel_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("target {} has no channel_id", target.name)));
            }
            // History and message handles are keyed by channel.
            if !channels.insert(target.channel_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "channel {} is used by more than one target",
                    target.channel_id
                )));
            }
            if target.update_interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target {} has a zero update interval",
                    target.name
                )));
            }
            if target.display == DisplayMode::Banner && target.banner_url.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "target {} uses banner display without banner_url",
                    target.name
                )));
            }
            if !target.timeout_secs.is_finite() || target.timeout_secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::Invalid(format!(
                    "target {} has an invalid timeout_secs: {}",
                    target.name, target.timeout_secs
                )));
            }
            parse_address(&target.address)?;
        }

        Ok(())
    }
}

/// Path of the config file, from `SERVERWATCH_CONFIG` or the default.
pub fn config_path() -> PathBuf {
    env::var("SERVERWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("serverwatch.toml"))
}
