// Proxy configuration, loaded from a TOML file.
//
// `Config::load_or_create` reads the file at the given path, writing a
// default one first if it does not exist, then validates the result. Every
// section and field has a default, so a partial file only needs the values it
// changes. Integrations (moderation API, region database, webhooks) are
// disabled while their host or webhook fields are empty.
//
// Sections:
// - `[connection]`:   listen address and upstream server address.
// - `[server]`:       admission, view distance, timeouts, packet trace.
// - `[world_border]`: rectangle outside which block interaction is refused.
// - `[api]`:          moderation API and profile lookup keys.
// - `[database]`:     region (claim) source and its refresh interval.
// - `[logging]`:      webhook sinks.
// - `[commands]`:     custom command trigger prefix and addon secret.
// - `[storage]`:      allow-list and playerlist file paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode default config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub server: ServerConfig,
    pub world_border: WorldBorderConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub commands: CommandsConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub proxy_address: String,
    pub remote_address: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            proxy_address: "0.0.0.0:19132".into(),
            remote_address: "127.0.0.1:19134".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Slots reserved for allow-listed players.
    pub secured_slots: u32,
    pub view_distance: i32,
    /// Only allow-listed players may join.
    pub whitelist: bool,
    /// Short server tag used in webhook usernames.
    pub prefix: String,
    /// Wait between failed liveness probes before restarting the listener.
    pub probe_backoff_secs: u64,
    pub probe_timeout_ms: u64,
    pub login_timeout_secs: u64,
    /// Upper bound on each side of the spawn handshake.
    pub handshake_timeout_secs: u64,
    pub dial_attempts: u32,
    pub dial_delay_ms: u64,
    /// Grace period after flushing open-container items on disconnect.
    pub disconnect_grace_ms: u64,
    pub packet_trace: PacketTraceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            secured_slots: 5,
            view_distance: 10,
            whitelist: true,
            prefix: "VANILLA".into(),
            probe_backoff_secs: 5,
            probe_timeout_ms: 2000,
            login_timeout_secs: 5,
            handshake_timeout_secs: 30,
            dial_attempts: 5,
            dial_delay_ms: 1000,
            disconnect_grace_ms: 4000,
            packet_trace: PacketTraceConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn probe_backoff(&self) -> Duration {
        Duration::from_secs(self.probe_backoff_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn dial_delay(&self) -> Duration {
        Duration::from_millis(self.dial_delay_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    #[default]
    Off,
    /// Every packet.
    All,
    /// Every packet whose id is not in `ignored`.
    NotIgnored,
    /// Only packets whose id is in `targets`.
    Target,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketTraceConfig {
    pub level: TraceLevel,
    pub ignored: Vec<u32>,
    pub targets: Vec<u32>,
}

impl Default for PacketTraceConfig {
    fn default() -> Self {
        use hearth_protocol::packet::id;
        Self {
            level: TraceLevel::Off,
            ignored: vec![id::PLAYER_AUTH_INPUT, id::INVENTORY_CONTENT, id::AVAILABLE_COMMANDS],
            targets: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldBorderConfig {
    pub enabled: bool,
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl Default for WorldBorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_x: -12000,
            max_x: 12000,
            min_z: -12000,
            max_z: 12000,
        }
    }
}

impl WorldBorderConfig {
    /// Whether the column at `(x, z)` lies inside the border (inclusive).
    pub fn contains_xz(&self, x: i32, z: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_key: String,
    pub xbox_api_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub key: String,
    pub name: String,
    pub refresh_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            key: String::new(),
            name: String::new(),
            refresh_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub discord_logging_enabled: bool,
    pub command_logs_webhook: String,
    pub chat_logs_webhook: String,
    pub staff_alerts_webhook: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub trigger_prefix: String,
    /// Key for the obfuscated xuid announcement sent to the server addon.
    pub addon_secret: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            trigger_prefix: hearth_commands::COMMANDS_TRIGGER_PREFIX.into(),
            addon_secret: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub allowlist_path: PathBuf,
    pub playerlist_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            allowlist_path: "allowlist.json".into(),
            playerlist_path: "playerlist.json".into(),
        }
    }
}

impl Config {
    /// Load the config at `path`, writing the defaults there first if the
    /// file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "config not found, writing defaults");
            let encoded = toml::to_string_pretty(&Config::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(path, encoded).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.connection.proxy_address.is_empty() {
            return invalid("connection.proxy_address is not set");
        }
        if self.connection.remote_address.is_empty() {
            return invalid("connection.remote_address is not set");
        }
        if self.server.view_distance <= 0 {
            return invalid("server.view_distance must be greater than 0");
        }
        if self.server.dial_attempts == 0 {
            return invalid("server.dial_attempts must be greater than 0");
        }
        let border = &self.world_border;
        if border.min_x >= border.max_x || border.min_z >= border.max_z {
            return invalid("world_border minimums must be below maximums");
        }
        if !self.api.api_host.is_empty() && self.api.api_key.is_empty() {
            return invalid("api.api_key is required when api.api_host is set");
        }
        if !self.database.host.is_empty() {
            if self.database.key.is_empty() || self.database.name.is_empty() {
                return invalid("database.key and database.name are required when database.host is set");
            }
            if self.database.refresh_secs == 0 {
                return invalid("database.refresh_secs must be greater than 0");
            }
        }
        if self.logging.discord_logging_enabled
            && (self.logging.command_logs_webhook.is_empty()
                || self.logging.chat_logs_webhook.is_empty()
                || self.logging.staff_alerts_webhook.is_empty())
        {
            return invalid("all webhooks must be set when discord logging is enabled");
        }
        if self.commands.trigger_prefix.is_empty() {
            return invalid("commands.trigger_prefix must not be empty");
        }
        Ok(())
    }
}
