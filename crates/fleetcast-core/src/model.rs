// Configuration model for the dispatch layer
// Wraps the layered application config and derives the explicit dispatch settings from it

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};

use fleetcast_api::model::{
    DEFAULT_BROADCAST_PATH, DEFAULT_DISCONNECT_PATH, DEFAULT_IDENTIFIER_KEY, DEFAULT_MESSAGE_PATH,
    DEFAULT_PROBE_PATH, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SERVERS_SET,
};

/// Prefix of environment variables overriding configuration keys
pub const ENV_PREFIX: &str = "FLEETCAST";

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_STORE_FILE: &str = "conf/presence.yml";
pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Application configuration wrapper
/// Provides typed access to configuration values with their defaults
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Layered builder: optional config file, then `FLEETCAST_*` environment variables.
    ///
    /// Nested keys use `__` in variable names, e.g.
    /// `FLEETCAST_DISPATCH__MESSAGE_PATH` overrides `dispatch.message_path`.
    pub fn builder(file: &str) -> ConfigBuilder<DefaultState> {
        Config::builder()
            .add_source(File::new(file, FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
    }

    /// Load the configuration from `file` and the environment
    pub fn load(file: &str) -> Result<Self, config::ConfigError> {
        Ok(Self::from_config(Self::builder(file).build()?))
    }

    // ===================== Server Configuration =====================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ===================== Dispatch Configuration =====================

    pub fn message_path(&self) -> String {
        self.path_or("dispatch.message_path", DEFAULT_MESSAGE_PATH)
    }

    pub fn disconnect_path(&self) -> String {
        self.path_or("dispatch.disconnect_path", DEFAULT_DISCONNECT_PATH)
    }

    pub fn broadcast_path(&self) -> String {
        self.path_or("dispatch.broadcast_path", DEFAULT_BROADCAST_PATH)
    }

    pub fn probe_path(&self) -> String {
        self.path_or("dispatch.probe_path", DEFAULT_PROBE_PATH)
    }

    /// Per-call network timeout in milliseconds (default: 15000ms).
    /// Zero or negative values are treated as unset.
    pub fn request_timeout_ms(&self) -> u64 {
        self.config
            .get_int("dispatch.request_timeout_ms")
            .ok()
            .filter(|ms| *ms > 0)
            .map(|ms| ms as u64)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
    }

    /// Field name carrying the client identifier (default: "uid")
    pub fn identifier_key(&self) -> String {
        self.config
            .get_string("dispatch.identifier_key")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IDENTIFIER_KEY.to_string())
    }

    pub fn queue_capacity(&self) -> usize {
        self.config
            .get_int("dispatch.queue_capacity")
            .ok()
            .filter(|capacity| *capacity > 0)
            .map(|capacity| capacity as usize)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    // ===================== Presence Store Configuration =====================

    pub fn servers_set(&self) -> String {
        self.config
            .get_string("presence.servers_set")
            .unwrap_or_else(|_| DEFAULT_SERVERS_SET.to_string())
    }

    pub fn client_key_prefix(&self) -> String {
        self.config
            .get_string("presence.client_key_prefix")
            .unwrap_or_default()
    }

    pub fn store_file(&self) -> String {
        self.config
            .get_string("presence.store_file")
            .unwrap_or_else(|_| DEFAULT_STORE_FILE.to_string())
    }

    fn path_or(&self, key: &str, default: &str) -> String {
        self.config
            .get_string(key)
            .unwrap_or_else(|_| default.to_string())
    }
}

/// Explicit dispatch settings, built once at startup and passed by value
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    pub message_path: String,
    pub disconnect_path: String,
    pub broadcast_path: String,
    pub probe_path: String,
    /// Bound applied to every call made to a sibling node
    pub request_timeout: Duration,
    pub identifier_key: String,
    /// Presence store set listing the fleet's node descriptors
    pub servers_set: String,
    /// Prepended to a client identifier to form its binding key
    pub client_key_prefix: String,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
            disconnect_path: DEFAULT_DISCONNECT_PATH.to_string(),
            broadcast_path: DEFAULT_BROADCAST_PATH.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            identifier_key: DEFAULT_IDENTIFIER_KEY.to_string(),
            servers_set: DEFAULT_SERVERS_SET.to_string(),
            client_key_prefix: String::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatchConfig {
    /// Create a DispatchConfig from application Configuration
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            message_path: config.message_path(),
            disconnect_path: config.disconnect_path(),
            broadcast_path: config.broadcast_path(),
            probe_path: config.probe_path(),
            request_timeout: Duration::from_millis(config.request_timeout_ms()),
            identifier_key: config.identifier_key(),
            servers_set: config.servers_set(),
            client_key_prefix: config.client_key_prefix(),
            queue_capacity: config.queue_capacity(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(pairs: &[(&str, &str)]) -> Configuration {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Configuration::from_config(builder.build().unwrap())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = DispatchConfig::from_configuration(&Configuration::default());
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.message_path, "/sendMessage");
        assert_eq!(config.disconnect_path, "/disconnect");
        assert_eq!(config.broadcast_path, "/broadcast");
        assert_eq!(config.probe_path, "/probe");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.identifier_key, "uid");
        assert_eq!(config.servers_set, "SERVERS");
    }

    #[test]
    fn test_overrides() {
        let configuration = test_config(&[
            ("dispatch.message_path", "/ws/message"),
            ("dispatch.broadcast_path", "/ws/all"),
            ("dispatch.request_timeout_ms", "2500"),
            ("dispatch.identifier_key", "sub"),
            ("presence.servers_set", "NODES"),
            ("presence.client_key_prefix", "client:"),
            ("server.port", "8080"),
        ]);
        let config = DispatchConfig::from_configuration(&configuration);

        assert_eq!(config.message_path, "/ws/message");
        assert_eq!(config.disconnect_path, "/disconnect");
        assert_eq!(config.broadcast_path, "/ws/all");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.identifier_key, "sub");
        assert_eq!(config.servers_set, "NODES");
        assert_eq!(config.client_key_prefix, "client:");
        assert_eq!(configuration.server_port(), 8080);
    }

    #[test]
    fn test_non_positive_timeout_falls_back_to_default() {
        let configuration = test_config(&[("dispatch.request_timeout_ms", "0")]);
        assert_eq!(configuration.request_timeout_ms(), 15000);
    }

    #[test]
    fn test_blank_identifier_key_falls_back_to_default() {
        let configuration = test_config(&[("dispatch.identifier_key", "  ")]);
        assert_eq!(configuration.identifier_key(), "uid");
    }

    #[test]
    fn test_load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.yml");
        std::fs::write(
            &path,
            "dispatch:\n  disconnect_path: /kick\n  queue_capacity: 16\n",
        )
        .unwrap();

        let configuration = Configuration::load(path.to_str().unwrap()).unwrap();
        assert_eq!(configuration.disconnect_path(), "/kick");
        assert_eq!(configuration.queue_capacity(), 16);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let configuration = Configuration::load("does/not/exist.yml").unwrap();
        assert_eq!(configuration.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.store_file(), DEFAULT_STORE_FILE);
    }
}
