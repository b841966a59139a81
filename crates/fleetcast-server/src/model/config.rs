//! Command line handling and configuration loading for the gateway

use clap::Parser;
use config::ConfigError;

use fleetcast_core::model::{Configuration, DEFAULT_CONFIG_FILE};

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "fleetcast-server", version, about)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    /// Listen port, overrides `server.port`
    #[arg(short = 'p', long = "port", env = "FLEETCAST_PORT")]
    pub port: Option<u16>,
    /// Presence registry file, overrides `presence.store_file`
    #[arg(long = "store-file")]
    pub store_file: Option<String>,
}

impl Cli {
    /// Build the layered configuration: file, environment, then these flags
    pub fn configuration(&self) -> Result<Configuration, ConfigError> {
        let mut builder = Configuration::builder(&self.config);

        if let Some(port) = self.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(store_file) = &self.store_file {
            builder = builder.set_override("presence.store_file", store_file.as_str())?;
        }

        Ok(Configuration::from_config(builder.build()?))
    }
}
