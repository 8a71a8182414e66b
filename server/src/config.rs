use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags. Unset flags leave lower layers untouched.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, Default)]
#[command(name = "proctor-relay", version, about = "Proctoring stream signaling relay")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./proctor-relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Path to TOML config file
    pub config: String,

    /// Enable structured JSON logging
    pub json_logs: bool,

    /// Print a commented TOML config template and exit
    pub generate_config: bool,

    /// Socket keepalive settings (loaded from [keepalive] section in TOML)
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
}

/// WebSocket ping/pong keepalive. A peer that stops answering pings is
/// treated as disconnected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl KeepaliveConfig {
    /// Clamped to one second minimum.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4001,
            bind_address: "0.0.0.0".to_string(),
            config: "./proctor-relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PROCTOR_RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    /// Layer the providers under already-parsed CLI args.
    pub fn figment(cli: Cli) -> Figment {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PROCTOR_RELAY_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Proctor Relay Configuration
# Place this file at ./proctor-relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (PROCTOR_RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4001)
# port = 4001

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Socket Keepalive ----
# [keepalive]

# Seconds between server pings (default: 30)
# ping_interval_secs = 30

# Seconds to wait for a pong before closing the socket (default: 10)
# pong_timeout_secs = 10
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_valid_toml_when_uncommented() {
        let uncommented: String = generate_config_template()
            .lines()
            .filter_map(|line| line.strip_prefix("# "))
            .filter(|line| {
                line.starts_with('[')
                    || line.starts_with("port")
                    || line.starts_with("bind_address")
                    || line.starts_with("json_logs")
                    || line.starts_with("ping_interval_secs")
                    || line.starts_with("pong_timeout_secs")
            })
            .map(|line| format!("{}\n", line))
            .collect();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&uncommented))
            .extract()
            .unwrap();
        assert_eq!(config.port, 4001);
        assert_eq!(config.keepalive, KeepaliveConfig::default());
    }

    #[test]
    fn test_toml_overrides_keepalive() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                "port = 9000\n[keepalive]\nping_interval_secs = 5\n",
            ))
            .extract()
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.keepalive.ping_interval(), Duration::from_secs(5));
        assert_eq!(config.keepalive.pong_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_only_set_cli_flags_override() {
        let cli = Cli {
            port: Some(7000),
            config: "./does-not-exist.toml".to_string(),
            ..Cli::default()
        };
        let config: Config = Config::figment(cli).extract().unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert!(!config.generate_config);
    }
}
