// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Secret used to verify channel auth tokens
    pub jwt_secret: String,
    /// Log level filter used when RUST_LOG is not set
    pub log_level: String,
    /// Directions provider settings
    pub directions: DirectionsSettings,
}

/// External directions provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionsSettings {
    /// Provider API key; empty disables the provider (ETA stays unknown)
    pub api_key: String,
    /// Provider endpoint
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().expect("static addr"),
            jwt_secret: "change-me".to_string(),
            log_level: "info".to_string(),
            directions: DirectionsSettings::default(),
        }
    }
}

impl Default for DirectionsSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com/maps/api/directions/json".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from `rendezvous.toml` and `RENDEZVOUS_*` environment
    /// variables, on top of the defaults. Nested keys use `__` in the
    /// environment (e.g. `RENDEZVOUS_DIRECTIONS__API_KEY`).
    pub fn load() -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("rendezvous.toml"))
            .merge(Env::prefixed("RENDEZVOUS_").split("__"))
            .extract()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 3000);
        assert_eq!(settings.directions.timeout_secs, 30);
        assert!(settings.directions.api_key.is_empty());
    }

    #[test]
    fn load_without_config_file_uses_defaults() {
        let settings = Settings::load().expect("defaults should extract");
        assert_eq!(settings.log_level, "info");
    }
}
