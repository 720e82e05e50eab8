use core::fmt::{Debug, Display};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "hostel.toml";
pub const ENV_PREFIX: &str = "HOSTEL_";

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// When absent the server keeps everything in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Seed the in-memory store with a few rooms and accounts.
    #[serde(default)]
    pub demo_data: bool,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
    /// Secret shared with the login gateway to sign the profile cookie, at least 64 bytes.
    #[serde(default)]
    pub cookie_key: Option<String>,
}

const fn default_listen() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 3000))
}

const fn default_run_migrations() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_url: None,
            demo_data: false,
            run_migrations: default_run_migrations(),
            cookie_key: None,
        }
    }
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[must_use]
pub fn figment() -> Figment {
    Figment::new()
        .merge(Toml::file(CONFIG_FILE))
        .merge(Env::prefixed(ENV_PREFIX))
}

pub fn get_config() -> Result<Config, ConfigError> {
    Ok(figment().extract()?)
}
