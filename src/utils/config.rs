//! Runtime configuration shared by the atm, bank and router binaries.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_ENV: &str = "ATM_BANK_CONFIG";

pub const ATM_PORT: u16 = 32000;
pub const ROUTER_PORT: u16 = 32001;
pub const BANK_PORT: u16 = 32002;

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

/// Any field missing from the JSON file keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the ATM binds.
    pub atm_addr: SocketAddr,

    /// Where the router binds. The ATM and Bank both send here.
    pub router_addr: SocketAddr,

    /// Where the Bank binds.
    pub bank_addr: SocketAddr,

    /// Directory holding `<user>.card` files.
    pub card_dir: PathBuf,

    /// How long the ATM waits for each reply.
    pub request_timeout_ms: u64,

    /// Resends after the first attempt before giving up.
    pub max_retries: u32,

    /// Failed logins before a username is locked.
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            atm_addr: localhost(ATM_PORT),
            router_addr: localhost(ROUTER_PORT),
            bank_addr: localhost(BANK_PORT),
            card_dir: PathBuf::from("."),
            request_timeout_ms: 2000,
            max_retries: 2,
            max_attempts: 3,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path first, then `$ATM_BANK_CONFIG`, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.router_addr.port(), ROUTER_PORT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "card_dir": "/var/cards", "request_timeout_ms": 250, "bank_addr": "127.0.0.1:4000" }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.card_dir, PathBuf::from("/var/cards"));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.bank_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.atm_addr, localhost(ATM_PORT));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_attempt": 5 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_attempts": 0 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_retries": 7 }"#).unwrap();
        assert_eq!(Config::resolve(Some(&path)).unwrap().max_retries, 7);
    }
}
