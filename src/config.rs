use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid listen address {0:?}")]
    ListenAddr(String),
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Server settings.
///
/// Sources, lowest precedence first: built-in defaults, the `LISTEN`
/// environment variable or a YAML file, then command-line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the listening socket binds to
    pub listen_addr: String,
    /// Worker threads in the pool
    pub threads: usize,
    /// Pending tasks the pool queue holds before refusing more
    pub max_requests: usize,
    /// Open connections the table holds; further clients are turned away
    pub max_connections: usize,
    /// Tick period in milliseconds; idle connections expire after three ticks
    pub timeslot_ms: u64,
    /// Directory files are served from
    pub doc_root: PathBuf,
    /// Optional YAML file preloading the credential store
    pub users_file: Option<PathBuf>,
    /// Credential handles the login and registration pages share
    pub credential_connections: usize,
    /// How long a form submission waits for a free credential handle
    pub credential_timeout_ms: u64,
    /// Diagnostic logging on or off
    pub log_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9190".to_string(),
            threads: 8,
            max_requests: 10_000,
            max_connections: 65_536,
            timeslot_ms: 5_000,
            doc_root: PathBuf::from("root"),
            users_file: None,
            credential_connections: 8,
            credential_timeout_ms: 500,
            log_enabled: true,
        }
    }
}

impl Config {
    /// Defaults, with the listen address taken from `LISTEN` when set.
    pub fn load() -> Self {
        let mut cfg = Self::default();
        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }
        cfg
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Overrides settings with the flags given on the command line.
    pub fn apply(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(port) = cli.port {
            let mut addr = self.socket_addr()?;
            addr.set_port(port);
            self.listen_addr = addr.to_string();
        }
        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
        if let Some(close_log) = cli.close_log {
            self.log_enabled = close_log == 0;
        }
        if let Some(root) = &cli.root {
            self.doc_root = root.clone();
        }
        if let Some(users) = &cli.users {
            self.users_file = Some(users.clone());
        }
        if let Some(connections) = cli.connections {
            self.credential_connections = connections;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.threads == 0 {
            return Err(ConfigError::Zero("threads"));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::Zero("max_requests"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max_connections"));
        }
        if self.timeslot_ms == 0 {
            return Err(ConfigError::Zero("timeslot_ms"));
        }
        if self.credential_connections == 0 {
            return Err(ConfigError::Zero("credential_connections"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::ListenAddr(self.listen_addr.clone()))
    }

    pub fn timeslot(&self) -> Duration {
        Duration::from_millis(self.timeslot_ms)
    }

    /// How long a connection may stay silent before it is evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.timeslot() * 3
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_timeout_ms)
    }
}
