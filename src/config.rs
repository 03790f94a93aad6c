use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    ///
    /// gRPC listen address for `ManagerService`.
    ///
    #[serde(default = "Server::listen")]
    pub listen: SocketAddr,
    ///
    /// Worker thread count for the Manager's Tokio runtime.
    ///
    #[serde(default = "Server::worker_threads")]
    pub worker_threads: usize,
}

impl Server {
    fn listen() -> SocketAddr {
        "0.0.0.0:50051".parse().unwrap()
    }

    fn worker_threads() -> usize {
        16
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            worker_threads: Self::worker_threads(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Liveness {
    ///
    /// How often the Manager probes every registered storage node.
    ///
    #[serde(default = "Liveness::probe_period_secs")]
    pub probe_period_secs: u64,
    ///
    /// Per-probe timeout before a node is treated as unreachable.
    ///
    #[serde(default = "Liveness::probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Liveness {
    fn probe_period_secs() -> u64 {
        5
    }

    fn probe_timeout_secs() -> u64 {
        1
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_secs(self.probe_period_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            probe_period_secs: Self::probe_period_secs(),
            probe_timeout_secs: Self::probe_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Mutation {
    ///
    /// Per-peer timeout applied to every prepare/commit/abort RPC and to
    /// read reconciliation fan-out.
    ///
    #[serde(default = "Mutation::peer_timeout_secs")]
    pub peer_timeout_secs: u64,
}

impl Mutation {
    fn peer_timeout_secs() -> u64 {
        2
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

impl Default for Mutation {
    fn default() -> Self {
        Self {
            peer_timeout_secs: Self::peer_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub liveness: Liveness,
    #[serde(default)]
    pub mutation: Mutation,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: kv-manager --config /etc/kv-manager/config.toml
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configuration from the path given on the command line, or fall
    /// back to built-in defaults if `--config` was not passed.
    ///
    pub fn load() -> Result<Self> {
        match Cli::parse().config {
            Some(path) => Ok(toml::from_str(&read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }
}
