//! Settings loading.
//!
//! Layers, lowest to highest precedence: built-in defaults, the optional TOML
//! file, `OPWATCH_*` environment variables, then command-line flags.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::duration::parse_duration;
use crate::data::ServerInfo;
use crate::error::ConfigError;
use crate::poller::clamp_fetch_timeout;
use crate::supervisor::Timing;

/// Port appended to addresses that do not name one.
pub const DEFAULT_PORT: u16 = 27017;

const DEFAULT_REFRESH: Duration = Duration::from_secs(1);
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Servers used by `--demo` when none are configured.
const DEMO_SERVERS: &[(&str, &str)] = &[
    ("demo-alpha:27017", "alpha"),
    ("demo-beta:27017", "beta"),
    ("demo-gamma:27017", "gamma"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    refresh: Option<String>,
    fetch_timeout: Option<String>,
    action_timeout: Option<String>,
    hide_replication: Option<bool>,
    server: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    address: String,
    label: Option<String>,
    hide_replication: Option<bool>,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub addresses: Vec<String>,
    pub refresh: Option<Duration>,
    pub fetch_timeout: Option<Duration>,
    pub action_timeout: Option<Duration>,
    pub hide_replication: Option<bool>,
    /// Fall back to simulated servers when none are configured.
    pub demo: bool,
}

/// One configured server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSpec {
    pub info: ServerInfo,
    pub hide_replication: bool,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub refresh: Duration,
    /// Always strictly shorter than `refresh`.
    pub fetch_timeout: Duration,
    pub action_timeout: Duration,
    pub servers: Vec<ServerSpec>,
}

impl Settings {
    /// Load settings from an optional file plus environment and overrides.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let raw: FileSettings = builder
            .add_source(Environment::with_prefix("OPWATCH").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Self::resolve(raw, overrides)
    }

    fn resolve(raw: FileSettings, overrides: &Overrides) -> Result<Self, ConfigError> {
        let refresh = pick_duration("refresh", overrides.refresh, raw.refresh.as_deref())?
            .unwrap_or(DEFAULT_REFRESH);
        if refresh.is_zero() {
            return Err(ConfigError::InvalidDuration {
                key: "refresh",
                value: "0".to_string(),
            });
        }

        let fetch_timeout = match pick_duration("fetch_timeout", overrides.fetch_timeout, raw.fetch_timeout.as_deref())? {
            Some(requested) => {
                let clamped = clamp_fetch_timeout(refresh, requested);
                if clamped != requested {
                    tracing::warn!(?requested, ?clamped, "fetch_timeout must be shorter than refresh");
                }
                clamped
            }
            None => clamp_fetch_timeout(refresh, refresh),
        };

        let action_timeout = pick_duration("action_timeout", overrides.action_timeout, raw.action_timeout.as_deref())?
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);

        let hide_default = overrides.hide_replication.or(raw.hide_replication).unwrap_or(false);

        let mut servers: Vec<ServerSpec> = if !raw.server.is_empty() {
            raw.server
                .into_iter()
                .map(|entry| ServerSpec {
                    info: ServerInfo::new(
                        with_default_port(&entry.address),
                        entry.label.unwrap_or_else(|| entry.address.clone()),
                    ),
                    hide_replication: overrides
                        .hide_replication
                        .or(entry.hide_replication)
                        .unwrap_or(hide_default),
                })
                .collect()
        } else {
            overrides
                .addresses
                .iter()
                .map(|address| ServerSpec {
                    info: ServerInfo::new(with_default_port(address), address.clone()),
                    hide_replication: hide_default,
                })
                .collect()
        };

        if servers.is_empty() && overrides.demo {
            servers = DEMO_SERVERS
                .iter()
                .map(|(address, label)| ServerSpec {
                    info: ServerInfo::new(*address, *label),
                    hide_replication: hide_default,
                })
                .collect();
        }
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let mut seen = HashSet::new();
        for spec in &servers {
            if !seen.insert(spec.info.address.as_str()) {
                return Err(ConfigError::DuplicateAddress(spec.info.address.clone()));
            }
        }

        Ok(Self {
            refresh,
            fetch_timeout,
            action_timeout,
            servers,
        })
    }

    pub fn timing(&self) -> Timing {
        Timing {
            refresh: self.refresh,
            fetch_timeout: self.fetch_timeout,
            action_timeout: self.action_timeout,
        }
    }
}

fn pick_duration(
    key: &'static str,
    flag: Option<Duration>,
    file: Option<&str>,
) -> Result<Option<Duration>, ConfigError> {
    if flag.is_some() {
        return Ok(flag);
    }
    file.map(|value| {
        parse_duration(value).map_err(|_| ConfigError::InvalidDuration {
            key,
            value: value.to_string(),
        })
    })
    .transpose()
}

/// Append the default port to a bare host name.
///
/// Full connection URIs and addresses that already carry a port are left
/// untouched.
pub fn with_default_port(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        return address.to_string();
    }
    let has_port = match address.strip_prefix('[') {
        Some(rest) => !rest.ends_with(']'),
        None => address.contains(':'),
    };
    if has_port {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_PORT)
    }
}
