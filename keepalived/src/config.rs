// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The daemon configuration file.
//!
//! ```toml
//! timeout = 300                       # seconds
//! listeners = ["0.0.0.0:9000"]        # port required
//! clients = ["10.0.0.1", "2001:db8::1"]
//! ```
//!
//! Client entries are usually bare addresses; a port, if present, is parsed
//! and then ignored, since authorization compares address bits only.

use keepalive_common::{Endpoint, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use std::net::AddrParseError;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("bad listener address {addr:?}: {source}")]
    BadListener {
        addr: String,
        #[source]
        source: AddrParseError,
    },
    #[error("bad client address {addr:?}: {source}")]
    BadClient {
        addr: String,
        #[source]
        source: AddrParseError,
    },
    #[error("listener {addr:?} needs a port")]
    ListenerWithoutPort { addr: String },
    #[error("timeout must be at least 1 second")]
    ZeroTimeout,
    #[error("at least one listener is required")]
    NoListeners,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_timeout")]
    timeout: u64,
    listeners: Vec<String>,
    #[serde(default)]
    clients: Vec<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Validated configuration, immutable after load.
#[derive(Debug, Clone)]
pub struct Config {
    pub listeners: Vec<Endpoint>,
    pub clients: Vec<Endpoint>,
    pub timeout: Duration,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if raw.listeners.is_empty() {
            return Err(ConfigError::NoListeners);
        }

        let listeners = raw
            .listeners
            .iter()
            .map(|s| {
                let ep: Endpoint = s.parse().map_err(|source| ConfigError::BadListener {
                    addr: s.clone(),
                    source,
                })?;
                if ep.port() == 0 {
                    return Err(ConfigError::ListenerWithoutPort { addr: s.clone() });
                }
                Ok(ep)
            })
            .collect::<Result<Vec<Endpoint>, _>>()?;
        let clients = raw
            .clients
            .iter()
            .map(|s| {
                s.parse().map_err(|source| ConfigError::BadClient {
                    addr: s.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<Endpoint>, _>>()?;

        Ok(Config {
            listeners,
            clients,
            timeout: Duration::from_secs(raw.timeout),
        })
    }
}
