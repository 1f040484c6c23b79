//! Daemon endpoint and client configuration
//!
//! Settings are resolved from command line flags first, then environment
//! variables, then the config file under `~/.dockside/`.

use crate::{DocksideError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::{Host, Url};

/// Default daemon socket
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

/// Default API version used in request paths
pub const DEFAULT_API_VERSION: &str = "1.24";

/// Default port for `tcp://` hosts without one
pub const DEFAULT_TCP_PORT: u16 = 2375;

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Where the daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse a host string such as `unix:///var/run/docker.sock`,
    /// `tcp://127.0.0.1:2375` or `tcp://[::1]:2375`
    pub fn parse(host: &str) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(DocksideError::InvalidHost("empty host".to_string()));
        }
        let invalid = || DocksideError::InvalidHost(host.to_string());

        let url = Url::parse(host).map_err(|_| invalid())?;
        match url.scheme() {
            "unix" => {
                if url.host_str().is_some_and(|h| !h.is_empty()) || url.path().is_empty() || url.path() == "/" {
                    return Err(invalid());
                }
                Ok(Self::Unix(PathBuf::from(url.path())))
            }
            "tcp" | "http" => {
                let name = match url.host().ok_or_else(invalid)? {
                    Host::Domain(name) if !name.is_empty() => name.to_string(),
                    Host::Domain(_) => return Err(invalid()),
                    Host::Ipv4(addr) => addr.to_string(),
                    Host::Ipv6(addr) => addr.to_string(),
                };
                Ok(Self::Tcp {
                    host: name,
                    port: url.port().unwrap_or(DEFAULT_TCP_PORT),
                })
            }
            _ => Err(invalid()),
        }
    }

    /// `host:port` of a TCP endpoint, with IPv6 addresses in brackets
    pub fn authority(&self) -> String {
        match self {
            Self::Unix(path) => path.display().to_string(),
            Self::Tcp { host, port } if host.contains(':') => format!("[{}]:{}", host, port),
            Self::Tcp { host, port } => format!("{}:{}", host, port),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp { .. } => write!(f, "tcp://{}", self.authority()),
        }
    }
}

/// Persistent client configuration (`config.json`)
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Key sequence used to detach from a container
    #[serde(default)]
    pub detach_keys: Option<String>,
}

impl ConfigFile {
    /// Load the config file from a directory. A missing file yields defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            DocksideError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Resolve the config directory: explicit flag, `DOCKSIDE_CONFIG`, then
/// `~/.dockside`
pub fn config_dir(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os("DOCKSIDE_CONFIG") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        DocksideError::Config(
            "Could not determine user home directory. Please ensure HOME environment variable is set."
                .to_string(),
        )
    })?;
    Ok(home.join(".dockside"))
}

/// Fully resolved client settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: Endpoint,
    pub api_version: String,
    pub config_file: ConfigFile,
}

impl Settings {
    /// Resolve settings from the global flags and the environment
    pub fn resolve(host: Option<&str>, config: Option<&Path>) -> Result<Self> {
        let host = host
            .map(str::to_string)
            .or_else(|| std::env::var("DOCKSIDE_HOST").ok())
            .or_else(|| std::env::var("DOCKER_HOST").ok())
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let endpoint = Endpoint::parse(&host)?;

        let api_version = std::env::var("DOCKSIDE_API_VERSION")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let dir = config_dir(config)?;
        let config_file = ConfigFile::load(&dir)?;

        tracing::debug!("Using daemon at {} (API v{})", endpoint, api_version);

        Ok(Self {
            endpoint,
            api_version,
            config_file,
        })
    }

    /// Detach keys for a command: the flag wins over the config file
    pub fn detach_keys(&self, flag: Option<&str>) -> Option<String> {
        flag.filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.config_file.detach_keys.clone())
    }
}
