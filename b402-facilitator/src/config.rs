//! Facilitator service configuration.
//!
//! Chains come from a TOML file (`CONFIG` env var, default `config.toml`);
//! operational settings come from environment variables and override the
//! file. `$VAR` / `${VAR}` references inside the file are expanded from the
//! environment before parsing.
//!
//! # Environment Variables
//!
//! - `PORT` — listen port (default 4022)
//! - `EVM_PRIVATE_KEY` — settlement signer key (required)
//! - `BRIDGE_EVM_PRIVATE_KEY` — separate bridge-burn signer (optional;
//!   falls back to `EVM_PRIVATE_KEY`)
//! - `EVM_RPC_URL` — default RPC endpoint for chains without one
//! - `CROSS_CHAIN_ENABLED` — master switch for bridging (default true)
//! - `DEPLOY_ERC4337_WITH_EIP6492` — deploy smart wallets during settle
//!   (default false)
//! - `BRIDGE_DB_PATH` — bridge job database (default `bridge-jobs.db`)
//! - `BRIDGE_ATTESTATION_URL` — attestation service base URL
//! - `CONFIG`, `HOST`, `RUST_LOG`

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration errors; all of them are fatal at boot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `EVM_PRIVATE_KEY` is absent or empty.
    #[error("EVM_PRIVATE_KEY is required")]
    MissingSignerKey,
    /// The configuration file exists but cannot be read.
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        /// Path attempted.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("invalid config file: {0}")]
    Invalid(#[from] toml::de::Error),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Bind address (default `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Listen port (default 4022).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Chain configurations keyed by CAIP-2 identifier.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    /// Deploy ERC-4337 wallets via EIP-6492 factory calls during settle.
    #[serde(default)]
    pub deploy_erc4337_with_eip6492: bool,

    /// Master switch for cross-chain bridging.
    #[serde(default = "default_true")]
    pub cross_chain_enabled: bool,

    /// Bridge job database path.
    #[serde(default = "default_bridge_db_path")]
    pub bridge_db_path: String,

    /// Attestation service base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_attestation_url: Option<String>,

    /// Settlement signer key. Populated from `EVM_PRIVATE_KEY`.
    #[serde(skip)]
    pub evm_private_key: String,

    /// Bridge-burn signer key, when distinct from the settlement key.
    #[serde(skip)]
    pub bridge_evm_private_key: Option<String>,

    /// Default RPC endpoint for chains without an explicit one.
    #[serde(skip)]
    pub default_rpc_url: Option<String>,
}

/// Per-chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// HTTP RPC endpoint. Falls back to `EVM_RPC_URL` when absent.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Whether the chain prices gas via EIP-1559 (default true).
    #[serde(default = "default_true")]
    pub eip1559: bool,

    /// Receipt wait deadline in seconds (default 120).
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,

    /// Verify the RPC's chain id at startup (default true).
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            eip1559: true,
            receipt_timeout_secs: default_receipt_timeout(),
            health_check: true,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4022
}

fn default_true() -> bool {
    true
}

fn default_receipt_timeout() -> u64 {
    120
}

fn default_bridge_db_path() -> String {
    "bridge-jobs.db".to_owned()
}

impl FacilitatorConfig {
    /// Loads configuration: TOML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSignerKey`] when `EVM_PRIVATE_KEY` is
    /// absent, and file errors when the config file is broken.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific TOML path.
    ///
    /// A missing file is fine — defaults plus environment variables then
    /// fully describe the service.
    ///
    /// # Errors
    ///
    /// See [`FacilitatorConfig::load`].
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(enabled) = std::env::var("CROSS_CHAIN_ENABLED") {
            config.cross_chain_enabled = parse_bool(&enabled, config.cross_chain_enabled);
        }
        if let Ok(deploy) = std::env::var("DEPLOY_ERC4337_WITH_EIP6492") {
            config.deploy_erc4337_with_eip6492 =
                parse_bool(&deploy, config.deploy_erc4337_with_eip6492);
        }
        if let Ok(db_path) = std::env::var("BRIDGE_DB_PATH") {
            config.bridge_db_path = db_path;
        }
        if let Ok(url) = std::env::var("BRIDGE_ATTESTATION_URL") {
            config.bridge_attestation_url = Some(url);
        }

        config.default_rpc_url = std::env::var("EVM_RPC_URL").ok().filter(|s| !s.is_empty());
        config.bridge_evm_private_key = std::env::var("BRIDGE_EVM_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let key = std::env::var("EVM_PRIVATE_KEY").unwrap_or_default();
        if key.trim().is_empty() {
            return Err(ConfigError::MissingSignerKey);
        }
        config.evm_private_key = key;

        Ok(config)
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Expands `$VAR` and `${VAR}` references from the environment.
///
/// Unresolved references are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            result.push('$');
            if braced {
                result.push('{');
            }
        } else if let Ok(value) = std::env::var(&name) {
            result.push_str(&value);
        } else {
            result.push('$');
            if braced {
                result.push('{');
                result.push_str(&name);
                result.push('}');
            } else {
                result.push_str(&name);
            }
        }
    }

    result
}
