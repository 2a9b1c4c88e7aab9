//! Configuration management for the perk dispenser

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::error::DispenserError;

/// Main configuration for the dispenser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerkConfig {
    /// Durable store configuration
    pub store: StoreConfig,
    /// Batch generation defaults
    pub batch: BatchConfig,
    /// Calendar-date handling
    pub time: TimeConfig,
    /// Kiosk-facing HTTP server
    pub server: ServerConfig,
}

impl Default for PerkConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            batch: BatchConfig::default(),
            time: TimeConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string; the in-memory backend is used when unset
    pub database_url: Option<String>,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            connect_timeout: 10,
        }
    }
}

/// Batch generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Tokens per batch
    pub default_size: u32,
    /// Winners per batch; must divide `default_size`
    pub default_winners: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_size: 100,
            default_winners: 20,
        }
    }
}

/// Calendar-date handling for the daily scan limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Fixed reference offset from UTC, in minutes, used to compute "today".
    /// One value for the whole deployment, never per-request.
    pub utc_offset_minutes: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { utc_offset_minutes: 0 }
    }
}

/// Kiosk-facing HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Path of the scratch page a successful scan redirects to
    pub redirect_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redirect_path: "/spin/index.html".to_string(),
        }
    }
}

impl PerkConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DispenserError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DispenserError::Configuration {
                message: format!("Failed to read config file: {}", e),
                field: "config_file".to_string(),
            }
        })?;

        let config: PerkConfig = toml::from_str(&content).map_err(|e| {
            DispenserError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                field: "config_format".to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DispenserError> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DispenserError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                field: "config_serialization".to_string(),
            }
        })?;

        fs::write(path, content).map_err(|e| {
            DispenserError::Configuration {
                message: format!("Failed to write config file: {}", e),
                field: "config_write".to_string(),
            }
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), DispenserError> {
        if self.store.max_connections == 0 {
            return Err(DispenserError::Configuration {
                message: "Max connections must be greater than 0".to_string(),
                field: "store.max_connections".to_string(),
            });
        }

        if self.store.connect_timeout == 0 {
            return Err(DispenserError::Configuration {
                message: "Connection timeout must be greater than 0".to_string(),
                field: "store.connect_timeout".to_string(),
            });
        }

        if self.batch.default_size == 0 || self.batch.default_winners == 0 {
            return Err(DispenserError::Configuration {
                message: "Batch size and winner count must be greater than 0".to_string(),
                field: "batch".to_string(),
            });
        }

        if self.batch.default_size % self.batch.default_winners != 0 {
            return Err(DispenserError::Configuration {
                message: "Batch size must be divisible by winner count for even distribution".to_string(),
                field: "batch.default_winners".to_string(),
            });
        }

        // Real-world UTC offsets stay within +/- 14 hours
        if self.time.utc_offset_minutes.abs() > 14 * 60 {
            return Err(DispenserError::Configuration {
                message: "UTC offset must be within +/- 14 hours".to_string(),
                field: "time.utc_offset_minutes".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(DispenserError::Configuration {
                message: "Server port must be greater than 0".to_string(),
                field: "server.port".to_string(),
            });
        }

        if !self.server.redirect_path.starts_with('/') {
            return Err(DispenserError::Configuration {
                message: "Redirect path must be absolute".to_string(),
                field: "server.redirect_path".to_string(),
            });
        }

        Ok(())
    }

    /// Create a production-ready configuration
    pub fn production() -> Self {
        Self {
            store: StoreConfig {
                database_url: None,             // supplied via DATABASE_URL
                max_connections: 20,
                connect_timeout: 5,             // fail fast behind a proxy
            },
            batch: BatchConfig {
                default_size: 150,
                default_winners: 30,
            },
            time: TimeConfig {
                utc_offset_minutes: 0,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                redirect_path: "/spin/index.html".to_string(),
            },
        }
    }

    /// Create a development configuration with relaxed settings
    pub fn development() -> Self {
        Self {
            store: StoreConfig {
                database_url: None,
                max_connections: 5,
                connect_timeout: 30,
            },
            batch: BatchConfig {
                default_size: 10,               // small batches for local play
                default_winners: 2,
            },
            time: TimeConfig {
                utc_offset_minutes: 0,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                redirect_path: "/spin/index.html".to_string(),
            },
        }
    }
}
