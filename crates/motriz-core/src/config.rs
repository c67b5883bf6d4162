//! Motriz configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MotrizConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl MotrizConfig {
    /// Load config from the default path (~/.motriz/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MotrizError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::MotrizError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MotrizError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Motriz home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".motriz")
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.motriz/motriz.db".into()
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest)
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Due scanner configuration. Cadence is configuration, not part of the
/// engine contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_scan_interval() -> u64 {
    3600
}
fn default_concurrency() -> usize {
    8
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            concurrency: default_concurrency(),
        }
    }
}

/// Dispatcher configuration: retry budget and in-flight claim lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Failed attempts per (reminder, channel) before the pair is
    /// surfaced as exhausted instead of retried.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds after which an unresolved in-flight claim from an aborted
    /// pass is released for retry.
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_claim_lease() -> i64 {
    600
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            claim_lease_secs: default_claim_lease(),
        }
    }
}

/// Channel configuration. A channel with no section is simply not
/// available to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
    #[serde(default)]
    pub sms: Option<SmsConfig>,
}

/// SMTP email sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
    pub password: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_smtp_port() -> u16 {
    587
}
fn default_true() -> bool {
    true
}

/// WhatsApp Business Cloud API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Facebook Graph API access token
    pub access_token: String,
    /// WhatsApp Phone Number ID
    pub phone_number_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Twilio SMS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}
