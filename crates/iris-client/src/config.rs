//! # Connector Configuration
//!
//! Configuration management for the FBR IRIS connector.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     IRIS_ENABLED=true                                                  │
//! │     IRIS_BEARER_TOKEN=...                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/iris-connector/iris.toml (Linux)                         │
//! │     ~/Library/Application Support/pk.fbr.iris-connector/iris.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     integration disabled, 2 retries, 7 day reference cache            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # iris.toml
//! [company]
//! integration_enabled = true
//! api_base_url = "https://gw.fbr.gov.pk/di_data/v1/di/postinvoicedata"
//! bearer_token = "Bearer 1298b5eb-..."
//! seller_business_name = "Acme Traders"
//! seller_province = "Punjab"
//! seller_ntn = "1234567"
//!
//! [submission]
//! max_retries = 2
//! backoff_base_ms = 1000
//!
//! [reference]
//! max_age_days = 7
//!
//! [pos]
//! inject_further_tax = false
//! e_invoicing = true
//! service_fee = "1"
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use iris_core::{Channel, ChannelPolicy, CompanyFbrConfig, SERVICE_FEE_PRODUCT_CODE};

use crate::error::{IrisError, IrisResult};

// =============================================================================
// API Settings
// =============================================================================

/// Authority endpoints other than submission, and per-call timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Gateway the reference lookups are resolved against.
    #[serde(default = "default_reference_base_url")]
    pub reference_base_url: String,

    /// Buyer registration-type lookup.
    #[serde(default = "default_registration_url")]
    pub registration_url: String,

    /// Timeout for a single submission attempt (seconds).
    #[serde(default = "default_submission_timeout")]
    pub submission_timeout_secs: u64,

    /// Timeout for lookups and the registration check (seconds).
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

fn default_reference_base_url() -> String {
    "https://gw.fbr.gov.pk".to_string()
}

fn default_registration_url() -> String {
    "https://gw.fbr.gov.pk/dist/v1/Get_Reg_Type".to_string()
}

fn default_submission_timeout() -> u64 {
    10
}

fn default_lookup_timeout() -> u64 {
    5
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            reference_base_url: default_reference_base_url(),
            registration_url: default_registration_url(),
            submission_timeout_secs: default_submission_timeout(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

// =============================================================================
// Submission Settings
// =============================================================================

/// Retry budget for the submission state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSettings {
    /// Retries after the first attempt. Total attempts = max_retries + 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds). Doubles per attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base() -> u64 {
    1000
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        SubmissionSettings {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

// =============================================================================
// Reference Cache Settings
// =============================================================================

/// Staleness window and fan-out sizes for the reference cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    /// A category refreshed less than this many days ago is not re-fetched.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    /// Concurrent fetches for the six base categories.
    #[serde(default = "default_base_workers")]
    pub base_workers: usize,

    /// Concurrent fetches for rates, SRO schedules and SRO items.
    #[serde(default = "default_dependent_workers")]
    pub dependent_workers: usize,
}

/// Longest staleness window accepted for the reference cache.
pub const MAX_REFERENCE_AGE_DAYS: i64 = 365;

fn default_max_age_days() -> i64 {
    7
}

fn default_base_workers() -> usize {
    6
}

fn default_dependent_workers() -> usize {
    10
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        ReferenceSettings {
            max_age_days: default_max_age_days(),
            base_workers: default_base_workers(),
            dependent_workers: default_dependent_workers(),
        }
    }
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Per-channel switches, turned into a [`ChannelPolicy`] at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Attach a default further-tax component for unregistered buyers.
    pub inject_further_tax: bool,

    #[serde(default = "default_further_tax_percent")]
    pub default_further_tax_percent: Decimal,

    /// POS orders are only submitted while this is on.
    #[serde(default = "default_true")]
    pub e_invoicing: bool,

    /// Flat POS service fee. Ignored on ledger invoices.
    #[serde(default)]
    pub service_fee: Decimal,

    /// Product code of the fee line.
    #[serde(default)]
    pub service_fee_product_code: Option<String>,
}

fn default_further_tax_percent() -> Decimal {
    Decimal::from(4)
}

fn default_true() -> bool {
    true
}

fn default_invoice_settings() -> ChannelSettings {
    ChannelSettings {
        inject_further_tax: true,
        default_further_tax_percent: default_further_tax_percent(),
        e_invoicing: true,
        service_fee: Decimal::ZERO,
        service_fee_product_code: None,
    }
}

fn default_pos_settings() -> ChannelSettings {
    ChannelSettings {
        inject_further_tax: false,
        default_further_tax_percent: default_further_tax_percent(),
        e_invoicing: true,
        service_fee: Decimal::ZERO,
        service_fee_product_code: Some(SERVICE_FEE_PRODUCT_CODE.to_string()),
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the record store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to `iris.db` in the platform data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete connector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisConfig {
    /// Seller identity, submission endpoint and token.
    #[serde(default)]
    pub company: CompanyFbrConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub submission: SubmissionSettings,

    #[serde(default)]
    pub reference: ReferenceSettings,

    /// Ledger invoice channel.
    #[serde(default = "default_invoice_settings")]
    pub invoice: ChannelSettings,

    /// POS order channel.
    #[serde(default = "default_pos_settings")]
    pub pos: ChannelSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl Default for IrisConfig {
    fn default() -> Self {
        IrisConfig {
            company: CompanyFbrConfig::default(),
            api: ApiSettings::default(),
            submission: SubmissionSettings::default(),
            reference: ReferenceSettings::default(),
            invoice: default_invoice_settings(),
            pos: default_pos_settings(),
            storage: StorageSettings::default(),
        }
    }
}

impl IrisConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (iris.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> IrisResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading connector config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load connector config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> IrisResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| IrisError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Connector config saved");
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// A disabled integration may leave the endpoint and token blank; they
    /// are checked again by `CompanyFbrConfig::ensure_ready` per submission.
    pub fn validate(&self) -> IrisResult<()> {
        if self.company.integration_enabled {
            if self.company.api_base_url.trim().is_empty() {
                return Err(IrisError::Configuration(
                    "api_base_url is required when the integration is enabled".into(),
                ));
            }
            check_http_url(&self.company.api_base_url)?;
        }

        check_http_url(&self.api.reference_base_url)?;
        check_http_url(&self.api.registration_url)?;

        if self.submission.max_retries > 10 {
            return Err(IrisError::Configuration(format!(
                "max_retries must be at most 10, got {}",
                self.submission.max_retries
            )));
        }

        if self.api.submission_timeout_secs == 0 || self.api.lookup_timeout_secs == 0 {
            return Err(IrisError::Configuration("timeouts must be greater than 0".into()));
        }

        if self.reference.base_workers == 0 || self.reference.dependent_workers == 0 {
            return Err(IrisError::Configuration("worker counts must be greater than 0".into()));
        }

        if !(0..=MAX_REFERENCE_AGE_DAYS).contains(&self.reference.max_age_days) {
            return Err(IrisError::Configuration(format!(
                "max_age_days must be between 0 and {MAX_REFERENCE_AGE_DAYS}, got {}",
                self.reference.max_age_days
            )));
        }

        for (name, channel) in [("invoice", &self.invoice), ("pos", &self.pos)] {
            if channel.service_fee.is_sign_negative() {
                return Err(IrisError::Configuration(format!(
                    "{name}.service_fee must not be negative"
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enabled) = lookup("IRIS_ENABLED") {
            match parse_bool(&enabled) {
                Some(b) => self.company.integration_enabled = b,
                None => warn!(value = %enabled, "Ignoring IRIS_ENABLED"),
            }
        }

        if let Some(url) = lookup("IRIS_SUBMISSION_URL") {
            debug!(url = %url, "Overriding submission URL from environment");
            self.company.api_base_url = url;
        }

        if let Some(token) = lookup("IRIS_BEARER_TOKEN") {
            self.company.bearer_token = token;
        }

        if let Some(url) = lookup("IRIS_REFERENCE_BASE_URL") {
            debug!(url = %url, "Overriding reference base URL from environment");
            self.api.reference_base_url = url;
        }

        if let Some(retries) = lookup("IRIS_MAX_RETRIES") {
            if let Ok(n) = retries.parse::<u32>() {
                self.submission.max_retries = n;
            }
        }

        if let Some(ntn) = lookup("IRIS_SELLER_NTN") {
            self.company.seller_ntn = ntn;
        }

        if let Some(fee) = lookup("IRIS_POS_SERVICE_FEE") {
            match fee.parse::<Decimal>() {
                Ok(d) => self.pos.service_fee = d,
                Err(_) => warn!(value = %fee, "Ignoring IRIS_POS_SERVICE_FEE"),
            }
        }

        if let Some(on) = lookup("IRIS_E_INVOICING") {
            if let Some(b) = parse_bool(&on) {
                self.pos.e_invoicing = b;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pk", "fbr", "iris-connector").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("iris.toml")
        })
    }

    /// Returns the configured database path, or `iris.db` in the data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("pk", "fbr", "iris-connector")
                .map(|dirs| dirs.data_dir().join("iris.db"))
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the pipeline policy for a channel.
    pub fn policy(&self, channel: Channel) -> ChannelPolicy {
        let settings = match channel {
            Channel::Invoice => &self.invoice,
            Channel::PosOrder => &self.pos,
        };
        ChannelPolicy {
            channel,
            inject_further_tax: settings.inject_further_tax,
            default_further_tax_percent: settings.default_further_tax_percent,
            e_invoicing: settings.e_invoicing,
            service_fee: settings.service_fee,
            service_fee_product_code: settings.service_fee_product_code.clone(),
        }
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.api.submission_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.api.lookup_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.submission.backoff_base_ms)
    }
}

fn check_http_url(raw: &str) -> IrisResult<()> {
    let url = Url::parse(raw)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(IrisError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            raw
        )));
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = IrisConfig::default();
        assert!(!config.company.integration_enabled);
        assert_eq!(config.submission.max_retries, 2);
        assert_eq!(config.reference.max_age_days, 7);
        assert_eq!(config.reference.base_workers, 6);
        assert_eq!(config.reference.dependent_workers, 10);
        assert_eq!(config.submission_timeout(), Duration::from_secs(10));
        assert_eq!(config.lookup_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_policies() {
        let config = IrisConfig::default();

        let invoice = config.policy(Channel::Invoice);
        assert!(invoice.inject_further_tax);
        assert_eq!(invoice.service_fee_product_code, None);

        let pos = config.policy(Channel::PosOrder);
        assert!(!pos.inject_further_tax);
        assert_eq!(pos.service_fee_product_code.as_deref(), Some("SERVICE_FEE"));
        assert_eq!(pos, ChannelPolicy::pos());
    }

    #[test]
    fn test_validation() {
        let mut config = IrisConfig::default();

        // Enabled without an endpoint.
        config.company.integration_enabled = true;
        assert!(config.validate().unwrap_err().is_config_error());

        config.company.api_base_url = "ftp://gw.fbr.gov.pk/post".into();
        assert!(config.validate().is_err());

        config.company.api_base_url = "https://gw.fbr.gov.pk/di_data/v1/di/postinvoicedata".into();
        assert!(config.validate().is_ok());

        config.reference.base_workers = 0;
        assert!(config.validate().is_err());
        config.reference.base_workers = 6;

        config.reference.max_age_days = i64::MAX;
        assert!(config.validate().unwrap_err().is_config_error());
        config.reference.max_age_days = -1;
        assert!(config.validate().is_err());
        config.reference.max_age_days = MAX_REFERENCE_AGE_DAYS;
        assert!(config.validate().is_ok());
        config.reference.max_age_days = 7;

        config.pos.service_fee = dec!(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("IRIS_ENABLED", "true"),
            ("IRIS_SUBMISSION_URL", "https://example.test/post"),
            ("IRIS_BEARER_TOKEN", "abc"),
            ("IRIS_MAX_RETRIES", "4"),
            ("IRIS_POS_SERVICE_FEE", "1.00"),
            ("IRIS_E_INVOICING", "off"),
            ("IRIS_SELLER_NTN", "7654321"),
        ]
        .into_iter()
        .collect();

        let mut config = IrisConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.company.integration_enabled);
        assert_eq!(config.company.api_base_url, "https://example.test/post");
        assert_eq!(config.company.bearer_token, "abc");
        assert_eq!(config.submission.max_retries, 4);
        assert_eq!(config.pos.service_fee, dec!(1.00));
        assert!(!config.pos.e_invoicing);
        assert_eq!(config.company.seller_ntn, "7654321");
    }

    #[test]
    fn test_bad_override_values_ignored() {
        let mut config = IrisConfig::default();
        config.apply_overrides(|key| match key {
            "IRIS_MAX_RETRIES" => Some("many".into()),
            "IRIS_ENABLED" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(config.submission.max_retries, 2);
        assert!(!config.company.integration_enabled);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = IrisConfig::default();
        config.company.seller_business_name = "Acme Traders".into();
        config.pos.service_fee = dec!(1);

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: IrisConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: IrisConfig = toml::from_str(
            r#"
            [company]
            integration_enabled = true
            api_base_url = "https://gw.fbr.gov.pk/di_data/v1/di/postinvoicedata"
            bearer_token = "t"

            [submission]
            max_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(parsed.company.seller_province, "Punjab");
        assert_eq!(parsed.submission.max_retries, 1);
        assert_eq!(parsed.submission.backoff_base_ms, 1000);
        assert_eq!(parsed.pos.service_fee_product_code.as_deref(), Some("SERVICE_FEE"));
        assert!(parsed.invoice.inject_further_tax);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("iris-config-test-does-not-exist.toml");
        let config = IrisConfig::load_or_default(Some(path));
        assert_eq!(config.submission.max_retries, IrisConfig::default().submission.max_retries);
    }
}
