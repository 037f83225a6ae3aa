//! Configuration loading for parcel delivery.

use std::{env, path::Path, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    client::TransportConfig,
    options::{DeliveryOptions, GatewayHeader, TlsPolicy},
    resolver::{Nameserver, ResolverSettings},
    DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_MS,
};

/// Default configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "pohttp.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "POHTTP_";

/// Largest redirect budget accepted from configuration.
const MAX_CONFIGURABLE_REDIRECTS: u32 = 20;

/// Keys whose environment values are taken verbatim instead of being parsed
/// as numbers or booleans.
const TEXT_KEYS: [&str; 3] = ["gateway_address", "user_agent", "log_level"];

/// Delivery configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed with `POHTTP_` (highest priority)
/// 2. Configuration file (`pohttp.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The TLS switch is read here, once, and handed to the deliverer as a
/// [`TlsPolicy`]; nothing reads the environment mid-delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address of this node, announced to recipients.
    ///
    /// Environment variable: `POHTTP_GATEWAY_ADDRESS`
    #[serde(default, deserialize_with = "optional_text")]
    pub gateway_address: Option<String>,
    /// Header used to announce `gateway_address`.
    ///
    /// Environment variable: `POHTTP_GATEWAY_HEADER`
    #[serde(default)]
    pub gateway_header: GatewayHeader,
    /// Number of 307/308 redirects to follow.
    ///
    /// Environment variable: `POHTTP_MAX_REDIRECTS`
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Timeout of each POST attempt in milliseconds.
    ///
    /// Environment variable: `POHTTP_TIMEOUT_MS`
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether resolved addresses are reached over HTTPS.
    ///
    /// Environment variable: `POHTTP_USE_TLS`
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Process-wide switch; `false` permits plain HTTP even when
    /// `use_tls` is set.
    ///
    /// Environment variable: `POHTTP_TLS_REQUIRED`
    #[serde(default = "default_true")]
    pub tls_required: bool,
    /// Nameservers used to resolve overlay addresses.
    ///
    /// Environment variable: `POHTTP_NAMESERVER`
    #[serde(default)]
    pub nameserver: Nameserver,
    /// DNS query timeout in milliseconds.
    ///
    /// Environment variable: `POHTTP_DNS_TIMEOUT_MS`
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,
    /// User agent sent with every request.
    ///
    /// Environment variable: `POHTTP_USER_AGENT`
    #[serde(default = "default_user_agent", deserialize_with = "text")]
    pub user_agent: String,
    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `POHTTP_LOG_LEVEL`
    #[serde(default = "default_log_level", deserialize_with = "text")]
    pub log_level: String,
}

impl Config {
    /// Loads configuration from defaults, `pohttp.toml` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration using `path` as the configuration file.
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&TEXT_KEYS));

        // Figment parses `POHTTP_GATEWAY_ADDRESS=0123` as an integer.
        for key in TEXT_KEYS {
            if let Ok(value) = env::var(format!("{ENV_PREFIX}{}", key.to_uppercase())) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to per-call delivery options.
    pub fn to_delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            gateway_address: self.gateway_address.clone(),
            gateway_header: self.gateway_header,
            max_redirects: self.max_redirects,
            timeout: Duration::from_millis(self.timeout_ms),
            use_tls: self.use_tls,
        }
    }

    /// Convert to the process-wide TLS policy.
    pub fn to_tls_policy(&self) -> TlsPolicy {
        TlsPolicy { enforced: self.tls_required }
    }

    /// Convert to transport configuration.
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig { user_agent: self.user_agent.clone(), ..TransportConfig::default() }
    }

    /// Convert to resolver settings.
    pub fn to_resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            nameserver: self.nameserver,
            timeout: Duration::from_millis(self.dns_timeout_ms),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than 0");
        }

        if self.dns_timeout_ms == 0 {
            anyhow::bail!("dns_timeout_ms must be greater than 0");
        }

        if self.max_redirects > MAX_CONFIGURABLE_REDIRECTS {
            anyhow::bail!("max_redirects cannot exceed {MAX_CONFIGURABLE_REDIRECTS}");
        }

        if self.gateway_address.as_deref().is_some_and(|address| address.trim().is_empty()) {
            anyhow::bail!("gateway_address cannot be empty");
        }

        if self.user_agent.is_empty() {
            anyhow::bail!("user_agent cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_address: None,
            gateway_header: GatewayHeader::default(),
            max_redirects: default_max_redirects(),
            timeout_ms: default_timeout_ms(),
            use_tls: default_true(),
            tls_required: default_true(),
            nameserver: Nameserver::default(),
            dns_timeout_ms: default_dns_timeout_ms(),
            user_agent: default_user_agent(),
            log_level: default_log_level(),
        }
    }
}

/// Free-form text that a file may spell as a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum Text {
    String(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl From<Text> for String {
    fn from(text: Text) -> Self {
        match text {
            Text::String(value) => value,
            Text::Unsigned(value) => value.to_string(),
            Text::Signed(value) => value.to_string(),
            Text::Float(value) => value.to_string(),
        }
    }
}

fn text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Text::deserialize(deserializer).map(String::from)
}

fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Text>::deserialize(deserializer)?.map(String::from))
}

fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_dns_timeout_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    TransportConfig::default().user_agent
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    fn missing_file() -> std::path::PathBuf {
        env::temp_dir().join("pohttp-config-test-does-not-exist.toml")
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let options = config.to_delivery_options();
        assert_eq!(options, DeliveryOptions::default());
        assert_eq!(config.to_tls_policy(), TlsPolicy::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("POHTTP_GATEWAY_ADDRESS", "0bf0abc");
        guard.set_var("POHTTP_GATEWAY_HEADER", "relaynet-relay");
        guard.set_var("POHTTP_MAX_REDIRECTS", "5");
        guard.set_var("POHTTP_TIMEOUT_MS", "4321");
        guard.set_var("POHTTP_NAMESERVER", "cloudflare");

        let config = Config::load_from(missing_file()).expect("Config should load");

        let options = config.to_delivery_options();
        assert_eq!(options.gateway_address.as_deref(), Some("0bf0abc"));
        assert_eq!(options.gateway_header, GatewayHeader::RelaynetRelay);
        assert_eq!(options.max_redirects, 5);
        assert_eq!(options.timeout, Duration::from_millis(4321));
        assert_eq!(config.to_resolver_settings().nameserver, Nameserver::Cloudflare);
    }

    #[test]
    fn numeric_looking_gateway_address_is_kept_verbatim() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("POHTTP_GATEWAY_ADDRESS", "0123456");
        guard.set_var("POHTTP_USER_AGENT", "2024");

        let config = Config::load_from(missing_file()).expect("Config should load");

        assert_eq!(config.gateway_address.as_deref(), Some("0123456"));
        assert_eq!(config.user_agent, "2024");
        assert_eq!(config.to_delivery_options().gateway_address.as_deref(), Some("0123456"));
    }

    #[test]
    fn numeric_gateway_address_in_file_is_read_as_text() {
        let _guard = TestEnvGuard::new();
        let path =
            env::temp_dir().join(format!("pohttp-config-numeric-{}.toml", std::process::id()));
        std::fs::write(&path, "gateway_address = 42\n").unwrap();

        let config = Config::load_from(&path).expect("Config should load from file");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.gateway_address.as_deref(), Some("42"));
    }

    #[test]
    fn tls_switch_is_read_from_environment() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("POHTTP_TLS_REQUIRED", "false");

        let config = Config::load_from(missing_file()).expect("Config should load");

        assert!(config.use_tls);
        assert_eq!(config.to_tls_policy(), TlsPolicy::permissive());
    }

    #[test]
    fn file_values_are_loaded() {
        let _guard = TestEnvGuard::new();
        let path = env::temp_dir().join(format!("pohttp-config-test-{}.toml", std::process::id()));
        std::fs::write(&path, "max_redirects = 1\nuse_tls = false\nlog_level = \"debug\"\n")
            .unwrap();

        let config = Config::load_from(&path).expect("Config should load from file");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.max_redirects, 1);
        assert!(!config.use_tls);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.timeout_ms, 3000);
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.timeout_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.dns_timeout_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.max_redirects = 21;
        assert!(config.validate().is_err());

        config = Config::default();
        config.gateway_address = Some("  ".to_string());
        assert!(config.validate().is_err());

        config = Config::default();
        config.max_redirects = 0;
        assert!(config.validate().is_ok());
    }
}
