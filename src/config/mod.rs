pub mod filter;
pub mod runtime;
pub mod store;

pub use filter::EntityFilter;
pub use runtime::SmartHomeConfig;
pub use store::AuthStore;

use crate::alexa::consts::TempUnit;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub smart_home: SmartHomeSettings,
    #[serde(default)]
    pub auth: AuthSettings,

    /// Entities loaded into the in-memory backend at startup
    #[serde(default)]
    pub entities: Vec<SeedEntity>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Bearer token required on inbound requests (None = open)
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_token: None,
        }
    }
}

/// Per-account Alexa policy
#[derive(Debug, Clone, Deserialize)]
pub struct SmartHomeSettings {
    /// When false every directive answers BRIDGE_UNREACHABLE
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// Event gateway URL; proactive reporting requires it
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_true")]
    pub report_state: bool,

    /// Prefix of `customIdentifier` in discovery
    #[serde(default)]
    pub user_identifier: String,

    /// Unit the backend reports temperatures in
    #[serde(default = "default_temperature_unit")]
    pub temperature_unit: TempUnit,

    /// Public HTTPS address of the backend; camera streams require it
    #[serde(default)]
    pub external_url: Option<String>,

    /// Persisted authorization state
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    #[serde(default)]
    pub filter: EntityFilter,

    /// Overrides keyed by entity_id
    #[serde(default)]
    pub entity_config: HashMap<String, EntityOverride>,
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_temperature_unit() -> TempUnit {
    TempUnit::Celsius
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("alexa_auth.json")
}

impl Default for SmartHomeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: default_locale(),
            endpoint: None,
            report_state: true,
            user_identifier: String::new(),
            temperature_unit: default_temperature_unit(),
            external_url: None,
            storage_path: default_storage_path(),
            filter: EntityFilter::default(),
            entity_config: HashMap::new(),
        }
    }
}

impl SmartHomeSettings {
    pub fn entity_override(&self, entity_id: &str) -> Option<&EntityOverride> {
        self.entity_config.get(entity_id)
    }

    /// `external_url` if Alexa can fetch streams from it: https on the
    /// standard port with a host name rather than an IP address
    pub fn stream_base_url(&self) -> Option<&str> {
        let url = self.external_url.as_deref()?.trim_end_matches('/');
        let authority = url.strip_prefix("https://")?.split('/').next()?;

        // IPv6 literals are bracketed and contain colons of their own
        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, rest) = bracketed.split_once(']')?;
                let port = match rest {
                    "" => None,
                    rest => Some(rest.strip_prefix(':')?),
                };
                (host, port)
            }
            None => match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };
        if !matches!(port, None | Some("443")) {
            return None;
        }
        if host.is_empty() || host.parse::<IpAddr>().is_ok() {
            return None;
        }
        Some(url)
    }
}

/// Per-entity naming and category overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub display_categories: Option<String>,
}

/// `[[entities]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Login with Amazon client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Seed refresh token from a previous AcceptGrant
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_url() -> String {
    "https://api.amazon.com/auth/o2/token".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_token_url(),
            refresh_token: None,
        }
    }
}

impl AuthSettings {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Load configuration from TOML file; a missing file yields defaults
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

impl BridgeConfig {
    /// Apply ALEXA_BRIDGE_* environment overrides
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ALEXA_BRIDGE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("ALEXA_BRIDGE_API_TOKEN") {
            self.server.api_token = Some(v);
        }
        if let Some(v) = var("ALEXA_BRIDGE_LOCALE") {
            self.smart_home.locale = v;
        }
        if let Some(v) = var("ALEXA_BRIDGE_ENDPOINT") {
            self.smart_home.endpoint = Some(v);
        }
        if let Some(v) = var("ALEXA_BRIDGE_EXTERNAL_URL") {
            self.smart_home.external_url = Some(v);
        }
        if let Some(v) = var("ALEXA_BRIDGE_REPORT_STATE") {
            if let Ok(b) = v.parse::<bool>() {
                self.smart_home.report_state = b;
            }
        }
        if let Some(v) = var("ALEXA_BRIDGE_CLIENT_ID") {
            self.auth.client_id = v;
        }
        if let Some(v) = var("ALEXA_BRIDGE_CLIENT_SECRET") {
            self.auth.client_secret = v;
        }
        if let Some(v) = var("ALEXA_BRIDGE_REFRESH_TOKEN") {
            self.auth.refresh_token = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.smart_home.enabled);
        assert_eq!(config.smart_home.locale, "en-US");
        assert!(config.smart_home.endpoint.is_none());
        assert_eq!(config.smart_home.temperature_unit, TempUnit::Celsius);
        assert_eq!(config.auth.token_url, "https://api.amazon.com/auth/o2/token");
        assert!(!config.auth.is_configured());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:9000"

            [smart_home]
            locale = "de-DE"
            endpoint = "https://api.eu.amazonalexa.com/v3/events"
            temperature_unit = "fahrenheit"

            [smart_home.filter]
            include_domains = ["light", "switch"]
            exclude_entities = ["light.garage"]

            [smart_home.entity_config."light.kitchen"]
            name = "Kitchen"
            display_categories = "LIGHT"

            [auth]
            client_id = "id"
            client_secret = "secret"
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.smart_home.locale, "de-DE");
        assert_eq!(config.smart_home.temperature_unit, TempUnit::Fahrenheit);
        assert_eq!(config.smart_home.filter.include_domains, vec!["light", "switch"]);

        let kitchen = config.smart_home.entity_override("light.kitchen").unwrap();
        assert_eq!(kitchen.name.as_deref(), Some("Kitchen"));
        assert!(kitchen.description.is_none());
        assert!(config.auth.is_configured());
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [smart_home]
            report_state = false
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert!(!config.smart_home.report_state);
        assert!(config.smart_home.enabled); // Default
        assert_eq!(config.server.bind, "0.0.0.0:8080"); // Default
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ALEXA_BRIDGE_LOCALE", "ja-JP"),
            ("ALEXA_BRIDGE_REPORT_STATE", "false"),
            ("ALEXA_BRIDGE_REFRESH_TOKEN", "Atzr|token"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.smart_home.locale, "ja-JP");
        assert!(!config.smart_home.report_state);
        assert_eq!(config.auth.refresh_token.as_deref(), Some("Atzr|token"));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_stream_base_url() {
        let with_url = |url: &str| SmartHomeSettings {
            external_url: Some(url.to_string()),
            ..Default::default()
        };

        assert_eq!(
            with_url("https://home.example.com/").stream_base_url(),
            Some("https://home.example.com")
        );
        assert_eq!(
            with_url("https://home.example.com:443").stream_base_url(),
            Some("https://home.example.com:443")
        );
        assert!(with_url("http://home.example.com").stream_base_url().is_none());
        assert!(with_url("https://home.example.com:8123").stream_base_url().is_none());
        assert!(with_url("https://192.168.1.10").stream_base_url().is_none());
        assert!(with_url("https://192.168.1.10:443").stream_base_url().is_none());
        assert!(with_url("https://[::1]").stream_base_url().is_none());
        assert!(with_url("https://[::1]:443").stream_base_url().is_none());
        assert!(with_url("https://[2001:db8::1]:443/").stream_base_url().is_none());
        assert!(SmartHomeSettings::default().stream_base_url().is_none());
    }

    #[test]
    fn test_seed_entities() {
        let toml = r#"
            [[entities]]
            entity_id = "light.kitchen"
            state = "on"
            attributes = { brightness = 128, supported_color_modes = ["brightness"] }

            [[entities]]
            entity_id = "switch.fan"
            state = "off"
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.entities.len(), 2);
        assert_eq!(config.entities[0].attributes["brightness"], 128);
        assert_eq!(
            config.entities[0].attributes["supported_color_modes"],
            serde_json::json!(["brightness"])
        );
        assert!(config.entities[1].attributes.is_empty());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alexa-bridge.toml");
        std::fs::write(&path, "[smart_home]\nlocale = \"en-GB\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.smart_home.locale, "en-GB");

        std::fs::write(&path, "[smart_home\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/alexa-bridge.toml")).unwrap();
        assert_eq!(config.smart_home.locale, "en-US");
    }
}
