//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup. Malformed optional values fall back to
//! their defaults with a warning; values the relay cannot run without are
//! validated later when the application state is assembled.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::classify::DEFAULT_EVENT_TYPES;
use crate::dispatch::{Destination, DestinationChoice, DestinationEndpoint};
use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Base64-encoded Samsara webhook signing secret
    pub secret_key: Option<String>,

    /// Make.com webhook URL
    pub make_webhook_url: Option<String>,

    /// IFTTT webhook URL
    pub ifttt_webhook_url: Option<String>,

    /// Text a Make.com response must contain to count as delivered
    pub make_expected_response: Option<String>,

    /// Text an IFTTT response must contain to count as delivered
    pub ifttt_expected_response: Option<String>,

    /// Destination choice override (`make`, `ifttt` or `both`)
    pub webhook_choice: Option<String>,

    /// JSON file holding `webhookChoice`, read when no override is set
    pub config_path: PathBuf,

    /// JSON file holding `whitelisted_ips`
    pub whitelist_path: PathBuf,

    /// Extra allowed origins merged into the whitelist file
    pub origin_allowlist: Option<Vec<String>>,

    /// Whether `X-Forwarded-For` is trusted to carry the client address
    pub trust_forwarded_for: bool,

    /// Per-destination forward timeout in milliseconds
    pub forward_timeout_ms: u64,

    /// Event types that are relayed
    pub allowed_event_types: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),

            secret_key: parse_optional("SECRET_KEY"),

            make_webhook_url: parse_optional("MAKE_WEBHOOK_URL"),

            ifttt_webhook_url: parse_optional("IFTTT_WEBHOOK_URL"),

            make_expected_response: parse_optional("MAKE_EXPECTED_RESPONSE"),

            ifttt_expected_response: parse_optional("IFTTT_EXPECTED_RESPONSE"),

            webhook_choice: parse_optional("WEBHOOK_CHOICE"),

            config_path: env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),

            whitelist_path: env::var("WHITELIST_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("whitelist.json")),

            origin_allowlist: parse_csv("ORIGIN_ALLOWLIST"),

            trust_forwarded_for: parse_bool("TRUST_FORWARDED_FOR", false),

            forward_timeout_ms: env::var("FORWARD_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .unwrap_or(8000),

            allowed_event_types: parse_csv("ALLOWED_EVENT_TYPES")
                .filter(|types| !types.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPES.iter().map(|t| t.to_string()).collect()),
        }
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    /// Resolve the active destinations: `WEBHOOK_CHOICE` if set, else the
    /// `webhookChoice` field of the config file.
    pub fn resolve_destination_choice(&self) -> Result<DestinationChoice, ConfigError> {
        match &self.webhook_choice {
            Some(choice) => choice.parse(),
            None => load_choice_file(&self.config_path),
        }
    }

    /// Per-destination settings, active or not.
    pub fn destination_endpoints(&self) -> Vec<DestinationEndpoint> {
        vec![
            DestinationEndpoint {
                destination: Destination::Make,
                url: self.make_webhook_url.clone(),
                expected_response: self.make_expected_response.clone(),
            },
            DestinationEndpoint {
                destination: Destination::Ifttt,
                url: self.ifttt_webhook_url.clone(),
                expected_response: self.ifttt_expected_response.clone(),
            },
        ]
    }
}

/// On-disk relay config format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    webhook_choice: String,
}

/// Read `{"webhookChoice": "..."}` from `path`.
pub fn load_choice_file(path: &Path) -> Result<DestinationChoice, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    file.webhook_choice.parse()
}

/// Read a variable, treating blank values as unset.
fn parse_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag such as "true", "1" or "yes".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        env::set_var("TEST_RELAY_CSV", "203.0.113.7, 198.51.100.20 ,,");
        let result = parse_csv("TEST_RELAY_CSV");
        assert_eq!(
            result,
            Some(vec!["203.0.113.7".to_string(), "198.51.100.20".to_string()])
        );
        env::remove_var("TEST_RELAY_CSV");
    }

    #[test]
    fn test_parse_csv_unset() {
        assert_eq!(parse_csv("TEST_RELAY_CSV_UNSET"), None);
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_RELAY_BOOL_TRUE", "Yes");
        env::set_var("TEST_RELAY_BOOL_FALSE", "0");
        env::set_var("TEST_RELAY_BOOL_BAD", "maybe");

        assert!(parse_bool("TEST_RELAY_BOOL_TRUE", false));
        assert!(!parse_bool("TEST_RELAY_BOOL_FALSE", true));
        assert!(parse_bool("TEST_RELAY_BOOL_BAD", true));
        assert!(!parse_bool("TEST_RELAY_BOOL_UNSET", false));

        env::remove_var("TEST_RELAY_BOOL_TRUE");
        env::remove_var("TEST_RELAY_BOOL_FALSE");
        env::remove_var("TEST_RELAY_BOOL_BAD");
    }

    #[test]
    fn test_parse_optional_blank() {
        env::set_var("TEST_RELAY_BLANK", "   ");
        assert_eq!(parse_optional("TEST_RELAY_BLANK"), None);
        env::remove_var("TEST_RELAY_BLANK");
    }

    #[test]
    fn test_load_choice_file() {
        let path = env::temp_dir().join(format!("relay-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"webhookChoice": "both"}"#).unwrap();
        assert_eq!(load_choice_file(&path).unwrap(), DestinationChoice::Both);

        fs::write(&path, r#"{"webhookChoice": "carrier-pigeon"}"#).unwrap();
        assert!(matches!(
            load_choice_file(&path),
            Err(ConfigError::InvalidChoice(_))
        ));

        fs::write(&path, r#"{"choice": "make"}"#).unwrap();
        assert!(matches!(load_choice_file(&path), Err(ConfigError::Parse { .. })));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_choice_override_wins_over_file() {
        let config = Config {
            webhook_choice: Some("ifttt".into()),
            config_path: PathBuf::from("/nonexistent/config.json"),
            ..test_config()
        };
        assert_eq!(
            config.resolve_destination_choice().unwrap(),
            DestinationChoice::Ifttt
        );

        let config = Config {
            webhook_choice: None,
            ..config
        };
        assert!(matches!(
            config.resolve_destination_choice(),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_destination_endpoints() {
        let config = Config {
            make_webhook_url: Some("https://hook.make.com/a".into()),
            ifttt_expected_response: Some("Congratulations".into()),
            ..test_config()
        };
        let endpoints = config.destination_endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].destination, Destination::Make);
        assert_eq!(endpoints[0].url.as_deref(), Some("https://hook.make.com/a"));
        assert_eq!(endpoints[1].expected_response.as_deref(), Some("Congratulations"));
    }

    fn test_config() -> Config {
        Config {
            port: 3000,
            secret_key: None,
            make_webhook_url: None,
            ifttt_webhook_url: None,
            make_expected_response: None,
            ifttt_expected_response: None,
            webhook_choice: None,
            config_path: PathBuf::from("config.json"),
            whitelist_path: PathBuf::from("whitelist.json"),
            origin_allowlist: None,
            trust_forwarded_for: false,
            forward_timeout_ms: 8000,
            allowed_event_types: vec!["GeofenceEntry".into()],
        }
    }
}
