//! Client configuration.
//!
//! `ClientConfig` can be built in code, deserialized from JSON, or loaded
//! from `FHIR_*` environment variables. Validation of the auth settings is
//! left to `Session::new` so every construction path fails the same way.

use std::time::Duration;

use serde::Deserialize;

use crate::error::QueryError;

/// How the client authenticates against the FHIR server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    /// HTTP basic credentials on every request.
    Basic { username: String, password: String },
    /// A static bearer token on every request.
    Token { token: String },
    /// Exchange basic credentials for a token at `login_url` on first use.
    Login {
        login_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    },
}

/// Settings owned by one `FhirQueryClient`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Send searches as `POST {type}/_search` unless a call says otherwise.
    #[serde(default)]
    pub use_post: bool,
    /// Headers sent with every request, including the login call.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Largest response body accepted; unbounded when absent.
    #[serde(default)]
    pub max_body_bytes: Option<u64>,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            use_post: false,
            headers: Vec::new(),
            auth: AuthConfig::None,
            timeout_secs: None,
            max_body_bytes: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn use_post(mut self, use_post: bool) -> Self {
        self.use_post = use_post;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Load configuration from `FHIR_*` environment variables.
    pub fn from_env() -> Result<Self, QueryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("FHIR_BASE_URL")
            .ok_or_else(|| QueryError::Config("FHIR_BASE_URL is not set".to_string()))?;

        let use_post = match lookup("FHIR_USE_POST") {
            Some(raw) => parse_bool("FHIR_USE_POST", &raw)?,
            None => false,
        };

        let timeout_secs = optional_number(&lookup, "FHIR_TIMEOUT_SECS")?;
        let max_body_bytes = optional_number(&lookup, "FHIR_MAX_BODY_BYTES")?;

        let method = lookup("FHIR_AUTH_METHOD").unwrap_or_default();
        let auth = match method.to_ascii_lowercase().as_str() {
            "" | "none" => AuthConfig::None,
            "basic" => AuthConfig::Basic {
                username: required(&lookup, "FHIR_USERNAME")?,
                password: required(&lookup, "FHIR_PASSWORD")?,
            },
            "token" => AuthConfig::Token {
                token: required(&lookup, "FHIR_TOKEN")?,
            },
            "login" => AuthConfig::Login {
                login_url: lookup("FHIR_LOGIN_URL"),
                username: lookup("FHIR_USERNAME"),
                password: lookup("FHIR_PASSWORD"),
            },
            other => {
                return Err(QueryError::Config(format!(
                    "unknown FHIR_AUTH_METHOD: {other}"
                )))
            }
        };

        Ok(Self {
            base_url,
            use_post,
            headers: Vec::new(),
            auth,
            timeout_secs,
            max_body_bytes,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, QueryError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| QueryError::Config(format!("{key} is not set")))
}

fn optional_number<F>(lookup: &F, key: &str) -> Result<Option<u64>, QueryError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| QueryError::Config(format!("{key} is not a number: {raw}")))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, QueryError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(QueryError::Config(format!("{key} is not a boolean: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_requires_base_url() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn env_defaults_to_get_without_auth() {
        let config =
            ClientConfig::from_lookup(lookup(&[("FHIR_BASE_URL", "https://h/fhir")])).unwrap();
        assert_eq!(config, ClientConfig::new("https://h/fhir"));
    }

    #[test]
    fn env_reads_login_settings() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("FHIR_BASE_URL", "https://h/fhir"),
            ("FHIR_USE_POST", "true"),
            ("FHIR_AUTH_METHOD", "login"),
            ("FHIR_LOGIN_URL", "https://h/auth/login"),
            ("FHIR_USERNAME", "alice"),
            ("FHIR_PASSWORD", "secret"),
            ("FHIR_TIMEOUT_SECS", "30"),
            ("FHIR_MAX_BODY_BYTES", "52428800"),
        ]))
        .unwrap();
        assert!(config.use_post);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_body_bytes, Some(52_428_800));
        assert_eq!(
            config.auth,
            AuthConfig::Login {
                login_url: Some("https://h/auth/login".to_string()),
                username: Some("alice".to_string()),
                password: Some("secret".to_string()),
            }
        );
    }

    #[test]
    fn env_token_auth_requires_token() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("FHIR_BASE_URL", "https://h/fhir"),
            ("FHIR_AUTH_METHOD", "token"),
        ]))
        .unwrap_err();
        assert!(matches!(err, QueryError::Config(msg) if msg.contains("FHIR_TOKEN")));
    }

    #[test]
    fn env_rejects_unknown_auth_method() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("FHIR_BASE_URL", "https://h/fhir"),
            ("FHIR_AUTH_METHOD", "oauth2"),
        ]))
        .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn env_rejects_bad_body_limit() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("FHIR_BASE_URL", "https://h/fhir"),
            ("FHIR_MAX_BODY_BYTES", "10MiB"),
        ]))
        .unwrap_err();
        assert!(matches!(err, QueryError::Config(msg) if msg.contains("FHIR_MAX_BODY_BYTES")));
    }

    #[test]
    fn env_rejects_bad_bool() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("FHIR_BASE_URL", "https://h/fhir"),
            ("FHIR_USE_POST", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn deserializes_from_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "base_url": "https://h/fhir",
                "headers": [["X-Tenant", "north"]],
                "auth": {"method": "token", "token": "abc"}
            }"#,
        )
        .unwrap();
        assert!(!config.use_post);
        assert_eq!(config.headers, vec![("X-Tenant".to_string(), "north".to_string())]);
        assert_eq!(config.auth, AuthConfig::Token { token: "abc".to_string() });
    }

    #[test]
    fn auth_defaults_to_none_in_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "https://h/fhir"}"#).unwrap();
        assert_eq!(config.auth, AuthConfig::None);
    }
}
