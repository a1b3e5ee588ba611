//! Client configuration.
//!
//! Values come either from a JSON file or from environment variables (the
//! binary loads a `.env` file first):
//!
//! | Variable                 | Default                          |
//! |--------------------------|----------------------------------|
//! | `CB_DEVELOPER_KEY`       | required                         |
//! | `CB_API_URL`             | `https://api.careerbuilder.com`  |
//! | `CB_HOST_SITE`           | `US`                             |
//! | `CB_OAUTH_TOKEN_URL`     | required for OAuth               |
//! | `CB_OAUTH_CLIENT_ID`     | required for OAuth               |
//! | `CB_OAUTH_CLIENT_SECRET` | required for OAuth               |

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.careerbuilder.com";
pub const DEFAULT_HOST_SITE: &str = "US";

/// Settings for first-party calls. Immutable once the client is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebServiceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub developer_key: String,
    #[serde(default = "default_host_site")]
    pub host_site: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_host_site() -> String {
    DEFAULT_HOST_SITE.to_string()
}

impl WebServiceConfig {
    /// Config for the production API with the given developer key.
    pub fn new(developer_key: impl Into<String>) -> Self {
        Self {
            api_url: default_api_url(),
            developer_key: developer_key.into(),
            host_site: default_host_site(),
        }
    }

    /// Overrides the base URL every first-party path is appended to.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Loads the config from a JSON file at `path`:
    /// ```json
    /// { "developer_key": "ABC123", "api_url": "https://api.careerbuilder.com" }
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid config file '{path}'"))
    }

    fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let developer_key =
            lookup("CB_DEVELOPER_KEY").context("CB_DEVELOPER_KEY must be set")?;
        Ok(Self {
            api_url: lookup("CB_API_URL").unwrap_or_else(default_api_url),
            developer_key,
            host_site: lookup("CB_HOST_SITE").unwrap_or_else(default_host_site),
        })
    }
}

/// Client-credentials settings for [`OAuthTokenProvider`](crate::auth::OAuthTokenProvider).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            token_url: lookup("CB_OAUTH_TOKEN_URL").context("CB_OAUTH_TOKEN_URL must be set")?,
            client_id: lookup("CB_OAUTH_CLIENT_ID").context("CB_OAUTH_CLIENT_ID must be set")?,
            client_secret: lookup("CB_OAUTH_CLIENT_SECRET")
                .context("CB_OAUTH_CLIENT_SECRET must be set")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_applies_defaults() {
        let config = WebServiceConfig::from_lookup(lookup_from(&[("CB_DEVELOPER_KEY", "ABC123")]))
            .unwrap();
        assert_eq!(config, WebServiceConfig::new("ABC123"));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.host_site, "US");
    }

    #[test]
    fn test_from_lookup_requires_developer_key() {
        let err = WebServiceConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("CB_DEVELOPER_KEY"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = WebServiceConfig::from_lookup(lookup_from(&[
            ("CB_DEVELOPER_KEY", "K"),
            ("CB_API_URL", "http://localhost:9000"),
            ("CB_HOST_SITE", "CA"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "http://localhost:9000");
        assert_eq!(config.host_site, "CA");
    }

    #[test]
    fn test_from_json_defaults_optional_fields() {
        let config = WebServiceConfig::from_json(r#"{"developer_key": "ABC123"}"#).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.host_site, DEFAULT_HOST_SITE);
    }

    #[test]
    fn test_load_missing_file() {
        let result = WebServiceConfig::load("/nonexistent/cb_api_client.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_oauth_from_lookup_reports_missing_variable() {
        let err = OAuthConfig::from_lookup(lookup_from(&[
            ("CB_OAUTH_TOKEN_URL", "https://example.com/token"),
            ("CB_OAUTH_CLIENT_ID", "id"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CB_OAUTH_CLIENT_SECRET"));
    }
}
