use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::TokenProvider;
use crate::config::OAuthConfig;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

/// Fetches bearer tokens with the OAuth client-credentials grant.
///
/// The token is cached until it is within a minute of expiry. Concurrent
/// callers that find the cache stale wait on a single refresh instead of
/// each hitting the token endpoint.
pub struct OAuthTokenProvider {
    config: OAuthConfig,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl OAuthTokenProvider {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config,
            client,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    fn fresh_token(&self) -> Option<CachedToken> {
        let cached = self.cached.read().unwrap_or_else(|e| e.into_inner());
        cached.as_ref().filter(|t| t.is_fresh(Utc::now())).cloned()
    }

    async fn exchange_token(&self) -> Result<CachedToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .context("failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "token exchange failed with status {}: {}",
                status,
                body
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("failed to parse token response")?;

        let lifetime = token.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        })
    }
}

#[async_trait::async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn ensure_token_loaded(&self) -> Result<()> {
        if self.fresh_token().is_some() {
            return Ok(());
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if self.fresh_token().is_some() {
            return Ok(());
        }

        debug!(token_url = %self.config.token_url, "Requesting OAuth token");
        let token = self.exchange_token().await?;
        info!(expires_at = %token.expires_at, "OAuth token loaded");

        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
        Ok(())
    }

    fn current_token(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config_for(server: &Server) -> OAuthConfig {
        OAuthConfig {
            token_url: format!("{}/oauth/token", server.url()),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[test]
    fn test_cached_token_freshness_respects_skew() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(30),
        };
        assert!(!token.is_fresh(now));

        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(600),
        };
        assert!(token.is_fresh(now));
    }

    #[tokio::test]
    async fn test_no_token_before_first_load() {
        let server = Server::new_async().await;
        let provider = OAuthTokenProvider::new(config_for(&server)).unwrap();
        assert!(provider.current_token().is_none());
    }

    #[tokio::test]
    async fn test_loads_token_once_while_fresh() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "client".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "abc", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = OAuthTokenProvider::new(config_for(&server)).unwrap();
        provider.ensure_token_loaded().await.unwrap();
        provider.ensure_token_loaded().await.unwrap();

        assert_eq!(provider.current_token().as_deref(), Some("abc"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refreshes_token_close_to_expiry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token": "short", "expires_in": 10}"#)
            .expect(2)
            .create_async()
            .await;

        let provider = OAuthTokenProvider::new(config_for(&server)).unwrap();
        provider.ensure_token_loaded().await.unwrap();
        provider.ensure_token_loaded().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_exchange_reports_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body("bad credentials")
            .create_async()
            .await;

        let provider = OAuthTokenProvider::new(config_for(&server)).unwrap();
        let err = provider.ensure_token_loaded().await.unwrap_err();

        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("bad credentials"));
        assert!(provider.current_token().is_none());
    }
}
