//! Bearer-token sources.
//!
//! [`TokenProvider`] is the seam the web service reads credentials through.
//! [`StaticToken`] serves a fixed token; [`OAuthTokenProvider`] obtains one
//! with a client-credentials exchange and refreshes it before it expires.

mod oauth;
mod static_token;

pub use oauth::OAuthTokenProvider;
pub use static_token::StaticToken;

use anyhow::Result;

/// Supplies the bearer token attached to first-party requests.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Makes sure a valid token is loaded, fetching or refreshing it if needed.
    async fn ensure_token_loaded(&self) -> Result<()>;

    /// The token loaded by the last successful [`ensure_token_loaded`](Self::ensure_token_loaded).
    fn current_token(&self) -> Option<String>;
}
