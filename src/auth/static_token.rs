use anyhow::Result;

use super::TokenProvider;

/// A token that never changes, e.g. one passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn ensure_token_loaded(&self) -> Result<()> {
        Ok(())
    }

    fn current_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
