use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

/// [`HttpClient`] backed directly by a [`reqwest::Client`].
#[derive(Clone)]
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Builds a client with a 30 s request timeout and a 10 s connect timeout.
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
