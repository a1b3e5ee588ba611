use async_trait::async_trait;
use reqwest::{Request, Response};

/// Where [`WebService`](crate::web_service::WebService) sends its assembled
/// requests.
///
/// The web service never inspects status codes or retries, so an
/// implementation only has to put the request on the wire and hand back
/// whatever comes back. Connection reuse, TLS and timeouts are its concern.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// A bare [`reqwest::Client`] is a transport too, with whatever timeout
/// policy it was built with (none by default).
#[async_trait]
impl HttpClient for reqwest::Client {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        reqwest::Client::execute(self, req).await
    }
}
