//! The CareerBuilder API facade.
//!
//! [`WebService`] turns a path, a [`Verb`] and [`RequestOptions`] into a
//! request, attaches the developer key and bearer token, and hands it to an
//! [`HttpClient`]. Responses come back unparsed as [`ApiResponse`]; status
//! codes are the caller's business.

mod request;
mod response;

pub use request::{
    BodyEncoding, BuildFn, DEVELOPER_KEY_PARAM, OUTPUT_JSON_PARAM, RequestBody, RequestDescriptor,
    RequestOptions, ResponseEncoding, Verb, build_delete, build_get, build_post, build_put,
    form_encode,
};
pub use response::{ApiResponse, ResponseBody};

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::config::WebServiceConfig;
use crate::error::{Result, WebServiceError};
use crate::fetch::HttpClient;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const HOST_SITE_HEADER: &str = "HostSite";

const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

/// Client for first-party API calls plus the occasional external URL.
///
/// Safe to share between tasks behind an [`Arc`]. Extra headers may be
/// changed at any time; each request copies them when it is built.
pub struct WebService<C> {
    config: WebServiceConfig,
    transport: C,
    tokens: Arc<dyn TokenProvider>,
    extra_headers: RwLock<HashMap<String, String>>,
}

impl<C: HttpClient> WebService<C> {
    pub fn new(config: WebServiceConfig, transport: C, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            config,
            transport,
            tokens,
            extra_headers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &WebServiceConfig {
        &self.config
    }

    /// Adds or overwrites a header sent with every request, including
    /// `Authorization` and `HostSite` on first-party calls. Names compare
    /// case-insensitively, so the latest call wins.
    pub fn set_extra_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut extra = self.extra_headers.write().unwrap_or_else(|e| e.into_inner());
        extra.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        extra.insert(name, value.into());
    }

    /// A copy of the current extra headers.
    pub fn extra_headers(&self) -> HashMap<String, String> {
        self.extra_headers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.call(path, Verb::Get, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.call(path, Verb::Delete, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.call(path, Verb::Put, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.call(path, Verb::Post, options).await
    }

    /// Calls a URL outside the API. `url` is used verbatim: no base URL, no
    /// developer key, no `Outputjson` flag, and only the extra headers.
    #[tracing::instrument(skip_all, fields(verb = %verb, url = %url))]
    pub async fn call_external(
        &self,
        url: &str,
        verb: Verb,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        // Same ordering as first-party calls, even though the token is unused.
        self.tokens
            .ensure_token_loaded()
            .await
            .map_err(WebServiceError::TokenAcquisition)?;

        let request = self.build_external(url, verb, &options)?;
        self.dispatch(request, options.cancel).await
    }

    /// Assembles a first-party request for `path` with the given token.
    pub fn build_request(
        &self,
        path: &str,
        verb: Verb,
        options: &RequestOptions,
        token: &str,
    ) -> Result<RequestDescriptor> {
        let url = format!("{}{}", self.config.api_url, path);
        let mut request = verb.builder()(&url, Some(&self.config.developer_key), options)?;

        let mut headers = HashMap::new();
        headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        headers.insert(HOST_SITE_HEADER.to_string(), self.config.host_site.clone());
        overlay_headers(&mut headers, self.extra_headers());
        request.headers = headers;

        Ok(request)
    }

    /// Assembles an external request: URL verbatim, extra headers only.
    pub fn build_external(
        &self,
        url: &str,
        verb: Verb,
        options: &RequestOptions,
    ) -> Result<RequestDescriptor> {
        let options = RequestOptions {
            expect_text: false,
            add_output_json: false,
            ..options.clone()
        };
        let mut request = verb.builder()(url, None, &options)?;
        request.headers = self.extra_headers();
        Ok(request)
    }

    #[tracing::instrument(skip_all, fields(verb = %verb, path = %path))]
    async fn call(&self, path: &str, verb: Verb, options: RequestOptions) -> Result<ApiResponse> {
        let token = self.load_token().await?;
        let request = self.build_request(path, verb, &options, &token)?;
        self.dispatch(request, options.cancel).await
    }

    async fn load_token(&self) -> Result<String> {
        self.tokens
            .ensure_token_loaded()
            .await
            .map_err(WebServiceError::TokenAcquisition)?;

        self.tokens.current_token().ok_or_else(|| {
            WebServiceError::TokenAcquisition(anyhow::anyhow!(
                "token provider reported success but holds no token"
            ))
        })
    }

    async fn dispatch(
        &self,
        descriptor: RequestDescriptor,
        cancel: Option<CancellationToken>,
    ) -> Result<ApiResponse> {
        let encoding = descriptor.response_encoding;
        let request = into_http_request(descriptor)?;
        debug!(
            method = %request.method(),
            has_body = request.body().is_some(),
            "Dispatching request"
        );

        let response = match cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Request cancelled before completion");
                        return Err(WebServiceError::Cancelled);
                    }
                    result = self.transport.execute(request) => result?,
                }
            }
            None => self.transport.execute(request).await?,
        };

        debug!(status = %response.status(), "Response received");
        Ok(ApiResponse::new(response, encoding))
    }
}

/// Overlays `extra` onto `headers`. Header names are case-insensitive on the
/// wire, so an extra entry replaces any existing key that differs only in case.
fn overlay_headers(headers: &mut HashMap<String, String>, extra: HashMap<String, String>) {
    for (name, value) in extra {
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        headers.insert(name, value);
    }
}

fn into_http_request(descriptor: RequestDescriptor) -> Result<reqwest::Request> {
    let url = reqwest::Url::parse(&descriptor.url).map_err(|e| WebServiceError::InvalidUrl {
        url: descriptor.url.clone(),
        reason: e.to_string(),
    })?;

    let mut headers = HeaderMap::with_capacity(descriptor.headers.len() + 2);
    for (name, value) in &descriptor.headers {
        let invalid = || WebServiceError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    }

    let mut request = reqwest::Request::new(descriptor.verb.as_method(), url);
    if let Some(body) = descriptor.body {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type()));
        }
        *request.body_mut() = Some(body.into_bytes().into());
    }
    *request.headers_mut() = headers;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::fetch::BasicClient;
    use serde_json::json;

    fn service() -> WebService<BasicClient> {
        WebService::new(
            WebServiceConfig::new("ABC123"),
            BasicClient::new().unwrap(),
            Arc::new(StaticToken::new("tok")),
        )
    }

    #[test]
    fn test_build_request_prefixes_base_url_and_sets_default_headers() {
        let service = service();
        let options = RequestOptions::new().payload(json!({"q": "engineer", "page": 2}));
        let request = service.build_request("/jobs", Verb::Get, &options, "tok").unwrap();

        assert_eq!(
            request.url,
            "https://api.careerbuilder.com/jobs?DeveloperKey=ABC123&q=engineer&page=2"
        );
        assert_eq!(request.headers.get("Authorization").unwrap(), "Bearer tok");
        assert_eq!(request.headers.get("HostSite").unwrap(), "US");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_post_apply_scenario() {
        let service = service();
        let options = RequestOptions::new().payload(json!({"resumeId": 9})).output_json();
        let request = service.build_request("/apply", Verb::Post, &options, "tok").unwrap();

        assert_eq!(
            request.url,
            "https://api.careerbuilder.com/apply?DeveloperKey=ABC123&Outputjson=true"
        );
        assert_eq!(request.body, Some(RequestBody::Json(json!({"resumeId": 9}))));
        assert_eq!(request.response_encoding, ResponseEncoding::Json);
    }

    #[test]
    fn test_extra_headers_override_defaults() {
        let service = service();
        service.set_extra_header("authorization", "Bearer override");
        service.set_extra_header("HostSite", "CA");
        service.set_extra_header("X-Trace", "1");

        let request = service
            .build_request("/jobs", Verb::Get, &RequestOptions::new(), "tok")
            .unwrap();

        assert_eq!(request.headers.len(), 3);
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer override");
        assert!(!request.headers.contains_key("Authorization"));
        assert_eq!(request.headers.get("HostSite").unwrap(), "CA");
        assert_eq!(request.headers.get("X-Trace").unwrap(), "1");
    }

    #[test]
    fn test_extra_header_names_are_case_insensitive() {
        let service = service();
        service.set_extra_header("X-A", "upper");
        service.set_extra_header("x-a", "lower");

        let extra = service.extra_headers();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra.get("x-a").unwrap(), "lower");

        let request = service
            .build_request("/jobs", Verb::Get, &RequestOptions::new(), "tok")
            .unwrap();
        let values: Vec<_> = request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("x-a"))
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(values, vec!["lower"]);
    }

    #[test]
    fn test_request_headers_are_a_snapshot() {
        let service = service();
        service.set_extra_header("X-Session", "a");
        let request = service
            .build_request("/jobs", Verb::Get, &RequestOptions::new(), "tok")
            .unwrap();
        service.set_extra_header("X-Session", "b");

        assert_eq!(request.headers.get("X-Session").unwrap(), "a");
        assert_eq!(service.extra_headers().get("X-Session").unwrap(), "b");
    }

    #[test]
    fn test_external_request_is_verbatim_without_auth_headers() {
        let service = service();
        service.set_extra_header("X-Partner", "p");
        let options = RequestOptions::new()
            .payload(json!({"a": 1}))
            .output_json()
            .expect_text();
        let request = service
            .build_external("https://other.example.com/x", Verb::Post, &options)
            .unwrap();

        assert_eq!(request.url, "https://other.example.com/x");
        assert_eq!(request.body, Some(RequestBody::Json(json!({"a": 1}))));
        assert_eq!(request.response_encoding, ResponseEncoding::Json);
        assert!(!request.headers.contains_key("Authorization"));
        assert!(!request.headers.contains_key("HostSite"));
        assert_eq!(request.headers.get("X-Partner").unwrap(), "p");
    }

    #[test]
    fn test_into_http_request_sets_body_and_content_type() {
        let service = service();
        let options = RequestOptions::new()
            .payload(json!({"first": "Ada"}))
            .form_encoded();
        let descriptor = service.build_request("/profile", Verb::Put, &options, "tok").unwrap();
        let request = into_http_request(descriptor).unwrap();

        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(request.headers().get("hostsite").unwrap(), "US");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"first=Ada");
    }

    #[test]
    fn test_into_http_request_rejects_bad_header() {
        let mut descriptor = service()
            .build_request("/jobs", Verb::Get, &RequestOptions::new(), "tok")
            .unwrap();
        descriptor.headers.insert("bad header".to_string(), "x".to_string());

        let err = into_http_request(descriptor).unwrap_err();
        assert!(matches!(err, WebServiceError::InvalidHeader { .. }));
    }

    #[test]
    fn test_into_http_request_rejects_relative_url() {
        let service = WebService::new(
            WebServiceConfig::new("K").with_api_url(""),
            BasicClient::new().unwrap(),
            Arc::new(StaticToken::new("tok")),
        );
        let descriptor = service
            .build_request("/jobs", Verb::Get, &RequestOptions::new(), "tok")
            .unwrap();

        let err = into_http_request(descriptor).unwrap_err();
        assert!(matches!(err, WebServiceError::InvalidUrl { .. }));
    }
}
