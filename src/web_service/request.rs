//! Request assembly: per-verb URL, body and response-encoding rules.
//!
//! Builders are pure. They take the target URL (already prefixed with the
//! base URL for first-party calls), the developer key when one applies, and
//! the call's [`RequestOptions`], and return a [`RequestDescriptor`] without
//! headers. The dispatcher fills headers in afterwards.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WebServiceError};

pub const DEVELOPER_KEY_PARAM: &str = "DeveloperKey";
pub const OUTPUT_JSON_PARAM: &str = "Outputjson";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

/// Signature shared by the per-verb builders.
pub type BuildFn = fn(&str, Option<&str>, &RequestOptions) -> Result<RequestDescriptor>;

impl Verb {
    /// Builder routine for this verb.
    pub fn builder(self) -> BuildFn {
        match self {
            Verb::Get => build_get,
            Verb::Delete => build_delete,
            Verb::Put => build_put,
            Verb::Post => build_post,
        }
    }

    pub fn as_method(self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    #[default]
    Json,
    Form,
}

/// What the caller expects back from the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseEncoding {
    /// JSON if it parses, raw text otherwise.
    #[default]
    TransportDefault,
    Json,
    /// Raw text, used for XML endpoints.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(String),
}

impl RequestBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RequestBody::Json(value) => value.to_string().into_bytes(),
            RequestBody::Form(encoded) => encoded.into_bytes(),
        }
    }
}

/// Everything needed to put one request on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub verb: Verb,
    pub url: String,
    pub body: Option<RequestBody>,
    pub response_encoding: ResponseEncoding,
    pub headers: HashMap<String, String>,
}

impl RequestDescriptor {
    fn new(verb: Verb, url: String) -> Self {
        Self {
            verb,
            url,
            body: None,
            response_encoding: ResponseEncoding::TransportDefault,
            headers: HashMap::new(),
        }
    }
}

/// Per-call options.
///
/// `payload` is the query params for GET and DELETE and the body for PUT
/// and POST. Options that do not apply to a verb are ignored by its builder.
///
/// ```
/// use cb_api_client::web_service::RequestOptions;
/// use serde_json::json;
///
/// let options = RequestOptions::new()
///     .payload(json!({ "resumeId": 9 }))
///     .output_json();
/// assert!(options.add_output_json);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub payload: Option<Value>,
    pub body_encoding: BodyEncoding,
    pub expect_text: bool,
    pub add_output_json: bool,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Form-encode the body instead of sending it as JSON.
    pub fn form_encoded(mut self) -> Self {
        self.body_encoding = BodyEncoding::Form;
        self
    }

    /// Expect a raw text (XML) response from a POST.
    pub fn expect_text(mut self) -> Self {
        self.expect_text = true;
        self
    }

    /// Add `Outputjson=true` to a POST query string.
    pub fn output_json(mut self) -> Self {
        self.add_output_json = true;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The payload unless it is absent or JSON `null`.
    fn present_payload(&self) -> Option<&Value> {
        self.payload.as_ref().filter(|v| !v.is_null())
    }

    fn encode_body(&self) -> Result<Option<RequestBody>> {
        match (self.present_payload(), self.body_encoding) {
            (None, _) => Ok(None),
            (Some(value), BodyEncoding::Json) => Ok(Some(RequestBody::Json(value.clone()))),
            (Some(value), BodyEncoding::Form) => Ok(Some(RequestBody::Form(form_encode(value)?))),
        }
    }
}

/// Form-encodes a JSON object the way a conventional query-string
/// stringifier does: scalars are stringified, arrays repeat their key, and
/// `null` or nested objects produce an empty value.
pub fn form_encode(value: &Value) -> Result<String> {
    let Value::Object(map) = value else {
        return Err(WebServiceError::InvalidPayload(format!(
            "expected a JSON object, got {value}"
        )));
    };

    let mut pairs: Vec<(&str, String)> = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.as_str(), scalar_to_string(item))));
            }
            other => pairs.push((key.as_str(), scalar_to_string(other))),
        }
    }

    serde_urlencoded::to_string(&pairs)
        .map_err(|e| WebServiceError::InvalidPayload(e.to_string()))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn base_query(url: &str, developer_key: Option<&str>) -> String {
    match developer_key {
        Some(key) => {
            let key = serde_urlencoded::to_string([(DEVELOPER_KEY_PARAM, key)])
                .unwrap_or_else(|_| format!("{DEVELOPER_KEY_PARAM}={key}"));
            let mut full = url.to_string();
            append_query(&mut full, &key);
            full
        }
        None => url.to_string(),
    }
}

/// Appends an already encoded segment, opening the query string if the URL
/// does not have one yet.
fn append_query(url: &mut String, segment: &str) {
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(segment);
}

fn query_url(url: &str, developer_key: Option<&str>, options: &RequestOptions) -> Result<String> {
    let mut full = base_query(url, developer_key);
    if let Some(params) = options.present_payload() {
        let encoded = form_encode(params)?;
        if !encoded.is_empty() {
            append_query(&mut full, &encoded);
        }
    }
    Ok(full)
}

pub fn build_get(
    url: &str,
    developer_key: Option<&str>,
    options: &RequestOptions,
) -> Result<RequestDescriptor> {
    let url = query_url(url, developer_key, options)?;
    Ok(RequestDescriptor::new(Verb::Get, url))
}

pub fn build_delete(
    url: &str,
    developer_key: Option<&str>,
    options: &RequestOptions,
) -> Result<RequestDescriptor> {
    let url = query_url(url, developer_key, options)?;
    Ok(RequestDescriptor::new(Verb::Delete, url))
}

pub fn build_put(
    url: &str,
    developer_key: Option<&str>,
    options: &RequestOptions,
) -> Result<RequestDescriptor> {
    let mut request = RequestDescriptor::new(Verb::Put, base_query(url, developer_key));
    request.response_encoding = ResponseEncoding::Json;
    request.body = options.encode_body()?;
    Ok(request)
}

pub fn build_post(
    url: &str,
    developer_key: Option<&str>,
    options: &RequestOptions,
) -> Result<RequestDescriptor> {
    let mut full = base_query(url, developer_key);
    if options.add_output_json {
        let flag = format!("{OUTPUT_JSON_PARAM}=true");
        append_query(&mut full, &flag);
    }

    let mut request = RequestDescriptor::new(Verb::Post, full);
    request.response_encoding = if options.expect_text {
        ResponseEncoding::Text
    } else {
        ResponseEncoding::Json
    };
    request.body = options.encode_body()?;
    Ok(request)
}
