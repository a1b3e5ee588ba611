use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::request::ResponseEncoding;
use crate::error::Result;

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// The transport's response, untouched, paired with the encoding the
/// request asked for. Error statuses are returned like any other.
#[derive(Debug)]
pub struct ApiResponse {
    inner: reqwest::Response,
    encoding: ResponseEncoding,
}

impl ApiResponse {
    pub(crate) fn new(inner: reqwest::Response, encoding: ResponseEncoding) -> Self {
        Self { inner, encoding }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn encoding(&self) -> ResponseEncoding {
        self.encoding
    }

    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }

    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.inner.bytes().await?)
    }

    pub async fn text(self) -> Result<String> {
        Ok(self.inner.text().await?)
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(self.inner.json().await?)
    }

    /// Reads the body according to the expected encoding.
    ///
    /// `Text` is never parsed. Otherwise a body that is not valid JSON comes
    /// back as text, and an empty body under `Json` reads as `null`.
    pub async fn body(self) -> Result<ResponseBody> {
        let encoding = self.encoding;
        let raw = self.bytes().await?;
        decode_body(&raw, encoding)
    }
}

fn decode_body(raw: &[u8], encoding: ResponseEncoding) -> Result<ResponseBody> {
    let text = || String::from_utf8_lossy(raw).into_owned();
    match encoding {
        ResponseEncoding::Text => Ok(ResponseBody::Text(text())),
        ResponseEncoding::Json if raw.is_empty() => Ok(ResponseBody::Json(Value::Null)),
        ResponseEncoding::Json => match serde_json::from_slice(raw) {
            Ok(value) => Ok(ResponseBody::Json(value)),
            Err(_) => Ok(ResponseBody::Text(text())),
        },
        ResponseEncoding::TransportDefault => Ok(serde_json::from_slice(raw)
            .map(ResponseBody::Json)
            .unwrap_or_else(|_| ResponseBody::Text(text()))),
    }
}
