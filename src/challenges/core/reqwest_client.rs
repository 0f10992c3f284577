//! Reqwest-based implementation of the `PortalHttpClient` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that converts between the
//! shared HTTP representations used by the protocol core and the concrete
//! transport.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap as HttpHeaderMap, HeaderName as HttpHeaderName, HeaderValue as HttpHeaderValue};
use reqwest::{Client, Method, header::HeaderMap};

use super::{PortalHttpClient, PreparedRequest, RawResponse, TransportError};

/// Reqwest-backed portal transport.
///
/// Built without a cookie store; session cookies are attached per request.
pub struct ReqwestPortalClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestPortalClient {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Wrap an existing reqwest client. The client must not carry a cookie
    /// store, otherwise cookies from one session leak into the next.
    pub fn from_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl PortalHttpClient for ReqwestPortalClient {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let method = map_method(&request.method)?;
        let headers = convert_headers(&request.headers)?;

        let mut builder = self
            .client
            .request(method.clone(), request.url.as_str())
            .headers(headers);

        if method != Method::GET || !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, self.timeout))?;
        to_raw_response(response).await
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}

fn map_method(method: &http::Method) -> Result<Method, TransportError> {
    Method::from_bytes(method.as_str().as_bytes())
        .map_err(|err| TransportError::InvalidRequest(err.to_string()))
}

fn convert_headers(headers: &HttpHeaderMap) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn to_raw_response(response: reqwest::Response) -> Result<RawResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = convert_back_headers(response.headers())?;
    let url = response.url().clone();
    let body = response
        .bytes()
        .await
        .map_err(|err| TransportError::Body(err.to_string()))?;

    Ok(RawResponse {
        status,
        headers,
        body,
        url,
    })
}

fn convert_back_headers(map: &HeaderMap) -> Result<HttpHeaderMap, TransportError> {
    let mut headers = HttpHeaderMap::new();
    for (name, value) in map.iter() {
        let http_name = HttpHeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::Body(err.to_string()))?;
        let http_value = HttpHeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::Body(err.to_string()))?;
        // `append` keeps repeated Set-Cookie headers.
        headers.append(http_name, http_value);
    }
    Ok(headers)
}
