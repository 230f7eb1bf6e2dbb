// Streamkeep - offline playback core for mobile video clients
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP client for the DRM server and manifest fetches
//!
//! [`ApiClient`] is the production implementation of the two network seams
//! the core depends on:
//!
//! - [`DrmTransport`] - certificate and license legs of the key exchange
//! - [`ManifestSource`] - raw bytes of a manifest behind a real URL
//!
//! Tests swap in fakes for both traits.
//!
//! # Error mapping
//! - connect / timeout / dropped body: `Transport`
//! - non-2xx: `Protocol` with status and endpoint (query stripped)
//! - 2xx with an unusable body: `InvalidResponse`
//!
//! Nothing here retries. Callers decide whether to run the operation again.

use crate::api::license::{
    decode_certificate, CertificateRequest, LicenseRequest, LicenseResponse, CUSTOM_DATA_HEADER,
    DRM_INFO_HEADER,
};
use crate::config::ClientConfig;
use crate::error::{Result, StreamkeepError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Certificate and license legs of the key exchange
#[async_trait]
pub trait DrmTransport: Send + Sync {
    /// Fetch and decode the application certificate
    async fn fetch_certificate(&self, request: &CertificateRequest) -> Result<Vec<u8>>;

    /// Exchange a platform key request for a license
    async fn fetch_license(&self, request: &LicenseRequest) -> Result<LicenseResponse>;
}

/// Fetches manifests behind real URLs
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// reqwest-backed client for the DRM server and CDN
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| StreamkeepError::InvalidInput(format!("Invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Underlying reqwest client, shared with the transfer client
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn auth_headers(&self, auth_token: &str, drm_info: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", auth_token))
                .map_err(|_| StreamkeepError::InvalidInput("Auth token is not a valid header value".to_string()))?,
        );
        headers.insert(
            DRM_INFO_HEADER,
            HeaderValue::from_str(drm_info)
                .map_err(|e| StreamkeepError::InvalidInput(format!("Invalid DRM descriptor: {}", e)))?,
        );
        Ok(headers)
    }

    /// Read a 2xx body as text, or map the failure
    async fn read_body(&self, response: Response) -> Result<String> {
        let status = response.status();
        let endpoint = endpoint_of(response.url());

        if !status.is_success() {
            return self.handle_error_response(response).await;
        }

        response.text().await.map_err(|e| {
            StreamkeepError::protocol(
                format!("Failed to read response body: {}", e),
                Some(status.as_u16()),
                Some(endpoint),
            )
        })
    }

    async fn handle_error_response<T>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let endpoint = endpoint_of(response.url());
        let error_body = response.text().await.unwrap_or_default();

        warn!(status = status.as_u16(), endpoint = %endpoint, "request rejected");
        Err(StreamkeepError::protocol(
            format!("Request failed with {}: {}", status, snippet(&error_body)),
            Some(status.as_u16()),
            Some(endpoint),
        ))
    }
}

#[async_trait]
impl DrmTransport for ApiClient {
    async fn fetch_certificate(&self, request: &CertificateRequest) -> Result<Vec<u8>> {
        let drm_info = request.drm_info.header_value()?;
        let headers = self.auth_headers(&request.auth_token, &drm_info)?;

        debug!(url = %strip_query(&request.drm_url), "fetching DRM certificate");
        let response = self
            .client
            .get(&request.drm_url)
            .headers(headers)
            .send()
            .await
            .map_err(map_send_error)?;

        let body = self.read_body(response).await?;
        decode_certificate(&body)
    }

    async fn fetch_license(&self, request: &LicenseRequest) -> Result<LicenseResponse> {
        let drm_info = request.drm_info.header_value()?;
        let mut headers = self.auth_headers(&request.auth_token, &drm_info)?;
        headers.insert(
            CUSTOM_DATA_HEADER,
            HeaderValue::from_str(&request.auth_token)
                .map_err(|_| StreamkeepError::InvalidInput("Auth token is not a valid header value".to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        debug!(url = %strip_query(&request.drm_url), "requesting license");
        let response = self
            .client
            .post(&request.drm_url)
            .headers(headers)
            .form(&request.form_body())
            .send()
            .await
            .map_err(map_send_error)?;

        let body = self.read_body(response).await?;
        serde_json::from_str::<LicenseResponse>(&body).map_err(|e| {
            StreamkeepError::invalid_response(format!("Unexpected license response: {}", e), None)
        })
    }
}

#[async_trait]
impl ManifestSource for ApiClient {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(url = %endpoint_of(url), "fetching manifest");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return self.handle_error_response(response).await;
        }

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            StreamkeepError::protocol(
                format!("Failed to read manifest body: {}", e),
                Some(status.as_u16()),
                Some(endpoint_of(url)),
            )
        })?;
        Ok(bytes.to_vec())
    }
}

/// Map a send failure to a transport error
pub(crate) fn map_send_error(error: reqwest::Error) -> StreamkeepError {
    let is_transient = error.is_timeout() || error.is_connect() || error.is_request();
    StreamkeepError::transport(error.without_url().to_string(), is_transient)
}

/// URL without query or fragment, safe to log
fn endpoint_of(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

fn strip_query(url: &str) -> &str {
    url.split(|c| c == '?' || c == '#').next().unwrap_or(url)
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
