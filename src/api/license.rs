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


//! DRM certificate and license wire formats
//!
//! # Certificate leg
//! **GET** `<drmUrl>`
//! - `Authorization: Bearer <jwt>`
//! - `X-Drm-Info: base64({"system": "...", "keyIds": null})`
//!
//! Response body: base64 certificate bytes.
//!
//! # License leg
//! **POST** `<drmUrl>` (`application/x-www-form-urlencoded`)
//! - `Authorization: Bearer <jwt>`
//! - `CustomData: <jwt>`
//! - `X-Drm-Info: base64({"system": "...", "keyIds": ["<contentId>"]})`
//! - body: `challenge=<base64(spc)>`
//!
//! Response body (JSON):
//! ```json
//! { "response": "<base64 license>", "duration": 86400, "persistence": true }
//! ```

use crate::error::{Result, StreamkeepError};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DRM_INFO_HEADER: &str = "X-Drm-Info";
pub const CUSTOM_DATA_HEADER: &str = "CustomData";

/// System descriptor carried in the `X-Drm-Info` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmInfo {
    pub system: String,
    #[serde(rename = "keyIds")]
    pub key_ids: Option<Vec<String>>,
}

impl DrmInfo {
    /// Descriptor for the certificate leg (`keyIds: null`)
    pub fn for_certificate<S: Into<String>>(system: S) -> Self {
        Self {
            system: system.into(),
            key_ids: None,
        }
    }

    /// Per-content descriptor for the license leg
    pub fn for_content<S: Into<String>>(system: S, content_id: &str) -> Self {
        Self {
            system: system.into(),
            key_ids: Some(vec![content_id.to_string()]),
        }
    }

    /// base64(JSON) header value
    pub fn header_value(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

/// First leg: fetch the application certificate
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub drm_url: String,
    pub auth_token: String,
    pub drm_info: DrmInfo,
}

/// Third leg: exchange the platform key request for a license
#[derive(Clone)]
pub struct LicenseRequest {
    pub drm_url: String,
    pub auth_token: String,
    pub drm_info: DrmInfo,
    /// Opaque key request (SPC) produced by the platform
    pub challenge: Vec<u8>,
}

impl LicenseRequest {
    /// Form fields of the POST body
    pub fn form_body(&self) -> [(&'static str, String); 1] {
        [("challenge", general_purpose::STANDARD.encode(&self.challenge))]
    }
}

impl fmt::Debug for LicenseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseRequest")
            .field("drm_url", &self.drm_url)
            .field("drm_info", &self.drm_info)
            .field("challenge_len", &self.challenge.len())
            .finish()
    }
}

/// License server answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseResponse {
    /// base64 license bytes
    pub response: String,
    /// License lifetime in seconds
    #[serde(default)]
    pub duration: Option<i64>,
    /// Whether the server allows the license to be persisted
    #[serde(default)]
    pub persistence: Option<bool>,
}

impl LicenseResponse {
    pub fn license_material(&self) -> Result<LicenseMaterial> {
        general_purpose::STANDARD
            .decode(self.response.trim())
            .map(LicenseMaterial)
            .map_err(|e| StreamkeepError::invalid_response(format!("Invalid base64 license: {}", e), None))
    }
}

/// Opaque license blob, relayed to the platform and never inspected
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseMaterial(pub Vec<u8>);

impl LicenseMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LicenseMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LicenseMaterial({} bytes)", self.0.len())
    }
}

/// Decode the certificate leg's base64 body
pub fn decode_certificate(body: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|e| StreamkeepError::invalid_response(format!("Invalid base64 certificate: {}", e), None))
}

/// Strip the scheme tag from a wire key identifier ("skd://1234" -> "1234")
pub fn strip_identifier_scheme(identifier: &str) -> &str {
    match identifier.find("://") {
        Some(pos) => &identifier[pos + 3..],
        None => identifier,
    }
}
