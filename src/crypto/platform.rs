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


//! Platform DRM module seam
//!
//! The host app owns the actual content decryption module. The core only
//! relays opaque blobs between it and the license server.

use crate::api::license::LicenseMaterial;
use crate::error::{Result, StreamkeepError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::fmt;

/// Key object the platform can reuse without contacting the server
#[derive(Clone, PartialEq, Eq)]
pub struct PersistableKey(pub Vec<u8>);

impl PersistableKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Storage encoding
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        general_purpose::STANDARD
            .decode(encoded.trim())
            .map(PersistableKey)
            .map_err(|e| StreamkeepError::internal(format!("Corrupt persisted key: {}", e)))
    }
}

impl fmt::Debug for PersistableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistableKey({} bytes)", self.0.len())
    }
}

/// Content decryption module provided by the host platform
#[async_trait]
pub trait PlatformKeyModule: Send + Sync {
    /// Produce the opaque key request (SPC) for `content_id` from the app certificate
    async fn make_key_request(&self, certificate: &[u8], content_id: &str, persistable: bool) -> Result<Vec<u8>>;

    /// Wrap a license so it can be stored and reused offline
    async fn make_persistable_key(&self, license: &LicenseMaterial) -> Result<PersistableKey>;

    /// Hand a license to the player for immediate decryption
    async fn deliver(&self, license: LicenseMaterial) -> Result<()>;

    /// Hand a stored key to the player
    async fn deliver_persistable(&self, key: PersistableKey) -> Result<()>;
}
