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


//! Three-leg DRM key exchange
//!
//! ```text
//! Start -> AwaitingCertificate -> AwaitingLicense -> Delivered
//!                                                 -> PersistedAndDelivered
//!                                                 -> Failed(kind)
//! ```
//!
//! # Modes
//! - **Online**: certificate, key request, license; the license is delivered
//!   for immediate use and nothing is stored.
//! - **Download**: same handshake with a persistable key request. The
//!   persistable key is written to the [`LicenseStore`] before it is delivered.
//! - **Offline**: no network. The stored key is delivered, or the session
//!   fails with `MissingLicense`.
//!
//! The legs run strictly in order. A failed session is not retried here.

use crate::api::client::DrmTransport;
use crate::api::license::{strip_identifier_scheme, CertificateRequest, DrmInfo, LicenseRequest};
use crate::config::ClientConfig;
use crate::crypto::platform::PlatformKeyModule;
use crate::error::{FailureKind, Result, StreamkeepError};
use crate::models::{ContentId, MediaDescriptor};
use crate::storage::licenses::LicenseStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operating mode, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Online,
    Download,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    AwaitingCertificate,
    AwaitingLicense,
    Delivered,
    PersistedAndDelivered,
    Failed(FailureKind),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Delivered | SessionState::PersistedAndDelivered | SessionState::Failed(_)
        )
    }
}

/// Result of a successful session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// License lifetime reported by the server (seconds)
    pub duration_secs: Option<i64>,
    /// Whether the server allowed persistence
    pub persistence: Option<bool>,
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct DrmContext {
    pub transport: Arc<dyn DrmTransport>,
    pub platform: Arc<dyn PlatformKeyModule>,
    pub store: Arc<dyn LicenseStore>,
    /// System name carried in `X-Drm-Info`
    pub drm_system: String,
}

impl DrmContext {
    pub fn new(
        transport: Arc<dyn DrmTransport>,
        platform: Arc<dyn PlatformKeyModule>,
        store: Arc<dyn LicenseStore>,
        drm_system: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            platform,
            store,
            drm_system: drm_system.into(),
        }
    }

    /// Context using the DRM system named in `config`
    pub fn from_config(
        transport: Arc<dyn DrmTransport>,
        platform: Arc<dyn PlatformKeyModule>,
        store: Arc<dyn LicenseStore>,
        config: &ClientConfig,
    ) -> Self {
        Self::new(transport, platform, store, config.drm_system.clone())
    }
}

/// One key exchange for one content id
pub struct KeyExchangeSession {
    mode: SessionMode,
    content_id: ContentId,
    key_identifier: String,
    drm_url: Option<String>,
    auth_token: Option<String>,
    context: DrmContext,
    state: SessionState,
    transitions: Vec<SessionState>,
}

impl KeyExchangeSession {
    pub fn new(mode: SessionMode, media: &MediaDescriptor, context: DrmContext) -> Self {
        Self {
            mode,
            content_id: media.id,
            key_identifier: media.key_identifier.clone(),
            drm_url: media.drm_url.clone(),
            auth_token: media.drm_token.clone(),
            context,
            state: SessionState::Start,
            transitions: vec![SessionState::Start],
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, in order
    pub fn transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    /// Drive the session to a terminal state
    pub async fn run(&mut self) -> Result<SessionOutcome> {
        if self.state.is_terminal() {
            return Err(StreamkeepError::invalid_state(format!(
                "Key exchange for {} already finished ({:?})",
                self.content_id, self.state
            )));
        }

        let result = match self.mode {
            SessionMode::Offline => self.run_offline().await,
            SessionMode::Online | SessionMode::Download => self.run_handshake().await,
        };

        match result {
            Ok(outcome) => {
                info!(content_id = %self.content_id, mode = ?self.mode, state = ?outcome.state, "key exchange finished");
                Ok(outcome)
            }
            Err(err) => {
                warn!(content_id = %self.content_id, mode = ?self.mode, error = %err, "key exchange failed");
                self.transition(SessionState::Failed(err.kind()));
                Err(err)
            }
        }
    }

    async fn run_offline(&mut self) -> Result<SessionOutcome> {
        let key = self
            .context
            .store
            .load(self.content_id)
            .await?
            .ok_or(StreamkeepError::MissingLicense(self.content_id))?;

        self.context.platform.deliver_persistable(key).await?;
        self.transition(SessionState::Delivered);
        Ok(SessionOutcome {
            state: SessionState::Delivered,
            duration_secs: None,
            persistence: None,
        })
    }

    async fn run_handshake(&mut self) -> Result<SessionOutcome> {
        let drm_url = self
            .drm_url
            .clone()
            .ok_or_else(|| StreamkeepError::MissingRequiredField("drm_url".to_string()))?;
        let auth_token = self
            .auth_token
            .clone()
            .ok_or_else(|| StreamkeepError::MissingRequiredField("drm_token".to_string()))?;
        let persistable = self.mode == SessionMode::Download;
        let key_id = strip_identifier_scheme(&self.key_identifier).to_string();

        self.transition(SessionState::AwaitingCertificate);
        debug!(content_id = %self.content_id, "requesting certificate");
        let certificate = self
            .context
            .transport
            .fetch_certificate(&CertificateRequest {
                drm_url: drm_url.clone(),
                auth_token: auth_token.clone(),
                drm_info: DrmInfo::for_certificate(self.context.drm_system.as_str()),
            })
            .await?;

        let challenge = self
            .context
            .platform
            .make_key_request(&certificate, &key_id, persistable)
            .await?;

        self.transition(SessionState::AwaitingLicense);
        debug!(content_id = %self.content_id, challenge_len = challenge.len(), "requesting license");
        let response = self
            .context
            .transport
            .fetch_license(&LicenseRequest {
                drm_url,
                auth_token,
                drm_info: DrmInfo::for_content(self.context.drm_system.as_str(), &key_id),
                challenge,
            })
            .await?;
        let license = response.license_material()?;

        let state = if persistable {
            let key = self.context.platform.make_persistable_key(&license).await?;
            self.context.store.save(self.content_id, &key).await?;
            self.context.platform.deliver_persistable(key).await?;
            SessionState::PersistedAndDelivered
        } else {
            self.context.platform.deliver(license).await?;
            SessionState::Delivered
        };

        self.transition(state);
        Ok(SessionOutcome {
            state,
            duration_secs: response.duration,
            persistence: response.persistence,
        })
    }

    fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.transitions.push(state);
    }
}
