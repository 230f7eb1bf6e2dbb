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


//! DRM key exchange
//!
//! # Modules
//! - [`platform`] - seam to the host's content decryption module
//! - [`session`] - certificate / key request / license state machine

pub mod platform;
pub mod session;

pub use crate::error::FailureKind;
pub use platform::{PersistableKey, PlatformKeyModule};
pub use session::{DrmContext, KeyExchangeSession, SessionMode, SessionOutcome, SessionState};
