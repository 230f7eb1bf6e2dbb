//! Offline playback core for mobile video clients
//!
//! - [`cache`] - single-flight metadata caches
//! - [`crypto`] - DRM key exchange (online, download, offline)
//! - [`manifest`] - HLS playlist interception and subtitle injection
//! - [`download`] - download tree with aggregated progress
//! - [`storage`] - persisted keys and the offline catalog

pub mod api;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod manifest;
pub mod models;
pub mod storage;

pub use error::{Result, StreamkeepError};
pub use models::{ContentId, MediaDescriptor};
