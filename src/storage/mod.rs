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


//! Durable state
//!
//! - [`database`] / [`migrations`] - SQLite pool and schema
//! - [`licenses`] - persisted DRM keys (`PersistedKeys` table)
//! - [`catalog`] - JSON catalog of downloaded top-level items
//!
//! # Usage Example
//! ```no_run
//! use streamkeep_core::storage::{Database, LicenseStore, SqliteLicenseStore};
//! use streamkeep_core::models::ContentId;
//!
//! # async fn example() -> streamkeep_core::error::Result<()> {
//! let db = Database::new("./licenses.db").await?;
//! let store = SqliteLicenseStore::new(db);
//! let key = store.load(ContentId(1234)).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod database;
pub mod licenses;
pub mod migrations;

pub use catalog::{CatalogEntry, CatalogKind, CatalogMetadata, OfflineCatalog};
pub use database::Database;
pub use licenses::{license_key, LicenseStore, MemoryLicenseStore, SqliteLicenseStore};
