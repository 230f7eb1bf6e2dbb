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


//! Persisted license storage
//!
//! Key-value layout: `"license_<contentId>"` -> base64 persistable key.

use crate::crypto::platform::PersistableKey;
use crate::error::Result;
use crate::models::ContentId;
use crate::storage::database::Database;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Storage key for a content id's persisted license
pub fn license_key(id: ContentId) -> String {
    format!("license_{}", id)
}

#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Insert or replace the key for `id`
    async fn save(&self, id: ContentId, key: &PersistableKey) -> Result<()>;

    async fn load(&self, id: ContentId) -> Result<Option<PersistableKey>>;

    /// Returns true if a key was removed
    async fn remove(&self, id: ContentId) -> Result<bool>;
}

/// SQLite-backed store (`PersistedKeys` table)
#[derive(Debug, Clone)]
pub struct SqliteLicenseStore {
    db: Database,
}

impl SqliteLicenseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl LicenseStore for SqliteLicenseStore {
    async fn save(&self, id: ContentId, key: &PersistableKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO PersistedKeys (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(license_key(id))
        .bind(key.to_base64())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        debug!(content_id = %id, "persisted license");
        Ok(())
    }

    async fn load(&self, id: ContentId) -> Result<Option<PersistableKey>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM PersistedKeys WHERE key = ?")
            .bind(license_key(id))
            .fetch_optional(self.db.pool())
            .await?;

        value.as_deref().map(PersistableKey::from_base64).transpose()
    }

    async fn remove(&self, id: ContentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM PersistedKeys WHERE key = ?")
            .bind(license_key(id))
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory store for tests and hosts without a database
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn save(&self, id: ContentId, key: &PersistableKey) -> Result<()> {
        self.entries.lock().insert(license_key(id), key.to_base64());
        Ok(())
    }

    async fn load(&self, id: ContentId) -> Result<Option<PersistableKey>> {
        let value = self.entries.lock().get(&license_key(id)).cloned();
        value.as_deref().map(PersistableKey::from_base64).transpose()
    }

    async fn remove(&self, id: ContentId) -> Result<bool> {
        Ok(self.entries.lock().remove(&license_key(id)).is_some())
    }
}
