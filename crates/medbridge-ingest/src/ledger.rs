//! Ledger of ingested files
//!
//! A file name is present if and only if every entity extracted from that
//! file is committed. Marking twice is a no-op.

use chrono::{DateTime, Utc};
use medbridge_common::types::LedgerEntry;
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashSet};

use crate::catalog::CatalogEntry;
use crate::error::Result;

/// Ledger queries over the shared primary pool
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn is_processed(&self, file_name: &str) -> Result<bool> {
        is_processed(&self.pool, file_name).await
    }

    /// Record a file as ingested; returns false when it was already recorded
    pub async fn mark_processed(&self, file_name: &str, content_sha256: Option<&str>) -> Result<bool> {
        mark_processed(&self.pool, file_name, content_sha256, Utc::now()).await
    }

    pub async fn processed_names(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT file_name FROM ledger")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().collect())
    }

    pub async fn entry(&self, file_name: &str) -> Result<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            "SELECT file_name, content_sha256, ingested_at FROM ledger WHERE file_name = ?1",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Catalog entries not yet in the ledger, in name order
    pub async fn pending(
        &self,
        catalog: &BTreeMap<String, CatalogEntry>,
    ) -> Result<(Vec<CatalogEntry>, usize)> {
        let processed = self.processed_names().await?;
        let pending: Vec<CatalogEntry> = catalog
            .values()
            .filter(|entry| !processed.contains(&entry.name))
            .cloned()
            .collect();
        let already = catalog.len() - pending.len();
        Ok((pending, already))
    }
}

pub(crate) async fn is_processed<'e, E>(executor: E, file_name: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM ledger WHERE file_name = ?1")
        .bind(file_name)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Insert a ledger row through any executor, including an open transaction
pub(crate) async fn mark_processed<'e, E>(
    executor: E,
    file_name: &str,
    content_sha256: Option<&str>,
    ingested_at: DateTime<Utc>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO ledger (file_name, content_sha256, ingested_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (file_name) DO NOTHING
        "#,
    )
    .bind(file_name)
    .bind(content_sha256)
    .bind(ingested_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use medbridge_common::store::{PrimaryConfig, PrimaryStore};

    async fn open_temp() -> (tempfile::TempDir, PrimaryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PrimaryStore::open(&PrimaryConfig::at(dir.path().join("primary.db")))
            .await
            .unwrap();
        (dir, store)
    }

    fn entry(name: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            kind: "file".to_string(),
            size: None,
            sha: None,
            download_url: None,
        }
    }

    #[tokio::test]
    async fn test_mark_processed_is_idempotent() {
        let (_dir, store) = open_temp().await;
        let ledger = Ledger::new(store.pool().clone());

        assert!(!ledger.is_processed("a.json").await.unwrap());
        assert!(ledger.mark_processed("a.json", Some("abc")).await.unwrap());
        assert!(!ledger.mark_processed("a.json", Some("def")).await.unwrap());
        assert!(ledger.is_processed("a.json").await.unwrap());

        let stored = ledger.entry("a.json").await.unwrap().unwrap();
        assert_eq!(stored.content_sha256.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_concurrent_marks_record_once() {
        let (_dir, store) = open_temp().await;
        let ledger = Ledger::new(store.pool().clone());

        let (a, b) = tokio::join!(
            ledger.mark_processed("race.json", None),
            ledger.mark_processed("race.json", None)
        );
        assert_eq!([a.unwrap(), b.unwrap()].iter().filter(|inserted| **inserted).count(), 1);
        assert_eq!(ledger.processed_names().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_excludes_processed() {
        let (_dir, store) = open_temp().await;
        let ledger = Ledger::new(store.pool().clone());
        ledger.mark_processed("b.json", None).await.unwrap();

        let catalog: BTreeMap<String, CatalogEntry> = ["a.json", "b.json", "c.json"]
            .into_iter()
            .map(|name| (name.to_string(), entry(name)))
            .collect();

        let (pending, already) = ledger.pending(&catalog).await.unwrap();
        let names: Vec<&str> = pending.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "c.json"]);
        assert_eq!(already, 1);
    }
}
