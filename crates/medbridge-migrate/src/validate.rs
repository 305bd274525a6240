//! Referential integrity check of the primary store
//!
//! Runs before anything touches the secondary store. Violations are reported
//! as a bounded sample plus a remainder count.

use medbridge_common::Table;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::error::Result;

/// Offending rows listed per check
pub const SAMPLE_SIZE: i64 = 5;

/// One integrity check's findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViolationSample {
    pub total: i64,
    pub sample: Vec<String>,
}

impl ViolationSample {
    pub fn remainder(&self) -> i64 {
        (self.total - self.sample.len() as i64).max(0)
    }

    fn describe(&self, what: &str, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} [{}]", self.total, what, self.sample.join(", "))?;
        if self.remainder() > 0 {
            write!(f, " and {} more", self.remainder())?;
        }
        Ok(())
    }
}

/// Findings of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub invalid_subjects: ViolationSample,
    pub orphan_conditions: ViolationSample,
    pub orphan_medication_orders: ViolationSample,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> i64 {
        self.invalid_subjects.total
            + self.orphan_conditions.total
            + self.orphan_medication_orders.total
    }
}

impl std::fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.invalid_subjects.total > 0 {
            parts.push((&self.invalid_subjects, "subject row(s) with a null or empty id"));
        }
        if self.orphan_conditions.total > 0 {
            parts.push((&self.orphan_conditions, "condition row(s) referencing a missing subject"));
        }
        if self.orphan_medication_orders.total > 0 {
            parts.push((
                &self.orphan_medication_orders,
                "medication order row(s) referencing a missing subject",
            ));
        }

        if parts.is_empty() {
            return f.write_str("no violations");
        }
        for (i, (sample, what)) in parts.into_iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            sample.describe(what, f)?;
        }
        Ok(())
    }
}

/// Scan the primary store for rows that would break the secondary schema
#[instrument(skip(pool))]
pub async fn validate_primary(pool: &SqlitePool) -> Result<IntegrityReport> {
    let report = IntegrityReport {
        invalid_subjects: invalid_subjects(pool).await?,
        orphan_conditions: orphans(pool, Table::Conditions).await?,
        orphan_medication_orders: orphans(pool, Table::MedicationOrders).await?,
    };

    if report.is_clean() {
        info!("Primary store passed integrity validation");
    } else {
        warn!(violations = report.total(), details = %report, "Primary store failed integrity validation");
    }
    Ok(report)
}

async fn invalid_subjects(pool: &SqlitePool) -> Result<ViolationSample> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM subjects WHERE subject_id IS NULL OR TRIM(subject_id) = ''",
    )
    .fetch_one(pool)
    .await?;

    let rowids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT rowid FROM subjects
        WHERE subject_id IS NULL OR TRIM(subject_id) = ''
        ORDER BY rowid
        LIMIT ?1
        "#,
    )
    .bind(SAMPLE_SIZE)
    .fetch_all(pool)
    .await?;

    Ok(ViolationSample {
        total,
        sample: rowids.into_iter().map(|id| format!("rowid {}", id)).collect(),
    })
}

async fn orphans(pool: &SqlitePool, table: Table) -> Result<ViolationSample> {
    let from = format!(
        "FROM {t} c LEFT JOIN subjects s ON s.subject_id = c.subject_id WHERE s.subject_id IS NULL",
        t = table.name()
    );

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", from))
        .fetch_one(pool)
        .await?;

    let rows: Vec<(i64, Option<String>)> =
        sqlx::query_as(&format!("SELECT c.id, c.subject_id {} ORDER BY c.id LIMIT ?1", from))
            .bind(SAMPLE_SIZE)
            .fetch_all(pool)
            .await?;

    Ok(ViolationSample {
        total,
        sample: rows
            .into_iter()
            .map(|(id, subject)| {
                format!("id {} -> {}", id, subject.as_deref().unwrap_or("NULL"))
            })
            .collect(),
    })
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

    /// Insert rows the schema would normally refuse
    async fn insert_unchecked(store: &PrimaryStore, sql: &str) {
        let mut conn = store.connect_private().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut conn).await.unwrap();
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_store_passes() {
        let (_dir, store) = open_temp().await;
        insert_unchecked(
            &store,
            "INSERT INTO subjects VALUES ('P1', 'female', '2024-01-01T00:00:00+00:00')",
        )
        .await;
        insert_unchecked(
            &store,
            "INSERT INTO conditions (subject_id, label, ingested_at) VALUES ('P1', 'Asthma', '2024-01-01T00:00:00+00:00')",
        )
        .await;

        let report = validate_primary(store.pool()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.to_string(), "no violations");
    }

    #[tokio::test]
    async fn test_orphans_are_sampled() {
        let (_dir, store) = open_temp().await;
        for i in 0..7 {
            insert_unchecked(
                &store,
                &format!(
                    "INSERT INTO conditions (subject_id, label, ingested_at) VALUES ('ghost{}', 'x', '2024-01-01T00:00:00+00:00')",
                    i
                ),
            )
            .await;
        }
        insert_unchecked(
            &store,
            "INSERT INTO subjects VALUES ('', 'unknown', '2024-01-01T00:00:00+00:00')",
        )
        .await;

        let report = validate_primary(store.pool()).await.unwrap();
        assert_eq!(report.orphan_conditions.total, 7);
        assert_eq!(report.orphan_conditions.sample.len(), 5);
        assert_eq!(report.orphan_conditions.remainder(), 2);
        assert_eq!(report.orphan_conditions.sample[0], "id 1 -> ghost0");
        assert_eq!(report.invalid_subjects.total, 1);
        assert_eq!(report.orphan_medication_orders.total, 0);
        assert_eq!(report.total(), 8);

        let text = report.to_string();
        assert!(text.contains("7 condition row(s)"));
        assert!(text.contains("and 2 more"));
        assert!(!text.contains("medication"));
    }
}
