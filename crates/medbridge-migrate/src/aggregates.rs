//! Aggregate summaries in the secondary store
//!
//! Recomputed from the primary store on every migration and written with
//! replace semantics: keys that dropped out are deleted, the rest upserted,
//! all in one transaction. Running it twice over the same data is a no-op.

use chrono::Utc;
use medbridge_common::store::PrimaryStore;
use medbridge_common::types::{DemographicCount, LabelCount};
use medbridge_common::ResourceKind;
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};

use crate::db::SecondaryStore;
use crate::error::Result;

/// Label kinds summarized in `label_frequencies`
pub const LABEL_KINDS: [ResourceKind; 2] = [ResourceKind::Condition, ResourceKind::MedicationOrder];

/// What a refresh wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSummary {
    pub top_conditions: Vec<LabelCount>,
    pub top_medication_orders: Vec<LabelCount>,
    pub demographics: Vec<DemographicCount>,
}

/// Recompute top-N labels and demographic counts and replace the secondary copies
#[instrument(skip(primary, secondary))]
pub async fn refresh_aggregates(
    primary: &PrimaryStore,
    secondary: &SecondaryStore,
    top_n: u32,
) -> Result<AggregateSummary> {
    let summary = AggregateSummary {
        top_conditions: primary.top_labels(ResourceKind::Condition, top_n).await?,
        top_medication_orders: primary.top_labels(ResourceKind::MedicationOrder, top_n).await?,
        demographics: primary.demographic_counts().await?,
    };

    let mut tx = secondary.pool().begin().await?;
    for kind in LABEL_KINDS {
        let labels = match kind {
            ResourceKind::Condition => &summary.top_conditions,
            _ => &summary.top_medication_orders,
        };
        replace_label_frequencies(&mut tx, kind, labels).await?;
    }
    replace_demographic_counts(&mut tx, &summary.demographics).await?;
    tx.commit().await?;

    info!(
        conditions = summary.top_conditions.len(),
        medication_orders = summary.top_medication_orders.len(),
        demographics = summary.demographics.len(),
        "Aggregates refreshed"
    );
    Ok(summary)
}

async fn replace_label_frequencies(
    tx: &mut Transaction<'static, Postgres>,
    kind: ResourceKind,
    labels: &[LabelCount],
) -> Result<()> {
    let keep: Vec<String> = labels.iter().map(|l| l.label.clone()).collect();
    sqlx::query("DELETE FROM label_frequencies WHERE kind = $1 AND NOT (label = ANY($2))")
        .bind(kind.label_kind())
        .bind(&keep)
        .execute(&mut **tx)
        .await?;

    let now = Utc::now();
    for entry in labels {
        sqlx::query(
            r#"
            INSERT INTO label_frequencies (kind, label, count, refreshed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, label)
            DO UPDATE SET count = EXCLUDED.count, refreshed_at = EXCLUDED.refreshed_at
            "#,
        )
        .bind(kind.label_kind())
        .bind(&entry.label)
        .bind(entry.count)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn replace_demographic_counts(
    tx: &mut Transaction<'static, Postgres>,
    counts: &[DemographicCount],
) -> Result<()> {
    let keep: Vec<String> = counts.iter().map(|c| c.category.clone()).collect();
    sqlx::query("DELETE FROM demographic_counts WHERE NOT (category = ANY($1))")
        .bind(&keep)
        .execute(&mut **tx)
        .await?;

    let now = Utc::now();
    for entry in counts {
        sqlx::query(
            r#"
            INSERT INTO demographic_counts (category, count, refreshed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (category)
            DO UPDATE SET count = EXCLUDED.count, refreshed_at = EXCLUDED.refreshed_at
            "#,
        )
        .bind(&entry.category)
        .bind(entry.count)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Current `label_frequencies` rows of a kind, most frequent first
pub async fn label_frequencies(
    secondary: &SecondaryStore,
    kind: ResourceKind,
) -> Result<Vec<LabelCount>> {
    Ok(sqlx::query_as::<_, LabelCount>(
        "SELECT label, count FROM label_frequencies WHERE kind = $1 ORDER BY count DESC, label",
    )
    .bind(kind.label_kind())
    .fetch_all(secondary.pool())
    .await?)
}

/// Current `demographic_counts` rows, most frequent first
pub async fn demographic_counts(secondary: &SecondaryStore) -> Result<Vec<DemographicCount>> {
    Ok(sqlx::query_as::<_, DemographicCount>(
        "SELECT category, count FROM demographic_counts ORDER BY count DESC, category",
    )
    .fetch_all(secondary.pool())
    .await?)
}
