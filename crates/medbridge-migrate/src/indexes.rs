//! Secondary index disable/rebuild around the bulk load
//!
//! Definitions are captured before anything is dropped, so a rebuild never
//! depends on catalog state that the drop removed.

use medbridge_common::Table;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::db::SecondaryStore;
use crate::error::{MigrateError, Result};

/// Tables whose secondary indexes are dropped for the load
pub const BULK_LOADED_TABLES: [Table; 3] = [Table::Subjects, Table::Conditions, Table::MedicationOrders];

/// Secondary indexes the schema migrations create, with their statements
pub const EXPECTED_INDEXES: [(&str, Table, &str); 5] = [
    (
        "idx_subjects_demographic",
        Table::Subjects,
        "CREATE INDEX IF NOT EXISTS idx_subjects_demographic ON subjects (demographic)",
    ),
    (
        "idx_conditions_subject",
        Table::Conditions,
        "CREATE INDEX IF NOT EXISTS idx_conditions_subject ON conditions (subject_id)",
    ),
    (
        "idx_conditions_label",
        Table::Conditions,
        "CREATE INDEX IF NOT EXISTS idx_conditions_label ON conditions (label)",
    ),
    (
        "idx_medication_orders_subject",
        Table::MedicationOrders,
        "CREATE INDEX IF NOT EXISTS idx_medication_orders_subject ON medication_orders (subject_id)",
    ),
    (
        "idx_medication_orders_label",
        Table::MedicationOrders,
        "CREATE INDEX IF NOT EXISTS idx_medication_orders_label ON medication_orders (label)",
    ),
];

/// A dropped index and the statement that recreates it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct IndexDefinition {
    pub index_name: String,
    pub table_name: String,
    pub definition: String,
}

/// Names from [`EXPECTED_INDEXES`] absent from the schema
pub async fn missing_indexes(store: &SecondaryStore) -> Result<Vec<&'static str>> {
    let present: Vec<String> =
        sqlx::query_scalar("SELECT indexname::text FROM pg_indexes WHERE schemaname = $1")
            .bind(store.schema().as_str())
            .fetch_all(store.pool())
            .await?;

    Ok(EXPECTED_INDEXES
        .iter()
        .map(|(name, _, _)| *name)
        .filter(|name| !present.iter().any(|p| p == name))
        .collect())
}

/// Drop every non-primary-key, non-constraint index on the bulk-loaded tables
///
/// Returns the captured definitions for [`rebuild_indexes`]. All drops happen
/// in one transaction. Expected indexes that were already missing, such as
/// after a failed rebuild, are added to the returned list so the rebuild
/// restores them too.
#[instrument(skip(store), fields(schema = %store.schema()))]
pub async fn disable_indexes(store: &SecondaryStore) -> Result<Vec<IndexDefinition>> {
    let tables: Vec<String> = BULK_LOADED_TABLES.iter().map(|t| t.name().to_string()).collect();

    let mut definitions = sqlx::query_as::<_, IndexDefinition>(
        r#"
        SELECT i.relname::text AS index_name,
               t.relname::text AS table_name,
               pg_get_indexdef(ix.indexrelid) AS definition
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname::text = $1
          AND t.relname::text = ANY($2)
          AND NOT ix.indisprimary
          AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid)
        ORDER BY t.relname, i.relname
        "#,
    )
    .bind(store.schema().as_str())
    .bind(&tables)
    .fetch_all(store.pool())
    .await?;

    let mut tx = store.pool().begin().await?;
    for index in &definitions {
        let drop = format!(
            "DROP INDEX IF EXISTS {}.{}",
            store.schema().quoted(),
            quote_ident(&index.index_name)
        );
        sqlx::query(&drop)
            .execute(&mut *tx)
            .await
            .map_err(|source| MigrateError::Index {
                index: index.index_name.clone(),
                source,
            })?;
    }
    tx.commit().await?;
    info!(dropped = definitions.len(), "Secondary indexes disabled");

    for name in missing_indexes(store).await? {
        if definitions.iter().any(|d| d.index_name == name) {
            continue;
        }
        if let Some((_, table, ddl)) = EXPECTED_INDEXES.iter().find(|(n, _, _)| *n == name) {
            warn!(index = name, "Expected index was missing, scheduling it for the rebuild");
            definitions.push(IndexDefinition {
                index_name: name.to_string(),
                table_name: table.name().to_string(),
                definition: (*ddl).to_string(),
            });
        }
    }
    Ok(definitions)
}

/// Recreate indexes from captured definitions in one transaction
#[instrument(skip(store, definitions), fields(count = definitions.len()))]
pub async fn rebuild_indexes(
    store: &SecondaryStore,
    definitions: &[IndexDefinition],
    maintenance_work_mem: &str,
) -> Result<usize> {
    if definitions.is_empty() {
        return Ok(0);
    }

    let mut tx = store.pool().begin().await?;

    // Validated to <digits><unit> at config load
    sqlx::query(&format!("SET LOCAL maintenance_work_mem = '{}'", maintenance_work_mem))
        .execute(&mut *tx)
        .await?;

    for index in definitions {
        if let Err(source) = sqlx::query(&index.definition).execute(&mut *tx).await {
            // The transaction rolls back every statement, so all of them are lost
            for lost in definitions {
                error!(
                    index = %lost.index_name,
                    definition = %lost.definition,
                    "Index not rebuilt"
                );
            }
            return Err(MigrateError::Index {
                index: index.index_name.clone(),
                source,
            });
        }
    }
    tx.commit().await?;

    info!(rebuilt = definitions.len(), "Secondary indexes rebuilt");
    Ok(definitions.len())
}

/// Double-quote an identifier read from the catalog
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
