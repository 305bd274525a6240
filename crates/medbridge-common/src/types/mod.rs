//! Domain types shared by the ingestion and migration phases

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{MedbridgeError, Result};

mod sanitize;

pub use sanitize::{sanitize_label, strip_line_breaks};

/// Demographic category recorded when a subject does not state one
pub const UNKNOWN_DEMOGRAPHIC: &str = "unknown";

// ============================================================================
// Resource kinds
// ============================================================================

/// Resource kinds the loader understands inside a bundle
///
/// The wire names are the ones used by the upstream corpus
/// (`Patient`, `Condition`, `MedicationRequest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Subject,
    Condition,
    MedicationOrder,
}

impl ResourceKind {
    /// Map a bundle `resourceType` to a kind; unknown types are ignored by the loader
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" => Some(ResourceKind::Subject),
            "Condition" => Some(ResourceKind::Condition),
            "MedicationRequest" => Some(ResourceKind::MedicationOrder),
            _ => None,
        }
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Subject => "Patient",
            ResourceKind::Condition => "Condition",
            ResourceKind::MedicationOrder => "MedicationRequest",
        }
    }

    /// Aggregate key used in the label frequency table
    pub fn label_kind(self) -> &'static str {
        match self {
            ResourceKind::Subject => "subject",
            ResourceKind::Condition => "condition",
            ResourceKind::MedicationOrder => "medication_order",
        }
    }
}

// ============================================================================
// Tables
// ============================================================================

/// The fixed set of tables shared by the primary and secondary stores
///
/// SQL never interpolates a table name from anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Subjects,
    Conditions,
    MedicationOrders,
    Ledger,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Subjects,
        Table::Conditions,
        Table::MedicationOrders,
        Table::Ledger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Subjects => "subjects",
            Table::Conditions => "conditions",
            Table::MedicationOrders => "medication_orders",
            Table::Ledger => "ledger",
        }
    }

    /// Columns carried between stores, in copy order (surrogate ids stay behind)
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Subjects => &["subject_id", "demographic", "ingested_at"],
            Table::Conditions => &["subject_id", "label", "ingested_at"],
            Table::MedicationOrders => &["subject_id", "label", "ingested_at"],
            Table::Ledger => &["file_name", "content_sha256", "ingested_at"],
        }
    }

    /// Tables whose rows reference `subjects`
    pub fn references_subjects(self) -> bool {
        matches!(self, Table::Conditions | Table::MedicationOrders)
    }

    /// Label-bearing table for a resource kind
    pub fn for_label_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Condition => Some(Table::Conditions),
            ResourceKind::MedicationOrder => Some(Table::MedicationOrders),
            ResourceKind::Subject => None,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Identifiers
// ============================================================================

#[allow(clippy::expect_used)]
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("identifier pattern is valid"))
}

/// A schema name checked once against the identifier allow-list
///
/// Only a `SchemaName` may be spliced into DDL; every other value is bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn parse(raw: &str) -> Result<Self> {
        let candidate = raw.trim();
        if identifier_pattern().is_match(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(MedbridgeError::InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for DDL
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::str::FromStr for SchemaName {
    type Err = MedbridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A subject (patient) row; first write wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub subject_id: String,
    pub demographic: String,
    pub ingested_at: DateTime<Utc>,
}

/// A condition or medication-order row; append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LabelRecord {
    pub subject_id: String,
    pub label: String,
    pub ingested_at: DateTime<Utc>,
}

/// Idempotency witness for an ingested file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub file_name: String,
    pub content_sha256: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// A label and how often it occurs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// A demographic category and how many subjects carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DemographicCount {
    pub category: String,
    pub count: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_mapping() {
        assert_eq!(ResourceKind::from_resource_type("Patient"), Some(ResourceKind::Subject));
        assert_eq!(
            ResourceKind::from_resource_type("MedicationRequest"),
            Some(ResourceKind::MedicationOrder)
        );
        assert_eq!(ResourceKind::from_resource_type("Encounter"), None);
        assert_eq!(ResourceKind::Condition.resource_type(), "Condition");
    }

    #[test]
    fn test_table_columns_are_stable() {
        assert_eq!(Table::Subjects.columns(), &["subject_id", "demographic", "ingested_at"]);
        assert_eq!(Table::Ledger.columns()[0], "file_name");
        assert!(Table::Conditions.references_subjects());
        assert!(!Table::Ledger.references_subjects());
        assert_eq!(Table::for_label_kind(ResourceKind::Subject), None);
    }

    #[test]
    fn test_schema_name_accepts_identifiers() {
        assert_eq!(SchemaName::parse("test_medical").unwrap().as_str(), "test_medical");
        assert_eq!(SchemaName::parse(" _staging2 ").unwrap().quoted(), "\"_staging2\"");
    }

    #[test]
    fn test_schema_name_rejects_injection() {
        for raw in ["", "Public", "1abc", "a;drop table x", "a\"b", "a.b", &"x".repeat(64)] {
            assert!(SchemaName::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
