//! Common test utilities for migration tests using testcontainers
//!
//! Each test gets its own PostgreSQL container and its own temporary primary
//! store. When no container runtime is available the tests print a notice
//! and return early.

#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::Utc;
use medbridge_common::store::{PrimaryConfig, PrimaryStore};
use medbridge_common::types::SchemaName;
use medbridge_migrate::{SecondaryConfig, SecondaryStore};
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

pub const TEST_SCHEMA: &str = "test_medical";

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        Ok(Self {
            _container: container,
            connection_string: format!("postgresql://postgres:postgres@{}:{}/postgres", host, port),
        })
    }

    /// Start a container, or `None` (with a notice) when Docker is unavailable
    pub async fn try_start() -> Option<Self> {
        match Self::start().await {
            Ok(pg) => Some(pg),
            Err(e) => {
                eprintln!("skipping PostgreSQL-backed test: {:#}", e);
                None
            }
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn secondary(&self) -> SecondaryStore {
        let schema = SchemaName::parse(TEST_SCHEMA).expect("valid schema name");
        SecondaryStore::connect(&SecondaryConfig::new(&self.connection_string, schema))
            .await
            .expect("Failed to connect to test PostgreSQL")
    }
}

// ============================================================================
// Primary store fixtures
// ============================================================================

pub struct TestPrimary {
    _dir: TempDir,
    pub store: PrimaryStore,
}

impl TestPrimary {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = PrimaryStore::open(&PrimaryConfig::at(dir.path().join("primary.db")))
            .await
            .expect("Failed to open primary store");
        Self { _dir: dir, store }
    }

    pub async fn subject(&self, id: &str, demographic: &str) {
        sqlx::query("INSERT INTO subjects (subject_id, demographic, ingested_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(demographic)
            .bind(Utc::now())
            .execute(self.store.pool())
            .await
            .expect("Failed to insert subject");
    }

    pub async fn condition(&self, subject: &str, label: &str) {
        self.label("conditions", subject, label).await;
    }

    pub async fn medication_order(&self, subject: &str, label: &str) {
        self.label("medication_orders", subject, label).await;
    }

    async fn label(&self, table: &str, subject: &str, label: &str) {
        sqlx::query(&format!(
            "INSERT INTO {} (subject_id, label, ingested_at) VALUES (?1, ?2, ?3)",
            table
        ))
        .bind(subject)
        .bind(label)
        .bind(Utc::now())
        .execute(self.store.pool())
        .await
        .expect("Failed to insert label row");
    }

    pub async fn ledger(&self, file_name: &str, checksum: Option<&str>) {
        sqlx::query("INSERT INTO ledger (file_name, content_sha256, ingested_at) VALUES (?1, ?2, ?3)")
            .bind(file_name)
            .bind(checksum)
            .bind(Utc::now())
            .execute(self.store.pool())
            .await
            .expect("Failed to insert ledger row");
    }

    /// Insert a condition whose subject does not exist
    pub async fn orphan_condition(&self, subject: &str, label: &str) {
        let mut conn = self.store.connect_private().await.expect("connection");
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut conn)
            .await
            .expect("Failed to disable foreign keys");
        sqlx::query("INSERT INTO conditions (subject_id, label, ingested_at) VALUES (?1, ?2, ?3)")
            .bind(subject)
            .bind(label)
            .bind(Utc::now())
            .execute(&mut conn)
            .await
            .expect("Failed to insert orphan");
    }

    /// A small, valid corpus: two subjects with labels and ledger entries
    pub async fn seeded() -> Self {
        let primary = Self::new().await;
        primary.subject("P1", "female").await;
        primary.subject("P2", "male").await;
        primary.subject("P3", "female").await;
        for label in ["Hypertension", "Hypertension", "Asthma"] {
            primary.condition("P1", label).await;
        }
        primary.condition("P2", "Hypertension").await;
        primary.condition("P3", "Viral sinusitis\n(disorder)").await;
        primary.medication_order("P1", "Lisinopril 10 MG").await;
        primary.medication_order("P2", "Lisinopril 10 MG").await;
        primary.medication_order("P3", "Amoxicillin 250 MG").await;
        primary.ledger("a.json", Some("ab12")).await;
        primary.ledger("b.json", None).await;
        primary
    }
}
