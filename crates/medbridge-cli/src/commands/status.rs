//! `medbridge status` command implementation
//!
//! Read-only summary of the primary store.

use anyhow::{Context, Result};
use medbridge_common::store::{PrimaryStore, TableCounts};
use medbridge_common::types::{DemographicCount, LabelCount};
use medbridge_common::ResourceKind;
use serde::Serialize;

use crate::{Cli, StatusArgs};

/// What `medbridge status` reports
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub primary_db: String,
    pub counts: TableCounts,
    pub top_conditions: Vec<LabelCount>,
    pub top_medication_orders: Vec<LabelCount>,
    pub demographics: Vec<DemographicCount>,
}

/// Show ledger size, entity counts, top labels and demographics
pub async fn run(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let store = super::open_primary(cli).await?;
    let result = collect(&store, args.top_n).await;
    store.close().await;
    let summary = result?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to encode status")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

pub async fn collect(store: &PrimaryStore, top_n: u32) -> Result<StatusSummary> {
    Ok(StatusSummary {
        primary_db: store.path().display().to_string(),
        counts: store.table_counts().await.context("Failed to count rows")?,
        top_conditions: store
            .top_labels(ResourceKind::Condition, top_n)
            .await
            .context("Failed to rank condition labels")?,
        top_medication_orders: store
            .top_labels(ResourceKind::MedicationOrder, top_n)
            .await
            .context("Failed to rank medication labels")?,
        demographics: store
            .demographic_counts()
            .await
            .context("Failed to count demographics")?,
    })
}

fn print_summary(summary: &StatusSummary) {
    println!("Primary store: {}", summary.primary_db);
    println!();
    println!("Ledger entries:     {}", summary.counts.ledger);
    println!("Subjects:           {}", summary.counts.subjects);
    println!("Conditions:         {}", summary.counts.conditions);
    println!("Medication orders:  {}", summary.counts.medication_orders);

    print_labels("Top conditions", &summary.top_conditions);
    print_labels("Top medication orders", &summary.top_medication_orders);

    println!();
    println!("Demographics:");
    if summary.demographics.is_empty() {
        println!("  (none)");
    }
    for entry in &summary.demographics {
        println!("  {:>8}  {}", entry.count, entry.category);
    }
}

fn print_labels(title: &str, labels: &[LabelCount]) {
    println!();
    println!("{}:", title);
    if labels.is_empty() {
        println!("  (none)");
    }
    for entry in labels {
        println!("  {:>8}  {}", entry.count, entry.label);
    }
}
