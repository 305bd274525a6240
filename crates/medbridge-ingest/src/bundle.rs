//! Bundle parsing
//!
//! A bundle is a JSON document with an `entry` array whose members wrap a
//! `resource`. Only the fields the primary store keeps are decoded, and every
//! field is optional at the serde level so that unrelated resource shapes
//! never fail the document.

use medbridge_common::types::{sanitize_label, ResourceKind, UNKNOWN_DEMOGRAPHIC};
use serde::Deserialize;

use crate::error::{IngestError, Result};

#[derive(Debug, Default, Deserialize)]
struct RawBundle {
    #[serde(default)]
    entry: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    resource: RawResource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    code: Option<RawCodeable>,
    #[serde(default)]
    medication_codeable_concept: Option<RawCodeable>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCodeable {
    #[serde(default)]
    text: Option<String>,
}

impl RawResource {
    fn kind(&self) -> Option<ResourceKind> {
        self.resource_type
            .as_deref()
            .and_then(ResourceKind::from_resource_type)
    }

    fn label(&self) -> Option<&str> {
        match self.kind()? {
            ResourceKind::Condition => self.code.as_ref()?.text.as_deref(),
            ResourceKind::MedicationOrder => self.medication_codeable_concept.as_ref()?.text.as_deref(),
            ResourceKind::Subject => None,
        }
    }
}

/// Entities extracted from one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBundle {
    pub subject_id: String,
    pub demographic: String,
    pub conditions: Vec<String>,
    pub medication_orders: Vec<String>,
}

impl ParsedBundle {
    pub fn label_count(&self) -> usize {
        self.conditions.len() + self.medication_orders.len()
    }
}

/// Outcome of parsing a well-formed bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleContent {
    Parsed(ParsedBundle),
    /// No subject entry; the file is skipped and left unrecorded
    NoSubject,
}

/// Parse staged bundle bytes
///
/// The first subject entry owns every label in the document. A subject with
/// no identifier is malformed. Labels are sanitized and empty ones dropped.
pub fn parse_bundle(file_name: &str, bytes: &[u8]) -> Result<BundleContent> {
    let bundle: RawBundle =
        serde_json::from_slice(bytes).map_err(|e| IngestError::parse(file_name, e.to_string()))?;

    let Some(subject) = bundle
        .entry
        .iter()
        .map(|e| &e.resource)
        .find(|r| r.kind() == Some(ResourceKind::Subject))
    else {
        return Ok(BundleContent::NoSubject);
    };

    let subject_id = subject
        .id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| IngestError::parse(file_name, "subject entry has no id"))?
        .to_string();

    let demographic = subject
        .gender
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(UNKNOWN_DEMOGRAPHIC)
        .to_string();

    let mut conditions = Vec::new();
    let mut medication_orders = Vec::new();
    for resource in bundle.entry.iter().map(|e| &e.resource) {
        let Some(raw) = resource.label() else {
            continue;
        };
        let label = sanitize_label(raw);
        if label.is_empty() {
            continue;
        }
        match resource.kind() {
            Some(ResourceKind::Condition) => conditions.push(label),
            Some(ResourceKind::MedicationOrder) => medication_orders.push(label),
            _ => {}
        }
    }

    Ok(BundleContent::Parsed(ParsedBundle {
        subject_id,
        demographic,
        conditions,
        medication_orders,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parsed(bytes: &[u8]) -> ParsedBundle {
        match parse_bundle("t.json", bytes).unwrap() {
            BundleContent::Parsed(p) => p,
            BundleContent::NoSubject => panic!("expected a subject"),
        }
    }

    #[test]
    fn test_parse_extracts_subject_and_labels() {
        let doc = serde_json::json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "P1", "gender": "female" } },
                { "resource": { "resourceType": "Condition", "code": { "text": "Hypertension" } } },
                { "resource": { "resourceType": "Encounter", "id": "E1" } },
                { "resource": { "resourceType": "MedicationRequest",
                                "medicationCodeableConcept": { "text": "Acetaminophen 325 MG / Oxycodone [Percocet]" } } },
                { "resource": { "resourceType": "Condition", "code": { "text": "" } } },
                { "resource": { "resourceType": "Condition" } }
            ]
        });
        let bundle = parsed(&serde_json::to_vec(&doc).unwrap());

        assert_eq!(bundle.subject_id, "P1");
        assert_eq!(bundle.demographic, "female");
        assert_eq!(bundle.conditions, vec!["Hypertension"]);
        assert_eq!(
            bundle.medication_orders,
            vec!["Acetaminophen 325 MG - Oxycodone (Percocet)"]
        );
        assert_eq!(bundle.label_count(), 2);
    }

    #[test]
    fn test_identifiers_and_labels_are_stored_as_given() {
        let doc = serde_json::json!({
            "entry": [
                { "resource": { "resourceType": "Patient", "id": " P7 ", "gender": "male" } },
                { "resource": { "resourceType": "Condition", "code": { "text": " Asthma " } } }
            ]
        });
        let bundle = parsed(&serde_json::to_vec(&doc).unwrap());
        assert_eq!(bundle.subject_id, " P7 ");
        assert_eq!(bundle.conditions, vec![" Asthma "]);
    }

    #[test]
    fn test_first_subject_wins_and_gender_defaults() {
        let doc = serde_json::json!({
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "P1" } },
                { "resource": { "resourceType": "Patient", "id": "P2", "gender": "male" } }
            ]
        });
        let bundle = parsed(&serde_json::to_vec(&doc).unwrap());
        assert_eq!(bundle.subject_id, "P1");
        assert_eq!(bundle.demographic, UNKNOWN_DEMOGRAPHIC);
    }

    #[test]
    fn test_bundle_without_subject_is_not_an_error() {
        let doc = br#"{"entry": [{"resource": {"resourceType": "Condition", "code": {"text": "Asthma"}}}]}"#;
        assert_eq!(parse_bundle("b.json", doc).unwrap(), BundleContent::NoSubject);
        assert_eq!(parse_bundle("e.json", b"{}").unwrap(), BundleContent::NoSubject);
    }

    #[test]
    fn test_malformed_content_is_a_parse_error() {
        let err = parse_bundle("bad.json", b"{not json").unwrap_err();
        assert!(matches!(err, IngestError::Parse { ref file, .. } if file == "bad.json"));

        for id in ["", "  "] {
            let doc = serde_json::json!({
                "entry": [{ "resource": { "resourceType": "Patient", "id": id } }]
            });
            assert!(matches!(
                parse_bundle("noid.json", &serde_json::to_vec(&doc).unwrap()).unwrap_err(),
                IngestError::Parse { .. }
            ));
        }
    }
}
