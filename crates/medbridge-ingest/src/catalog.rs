//! Remote catalog client
//!
//! Walks a paginated contents listing and keeps the file entries the
//! pipeline can ingest. Any failed page fails the whole listing: a partial
//! catalog is never acted on.

use reqwest::header::{HeaderMap, ACCEPT, LINK, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// One file descriptor from the contents listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl CatalogEntry {
    fn is_eligible(&self, extension: &str) -> bool {
        self.kind == "file" && self.name.ends_with(extension) && is_plain_file_name(&self.name)
    }
}

/// Names are joined onto a staging directory and a URL; reject anything
/// that could leave either
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// Client for the remote contents listing and raw file host
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    config: IngestConfig,
}

impl CatalogClient {
    /// Create a client with the configured per-request timeout
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Underlying HTTP client, shared with the download worker
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// List every eligible file, keyed by name
    #[instrument(skip(self), fields(url = %self.config.catalog_url))]
    pub async fn list_files(&self) -> Result<BTreeMap<String, CatalogEntry>> {
        let mut catalog = BTreeMap::new();
        let mut page: u32 = 1;

        loop {
            let (entries, has_next) = self.fetch_page(page).await?;
            if entries.is_empty() {
                break;
            }

            let listed = entries.len();
            for entry in entries {
                if entry.is_eligible(&self.config.file_extension) {
                    catalog.insert(entry.name.clone(), entry);
                } else {
                    debug!(name = %entry.name, kind = %entry.kind, "Ignoring catalog entry");
                }
            }
            debug!(page, listed, eligible = catalog.len(), "Catalog page read");

            if !has_next {
                break;
            }
            page += 1;
        }

        info!(files = catalog.len(), pages = page, "Catalog listed");
        Ok(catalog)
    }

    async fn fetch_page(&self, page: u32) -> Result<(Vec<CatalogEntry>, bool)> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
        if !self.config.catalog_ref.is_empty() {
            query.push(("ref", self.config.catalog_ref.clone()));
        }
        query.push(("page", page.to_string()));
        query.push(("per_page", self.config.page_size.to_string()));

        let response = self
            .client
            .get(&self.config.catalog_url)
            .query(&query)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::UnexpectedStatus {
                status,
                url: response.url().to_string(),
            });
        }

        let has_next = has_next_link(response.headers());
        let body = response.bytes().await?;
        let entries = parse_page(&body).map_err(|reason| IngestError::MalformedCatalog {
            page,
            reason,
        })?;

        Ok((entries, has_next))
    }
}

/// Decode one listing page: a JSON array whose objects carry `name` and `type`
///
/// Array members of any other shape are ignored.
fn parse_page(body: &[u8]) -> std::result::Result<Vec<CatalogEntry>, String> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => return Err(format!("expected a JSON array, got {}", json_kind(&other))),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<CatalogEntry>(item).ok())
        .collect())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// True when an RFC 8288 `Link` header carries a `next` relation
pub(crate) fn has_next_link(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|link| {
            link.split(';').skip(1).any(|param| {
                let param = param.trim();
                param
                    .strip_prefix("rel=")
                    .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                    .unwrap_or(false)
            })
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> IngestConfig {
        IngestConfig {
            catalog_url: format!("{}/contents/data", server.uri()),
            raw_base_url: format!("{}/raw/", server.uri()),
            ..IngestConfig::default()
        }
    }

    fn file(name: &str) -> serde_json::Value {
        serde_json::json!({ "name": name, "type": "file", "size": 10 })
    }

    #[test]
    fn test_link_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_next_link(&headers));

        headers.insert(
            LINK,
            HeaderValue::from_static(
                r#"<https://x/contents?page=2>; rel="next", <https://x/contents?page=5>; rel="last""#,
            ),
        );
        assert!(has_next_link(&headers));

        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://x/contents?page=1>; rel="prev first""#),
        );
        assert!(!has_next_link(&headers));
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("Aaron697_Brekke496.json"));
        assert!(!is_plain_file_name("../etc/passwd.json"));
        assert!(!is_plain_file_name("nested/a.json"));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn test_parse_page_rejects_non_arrays() {
        assert!(parse_page(br#"{"message": "Not Found"}"#).is_err());
        assert!(parse_page(b"<html>").is_err());

        let entries = parse_page(br#"[{"name": "a.json", "type": "file"}, 42, {"type": "dir"}]"#)
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_follows_next_links_and_filters() {
        let server = MockServer::start().await;
        let next = format!(r#"<{}/contents/data?page=2>; rel="next""#, server.uri());

        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "100"))
            .and(query_param("ref", "main"))
            .and(header("accept", "application/vnd.github+json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", next.as_str())
                    .set_body_json(serde_json::json!([
                        file("a.json"),
                        file("notes.txt"),
                        { "name": "nested", "type": "dir" },
                    ])),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                file("b.json"),
            ])))
            .mount(&server)
            .await;

        let client = CatalogClient::new(config_for(&server)).unwrap();
        let catalog = client.list_files().await.unwrap();

        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["a.json", "b.json"]);
        assert_eq!(catalog["a.json"].size, Some(10));
    }

    #[tokio::test]
    async fn test_list_files_stops_on_empty_page() {
        let server = MockServer::start().await;
        let next = format!(r#"<{}/contents/data?page=2>; rel="next""#, server.uri());

        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", next.as_str())
                    .set_body_json(serde_json::json!([])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = CatalogClient::new(config_for(&server)).unwrap();
        assert!(client.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_files_fails_fast_on_error_status() {
        let server = MockServer::start().await;
        let next = format!(r#"<{}/contents/data?page=2>; rel="next""#, server.uri());

        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", next.as_str())
                    .set_body_json(serde_json::json!([file("a.json")])),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = CatalogClient::new(config_for(&server)).unwrap();
        let err = client.list_files().await.unwrap_err();
        assert!(err.is_network());
        assert!(matches!(err, IngestError::UnexpectedStatus { status, .. } if status.as_u16() == 403));
    }

    #[tokio::test]
    async fn test_list_files_reports_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contents/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"message\":\"rate limited\"}"))
            .mount(&server)
            .await;

        let client = CatalogClient::new(config_for(&server)).unwrap();
        let err = client.list_files().await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedCatalog { page: 1, .. }));
    }
}
