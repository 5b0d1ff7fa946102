use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use super::TrackerGateway;
use crate::model::work_item::WorkItem;

const API_VERSION: &str = "7.0";

pub struct AdoTracker {
    project_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl AdoTracker {
    pub fn new(org_url: &str, project: &str, token: &str, client: reqwest::Client) -> Self {
        Self {
            project_url: format!(
                "{}/{}",
                org_url.trim_end_matches('/'),
                urlencoding::encode(project)
            ),
            auth_header: basic_auth_header(token),
            client,
        }
    }
}

/// Personal access tokens go in the password slot with an empty user name.
pub fn basic_auth_header(token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
    format!("Basic {encoded}")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResponse {
    #[serde(default)]
    work_items: Vec<WorkItemReference>,
}

#[derive(Deserialize)]
struct WorkItemReference {
    id: i64,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<WorkItem>,
}

#[async_trait]
impl TrackerGateway for AdoTracker {
    async fn query_work_item_ids(&self, wiql: &str) -> Result<Vec<i64>> {
        let url = format!("{}/_apis/wit/wiql?api-version={API_VERSION}", self.project_url);
        let body = serde_json::json!({ "query": wiql });

        let resp: WiqlResponse = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await
            .context("ADO work item query failed")?
            .error_for_status()
            .context("ADO work item query rejected")?
            .json()
            .await
            .context("Failed to parse ADO query response")?;

        Ok(resp.work_items.into_iter().map(|r| r.id).collect())
    }

    async fn get_work_items_batch(&self, ids: &[i64], fields: &[String]) -> Result<Vec<WorkItem>> {
        let url = format!(
            "{}/_apis/wit/workitemsbatch?api-version={API_VERSION}",
            self.project_url
        );
        let mut body = serde_json::json!({ "ids": ids });
        if !fields.is_empty() {
            body["fields"] = serde_json::json!(fields);
        }

        let resp: BatchResponse = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await
            .context("ADO work item batch request failed")?
            .error_for_status()
            .context("ADO work item batch request rejected")?
            .json()
            .await
            .context("Failed to parse ADO work item batch")?;

        Ok(resp.value)
    }

    async fn download_asset(&self, url: &str) -> Result<Bytes> {
        let bytes = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .with_context(|| format!("Failed to download {url}"))?
            .error_for_status()
            .with_context(|| format!("ADO refused asset {url}"))?
            .bytes()
            .await?;
        Ok(bytes)
    }
}
