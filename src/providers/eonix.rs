use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use uuid::Uuid;

use super::BoardGateway;
use crate::model::board::{Board, Schema};
use crate::model::task::{Task, TaskUpdate};

pub struct EonixBoard {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl EonixBoard {
    pub fn new(host: &str, token: String, client: reqwest::Client) -> Self {
        let host = host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self {
            base_url,
            token,
            client,
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let resp: GqlResponse<T> = self
            .client
            .post(format!("{}/graphql", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Eonix API request failed")?
            .error_for_status()
            .context("Eonix API request rejected")?
            .json()
            .await
            .context("Failed to parse Eonix response")?;

        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            bail!("Eonix API error: {}", messages.join("; "));
        }
        resp.data.context("No data in Eonix response")
    }
}

const BOARD_QUERY: &str = r#"query board($boardId: UUID!) {
  board(boardId: $boardId) { id name appData }
}"#;

const SCHEMA_QUERY: &str = r#"query schemaForBoard($boardId: UUID!) {
  schemaForBoard(boardId: $boardId) { inputs { id name type appData } }
}"#;

const TASKS_QUERY: &str = r#"query tasks($boardId: UUID!) {
  tasks(boardId: $boardId) {
    id boardId sort taskSchema appData
    values {
      type id inputId appData
      ... on ScalarValue { value { type value } }
      ... on ListValue { value }
      ... on FileValue { value }
      ... on TaskReferenceValue { value }
    }
  }
}"#;

const PUT_TASKS_MUTATION: &str = r#"mutation putTasks($tasks: [TaskInput!]!) {
  putTasks(tasks: $tasks)
}"#;

#[derive(Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GqlError>>,
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Deserialize)]
struct BoardData {
    board: Option<Board>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaData {
    schema_for_board: Option<Schema>,
}

#[derive(Deserialize)]
struct TasksData {
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[async_trait]
impl BoardGateway for EonixBoard {
    async fn get_board(&self, board_id: Uuid) -> Result<Board> {
        let data: BoardData = self
            .graphql(BOARD_QUERY, serde_json::json!({ "boardId": board_id }))
            .await?;
        data.board
            .with_context(|| format!("Board {board_id} not found"))
    }

    async fn get_schema_for_board(&self, board_id: Uuid) -> Result<Schema> {
        let data: SchemaData = self
            .graphql(SCHEMA_QUERY, serde_json::json!({ "boardId": board_id }))
            .await?;
        data.schema_for_board
            .with_context(|| format!("Board {board_id} has no schema"))
    }

    async fn get_tasks_for_board(&self, board_id: Uuid) -> Result<Vec<Task>> {
        let data: TasksData = self
            .graphql(TASKS_QUERY, serde_json::json!({ "boardId": board_id }))
            .await?;
        Ok(data.tasks)
    }

    async fn put_tasks(&self, tasks: &[TaskUpdate]) -> Result<()> {
        let _: IgnoredAny = self
            .graphql(PUT_TASKS_MUTATION, serde_json::json!({ "tasks": tasks }))
            .await?;
        Ok(())
    }

    async fn upload_asset(
        &self,
        task_id: Uuid,
        input_id: Uuid,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("taskId", task_id.to_string())
            .text("inputId", input_id.to_string())
            .part("file", part);

        let resp: UploadResponse = self
            .client
            .post(format!("{}/files/markdown", self.base_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Uploading {file_name} failed"))?
            .error_for_status()
            .with_context(|| format!("Eonix rejected upload of {file_name}"))?
            .json()
            .await
            .context("Failed to parse upload response")?;

        Ok(resp.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn board(server: &MockServer) -> EonixBoard {
        let client = crate::providers::http_client(Duration::from_secs(5)).unwrap();
        EonixBoard::new(&server.uri(), "secret".into(), client)
    }

    #[test]
    fn bare_host_defaults_to_https() {
        let client = reqwest::Client::new();
        let b = EonixBoard::new("api.eonix.io/", "t".into(), client);
        assert_eq!(b.base_url, "https://api.eonix.io");
    }

    #[tokio::test]
    async fn reads_tasks_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"tasks": [{
                    "id": "00000000-0000-0000-0000-0000000000a1",
                    "boardId": "00000000-0000-0000-0000-0000000000b1",
                    "values": [],
                    "appData": {"pluginAdo": {"workItemId": 3, "valueHash": {}}}
                }]}
            })))
            .mount(&server)
            .await;

        let tasks = board(&server)
            .get_tasks_for_board(Uuid::nil())
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].work_item_id(), Some(3));
    }

    #[tokio::test]
    async fn graphql_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{"message": "not allowed"}]
            })))
            .mount(&server)
            .await;

        let err = board(&server).put_tasks(&[]).await.unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[tokio::test]
    async fn upload_returns_hosted_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/markdown"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://files.eonix.io/a.png"})),
            )
            .mount(&server)
            .await;

        let url = board(&server)
            .upload_asset(Uuid::nil(), Uuid::nil(), "a.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(url, "https://files.eonix.io/a.png");
    }
}
