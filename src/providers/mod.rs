pub mod ado;
pub mod eonix;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::model::board::{Board, Schema};
use crate::model::task::{Task, TaskUpdate};
use crate::model::work_item::WorkItem;

/// The issue tracker work items are read from.
#[async_trait]
pub trait TrackerGateway: Send + Sync {
    async fn query_work_item_ids(&self, wiql: &str) -> Result<Vec<i64>>;
    /// Fetches at most one page of items. An empty `fields` slice means all fields.
    async fn get_work_items_batch(&self, ids: &[i64], fields: &[String]) -> Result<Vec<WorkItem>>;
    async fn download_asset(&self, url: &str) -> Result<Bytes>;
}

/// The task board work items are written to.
#[async_trait]
pub trait BoardGateway: Send + Sync {
    async fn get_board(&self, board_id: Uuid) -> Result<Board>;
    async fn get_schema_for_board(&self, board_id: Uuid) -> Result<Schema>;
    async fn get_tasks_for_board(&self, board_id: Uuid) -> Result<Vec<Task>>;
    async fn put_tasks(&self, tasks: &[TaskUpdate]) -> Result<()>;
    /// Stores an asset against a task input and returns the URL it is served from.
    async fn upload_asset(
        &self,
        task_id: Uuid,
        input_id: Uuid,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<String>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
