use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::model::board::Board;
use crate::sync::processor::ProcessorOptions;
use crate::sync::rehost::DEFAULT_ASSET_HOST;
use crate::sync::SyncSettings;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub board: BoardConfig,
    pub tracker: TrackerConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BoardConfig {
    pub host: Option<String>,
    pub token: Option<String>,
    pub board_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    pub org_url: Option<String>,
    pub token: Option<String>,
    pub project: Option<String>,
    pub task_types: Vec<String>,
    pub asset_host: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub http_timeout_secs: u64,
    pub work_item_batch: usize,
    pub write_batch: usize,
    pub queue_capacity: usize,
    pub write_attempts: usize,
    pub retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let defaults = ProcessorOptions::default();
        Self {
            http_timeout_secs: 30,
            work_item_batch: defaults.work_item_batch,
            write_batch: defaults.write_batch,
            queue_capacity: defaults.queue_capacity,
            write_attempts: defaults.write_attempts,
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardConnection {
    pub host: String,
    pub token: String,
    pub board_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TrackerConnection {
    pub org_url: String,
    pub token: String,
    pub project: String,
    pub task_types: Vec<String>,
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ado-board-sync")
        .join("config.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

fn required(value: &Option<String>, name: &str) -> SyncResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| SyncError::Config(format!("missing {name}")))
}

impl AppConfig {
    /// Environment variables take precedence over the config file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(v) = var(key).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };
        set(&mut self.board.token, "EONIX_TOKEN");
        set(&mut self.board.host, "EONIX_HOST");
        set(&mut self.board.board_id, "EONIX_BOARD_ID");
        set(&mut self.tracker.org_url, "ADO_ORG_URL");
        set(&mut self.tracker.token, "ADO_TOKEN");
        set(&mut self.tracker.project, "ADO_PROJECT");
        if let Some(types) = var("ADO_TASK_TYPES") {
            self.tracker.task_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn board_connection(&self) -> SyncResult<BoardConnection> {
        let token = required(&self.board.token, "EONIX_TOKEN")?;
        let host = required(&self.board.host, "EONIX_HOST")?;
        let raw_id = required(&self.board.board_id, "EONIX_BOARD_ID")?;
        let board_id = Uuid::parse_str(&raw_id)
            .map_err(|e| SyncError::Config(format!("EONIX_BOARD_ID {raw_id} is not a UUID: {e}")))?;
        Ok(BoardConnection {
            host,
            token,
            board_id,
        })
    }

    /// Tracker settings from config, falling back to those stored on the board.
    pub fn tracker_connection(&self, board: &Board) -> SyncResult<TrackerConnection> {
        let stored = board.app_data.as_ref().and_then(|a| a.plugin_ado.as_ref());
        let pick = |configured: &Option<String>, from_board: Option<&String>, name: &str| {
            required(configured, name).or_else(|_| required(&from_board.cloned(), name))
        };
        let task_types = if self.tracker.task_types.is_empty() {
            stored.map(|s| s.task_types.clone()).unwrap_or_default()
        } else {
            self.tracker.task_types.clone()
        };
        Ok(TrackerConnection {
            org_url: pick(&self.tracker.org_url, stored.map(|s| &s.org_url), "ADO_ORG_URL")?,
            token: pick(&self.tracker.token, stored.map(|s| &s.token), "ADO_TOKEN")?,
            project: pick(&self.tracker.project, stored.map(|s| &s.project), "ADO_PROJECT")?,
            task_types,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.http_timeout_secs.max(1))
    }

    pub fn sync_settings(&self, tracker: &TrackerConnection) -> SyncSettings {
        SyncSettings {
            task_types: tracker.task_types.clone(),
            asset_host: self
                .tracker
                .asset_host
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSET_HOST.to_string()),
            processor: ProcessorOptions {
                work_item_batch: self.sync.work_item_batch,
                write_batch: self.sync.write_batch,
                queue_capacity: self.sync.queue_capacity,
                write_attempts: self.sync.write_attempts,
                retry_backoff: Duration::from_millis(self.sync.retry_backoff_ms),
            },
        }
    }
}
