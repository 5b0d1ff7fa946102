use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::providers::{BoardGateway, TrackerGateway};

pub const DEFAULT_ASSET_HOST: &str = "dev.azure.com";

/// An image embedded in field HTML that is served by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAsset {
    pub url: String,
    pub file_name: String,
}

/// Field text after rehosting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rehosted {
    pub text: String,
    /// False when at least one asset kept its tracker URL.
    pub complete: bool,
}

/// Moves tracker-hosted images referenced in field text onto the board.
pub struct AssetRehoster {
    tracker: Arc<dyn TrackerGateway>,
    board: Arc<dyn BoardGateway>,
    pattern: Regex,
}

impl AssetRehoster {
    pub fn new(
        tracker: Arc<dyn TrackerGateway>,
        board: Arc<dyn BoardGateway>,
        asset_host: &str,
    ) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r#"(?i)<img src="(https://{}/[^"]+?)\?fileName=([^"]+?)""#,
            regex::escape(asset_host)
        ))?;
        Ok(Self {
            tracker,
            board,
            pattern,
        })
    }

    /// Distinct tracker asset references in `text`, in order of first appearance.
    pub fn find_assets(&self, text: &str) -> Vec<EmbeddedAsset> {
        let mut assets: Vec<EmbeddedAsset> = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            let file_name = caps[2].to_string();
            let url = format!("{}?fileName={}", &caps[1], file_name);
            if assets.iter().all(|a| a.url != url) {
                assets.push(EmbeddedAsset { url, file_name });
            }
        }
        assets
    }

    /// Rewrites every rehosted asset URL in `text` to its board URL.
    ///
    /// Assets that fail to transfer keep their tracker URL and mark the
    /// result incomplete.
    pub async fn rehost(&self, task_id: Uuid, input_id: Uuid, text: &str) -> Rehosted {
        let mut assets = self.find_assets(text);
        if assets.is_empty() {
            return Rehosted {
                text: text.to_string(),
                complete: true,
            };
        }
        debug!("Uploading {} images for task {task_id}", assets.len());

        // Longest first so a URL that prefixes another cannot clobber it.
        assets.sort_by(|a, b| b.url.len().cmp(&a.url.len()));

        let transfers = assets
            .iter()
            .map(|asset| async move { (asset, self.transfer(task_id, input_id, asset).await) });
        let results = join_all(transfers).await;

        let mut rewritten = text.to_string();
        let mut complete = true;
        for (asset, result) in results {
            match result {
                Ok(board_url) => rewritten = rewritten.replace(&asset.url, &board_url),
                Err(e) => {
                    complete = false;
                    warn!("Leaving image {} in place for task {task_id}: {e:#}", asset.url);
                }
            }
        }
        debug!("Image upload for task {task_id} complete");
        Rehosted {
            text: rewritten,
            complete,
        }
    }

    async fn transfer(&self, task_id: Uuid, input_id: Uuid, asset: &EmbeddedAsset) -> Result<String> {
        let bytes = self.tracker.download_asset(&asset.url).await?;
        let file_name = urlencoding::decode(&asset.file_name)
            .map(|n| n.into_owned())
            .unwrap_or_else(|_| asset.file_name.clone());
        self.board
            .upload_asset(task_id, input_id, &file_name, bytes)
            .await
    }
}
