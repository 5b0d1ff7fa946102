pub mod detector;
pub mod fill_rate;
pub mod loader;
pub mod processor;
pub mod rehost;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::model::board::{Board, Schema};
use crate::model::mapping::FieldMapping;
use crate::model::task::Task;
use crate::providers::{BoardGateway, TrackerGateway};
use detector::ChangeDetector;
use loader::{load_work_items, LoadRequest};
use processor::{ProcessorOptions, TaskProcessor};
use rehost::AssetRehoster;

/// Everything read from the board before a run starts.
pub struct BoardState {
    pub board: Board,
    pub schema: Schema,
    pub tasks: Vec<Task>,
}

pub async fn fetch_board_state(board: &dyn BoardGateway, board_id: Uuid) -> SyncResult<BoardState> {
    let (board_info, schema, tasks) = tokio::try_join!(
        board.get_board(board_id),
        board.get_schema_for_board(board_id),
        board.get_tasks_for_board(board_id),
    )
    .map_err(SyncError::Board)?;
    Ok(BoardState {
        board: board_info,
        schema,
        tasks,
    })
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub task_types: Vec<String>,
    pub asset_host: String,
    pub processor: ProcessorOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub work_items: usize,
    pub tasks_written: usize,
}

/// Runs one full tracker -> board pass and reports how many tasks changed.
pub async fn run_sync(
    board: Arc<dyn BoardGateway>,
    tracker: Arc<dyn TrackerGateway>,
    state: BoardState,
    settings: &SyncSettings,
    cancel: CancellationToken,
) -> SyncResult<SyncReport> {
    let mapping = FieldMapping::from_schema(&state.schema);
    if mapping.is_empty() {
        info!("Board {} has no inputs mapped to tracker fields", state.board.name);
        return Ok(SyncReport::default());
    }
    info!(
        "Syncing {} mapped fields into board {} ({} existing tasks)",
        mapping.len(),
        state.board.name,
        state.tasks.len()
    );

    let request = LoadRequest {
        fields: mapping.reference_names(),
        task_types: settings.task_types.clone(),
        limit: None,
    };
    let rehoster = AssetRehoster::new(tracker.clone(), board.clone(), &settings.asset_host)
        .map_err(|e| SyncError::Config(format!("invalid asset host {}: {e}", settings.asset_host)))?;
    let detector = ChangeDetector::new(state.board.id, mapping, state.tasks, rehoster);
    let processor = TaskProcessor::start(
        Arc::new(detector),
        board,
        settings.processor.clone(),
        cancel.clone(),
    );

    let loaded = load_work_items(tracker.as_ref(), &request, &cancel, |items| {
        let progress = processor.progress();
        info!(
            "Queued {} work items ({} processed, {} pending updates, {} written)",
            items.len(),
            progress.processed(),
            progress.pending_updates(),
            progress.written()
        );
        processor.enqueue(items)
    })
    .await;

    let progress = processor.progress();
    // A failed writer also surfaces as a rejected enqueue; report the writer's error first.
    let tasks_written = processor.flush().await?;
    let work_items = match loaded {
        Ok(_) if cancel.is_cancelled() => progress.processed(),
        Ok(summary) => summary.items,
        // Stopped workers reject further pages once cancelled.
        Err(e) if cancel.is_cancelled() => {
            warn!("Loading stopped by cancellation: {e:#}");
            progress.processed()
        }
        Err(e) => return Err(SyncError::Tracker(e)),
    };

    Ok(SyncReport {
        work_items,
        tasks_written,
    })
}
