use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{AppConfig, BoardConnection, TrackerConnection};
use crate::model::board::Schema;
use crate::model::mapping::FieldMapping;
use crate::providers::ado::AdoTracker;
use crate::providers::eonix::EonixBoard;
use crate::providers::{http_client, BoardGateway, TrackerGateway};
use crate::sync::fill_rate::FillRates;
use crate::sync::loader::{load_work_items, LoadRequest};
use crate::sync::{fetch_board_state, run_sync, BoardState};

/// Mirror Azure DevOps work items onto an Eonix board.
#[derive(Debug, Parser)]
#[command(name = "ado-board-sync", version)]
pub struct Cli {
    /// Config file (defaults to ~/.ado-board-sync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run one incremental sync pass (default)
    Sync,
    /// Show which board inputs are fed from which tracker fields
    Mappings,
    /// Sample work items and report how often each field is filled
    FillRates {
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
}

fn board_gateway(config: &AppConfig, conn: &BoardConnection) -> Result<Arc<EonixBoard>> {
    let client = http_client(config.http_timeout())?;
    Ok(Arc::new(EonixBoard::new(&conn.host, conn.token.clone(), client)))
}

fn tracker_gateway(config: &AppConfig, conn: &TrackerConnection) -> Result<Arc<AdoTracker>> {
    let client = http_client(config.http_timeout())?;
    Ok(Arc::new(AdoTracker::new(
        &conn.org_url,
        &conn.project,
        &conn.token,
        client,
    )))
}

async fn connect(config: &AppConfig) -> Result<(Arc<EonixBoard>, BoardState)> {
    let conn = config.board_connection()?;
    let board = board_gateway(config, &conn)?;
    let state = fetch_board_state(board.as_ref(), conn.board_id).await?;
    info!(
        "Board {} loaded: {} inputs, {} tasks",
        state.board.name,
        state.schema.inputs.len(),
        state.tasks.len()
    );
    Ok((board, state))
}

pub async fn handle_sync(config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    let (board, state) = connect(config).await?;
    let tracker_conn = config.tracker_connection(&state.board)?;
    let tracker = tracker_gateway(config, &tracker_conn)?;
    let settings = config.sync_settings(&tracker_conn);

    let board: Arc<dyn BoardGateway> = board;
    let tracker: Arc<dyn TrackerGateway> = tracker;
    let report = run_sync(board, tracker, state, &settings, cancel.clone()).await?;

    if cancel.is_cancelled() {
        println!(
            "Sync interrupted: {} tasks written from {} work items",
            report.tasks_written, report.work_items
        );
    } else {
        println!(
            "Sync complete: {} work items read, {} tasks written",
            report.work_items, report.tasks_written
        );
    }
    Ok(())
}

pub async fn handle_mappings(config: &AppConfig) -> Result<()> {
    let (_, state) = connect(config).await?;
    print!("{}", render_mappings(&state.schema));
    Ok(())
}

pub async fn handle_fill_rates(
    config: &AppConfig,
    limit: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let (_, state) = connect(config).await?;
    let tracker_conn = config.tracker_connection(&state.board)?;
    let tracker = tracker_gateway(config, &tracker_conn)?;

    let request = LoadRequest {
        fields: Vec::new(),
        task_types: tracker_conn.task_types.clone(),
        limit: Some(limit),
    };
    let mut rates = FillRates::default();
    load_work_items(tracker.as_ref(), &request, &cancel, |items| {
        rates.add(&items);
        async { anyhow::Ok(()) }
    })
    .await?;

    print!("{}", rates.render(&FieldMapping::from_schema(&state.schema)));
    Ok(())
}

/// One line per board input: its name, type and source field.
pub fn render_mappings(schema: &Schema) -> String {
    let mut out = String::new();
    for input in &schema.inputs {
        let kind = if input.input_type.is_scalar_text() {
            ""
        } else {
            " (not synced: non-text input)"
        };
        match input.reference_name() {
            Some(reference) => out.push_str(&format!("{} <- {reference}{kind}\n", input.name)),
            None => out.push_str(&format!("{} <- (unmapped)\n", input.name)),
        }
    }
    if out.is_empty() {
        out.push_str("Board schema has no inputs\n");
    }
    out
}
