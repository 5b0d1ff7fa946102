use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::detector::ChangeDetector;
use crate::error::{SyncError, SyncResult};
use crate::model::task::TaskUpdate;
use crate::model::work_item::WorkItem;
use crate::providers::BoardGateway;

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Work items transformed concurrently.
    pub work_item_batch: usize,
    /// Task updates per board write.
    pub write_batch: usize,
    /// Work items buffered before `enqueue` waits.
    pub queue_capacity: usize,
    /// Attempts per board write before the run fails.
    pub write_attempts: usize,
    pub retry_backoff: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            work_item_batch: 3,
            write_batch: 20,
            queue_capacity: 200,
            write_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
pub struct Progress {
    processed: AtomicUsize,
    updates: AtomicUsize,
    written: AtomicUsize,
}

impl Progress {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn pending_updates(&self) -> usize {
        self.updates
            .load(Ordering::Relaxed)
            .saturating_sub(self.written.load(Ordering::Relaxed))
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

/// Turns queued work items into batched board writes.
///
/// One consumer drains the work-item queue in small concurrent sub-batches
/// and forwards updates to a second consumer that owns all board writes, so
/// only one write is ever in flight.
pub struct TaskProcessor {
    work_tx: mpsc::Sender<WorkItem>,
    work_worker: JoinHandle<()>,
    write_worker: JoinHandle<SyncResult<usize>>,
    progress: Arc<Progress>,
    cancel: CancellationToken,
}

impl TaskProcessor {
    pub fn start(
        detector: Arc<ChangeDetector>,
        board: Arc<dyn BoardGateway>,
        options: ProcessorOptions,
        cancel: CancellationToken,
    ) -> Self {
        let work_item_batch = options.work_item_batch.max(1);
        let write_batch = options.write_batch.max(1);
        let (work_tx, work_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (update_tx, update_rx) = mpsc::channel(write_batch * 2);
        let progress = Arc::new(Progress::default());

        let work_worker = tokio::spawn(drain_work_items(
            detector,
            work_rx,
            update_tx,
            work_item_batch,
            progress.clone(),
            cancel.clone(),
        ));
        let write_worker = tokio::spawn(drain_updates(
            board,
            update_rx,
            WriteOptions {
                batch: write_batch,
                attempts: options.write_attempts.max(1),
                backoff: options.retry_backoff,
            },
            progress.clone(),
            cancel.clone(),
        ));

        Self {
            work_tx,
            work_worker,
            write_worker,
            progress,
            cancel,
        }
    }

    /// Queues work items, waiting while the queue is full.
    pub async fn enqueue(&self, items: Vec<WorkItem>) -> anyhow::Result<()> {
        for item in items {
            self.work_tx
                .send(item)
                .await
                .map_err(|_| anyhow!("Task processor stopped accepting work items"))?;
        }
        Ok(())
    }

    /// Live counters, still readable after `flush` consumes the processor.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Processes everything queued so far, writes all remaining updates and
    /// returns the number of tasks written.
    pub async fn flush(self) -> SyncResult<usize> {
        let TaskProcessor {
            work_tx,
            work_worker,
            write_worker,
            cancel,
            ..
        } = self;
        drop(work_tx);
        work_worker.await?;
        let written = write_worker.await??;
        if cancel.is_cancelled() {
            info!("Sync cancelled; {written} tasks were written");
        }
        Ok(written)
    }
}

async fn drain_work_items(
    detector: Arc<ChangeDetector>,
    mut work_rx: mpsc::Receiver<WorkItem>,
    update_tx: mpsc::Sender<TaskUpdate>,
    batch_size: usize,
    progress: Arc<Progress>,
    cancel: CancellationToken,
) {
    let mut batch: Vec<WorkItem> = Vec::with_capacity(batch_size);
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            n = work_rx.recv_many(&mut batch, batch_size) => n,
        };
        if received == 0 {
            break;
        }

        let running: Vec<_> = batch
            .drain(..)
            .map(|item| {
                let detector = detector.clone();
                (item.id, tokio::spawn(async move { detector.detect(&item).await }))
            })
            .collect();

        for (work_item_id, handle) in running {
            progress.processed.fetch_add(1, Ordering::Relaxed);
            match handle.await {
                Ok(Some(update)) => {
                    progress.updates.fetch_add(1, Ordering::Relaxed);
                    if update_tx.send(update).await.is_err() {
                        warn!("Board writer stopped; abandoning remaining work items");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => error!("Error getting task update for work item {work_item_id:?} - {e}"),
            }
        }
    }
    debug!("Work item queue drained ({} processed)", progress.processed());
}

struct WriteOptions {
    batch: usize,
    attempts: usize,
    backoff: Duration,
}

async fn drain_updates(
    board: Arc<dyn BoardGateway>,
    mut update_rx: mpsc::Receiver<TaskUpdate>,
    options: WriteOptions,
    progress: Arc<Progress>,
    cancel: CancellationToken,
) -> SyncResult<usize> {
    let mut pending: Vec<TaskUpdate> = Vec::new();
    let mut writer = BatchWriter {
        board,
        options,
        progress,
        batches: 0,
        tasks: 0,
    };

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(writer.tasks),
            n = update_rx.recv_many(&mut pending, writer.options.batch) => n,
        };
        if received == 0 {
            break;
        }
        while pending.len() >= writer.options.batch {
            if cancel.is_cancelled() {
                return Ok(writer.tasks);
            }
            let batch: Vec<TaskUpdate> = pending.drain(..writer.options.batch).collect();
            writer.write(batch, pending.len()).await?;
        }
    }

    while !pending.is_empty() {
        if cancel.is_cancelled() {
            return Ok(writer.tasks);
        }
        let take = pending.len().min(writer.options.batch);
        let batch: Vec<TaskUpdate> = pending.drain(..take).collect();
        writer.write(batch, pending.len()).await?;
    }
    Ok(writer.tasks)
}

struct BatchWriter {
    board: Arc<dyn BoardGateway>,
    options: WriteOptions,
    progress: Arc<Progress>,
    batches: usize,
    tasks: usize,
}

impl BatchWriter {
    async fn write(&mut self, batch: Vec<TaskUpdate>, remaining: usize) -> SyncResult<()> {
        info!("Writing batch of {} tasks. {remaining} remaining", batch.len());
        let mut attempt = 1;
        loop {
            match self.board.put_tasks(&batch).await {
                Ok(()) => break,
                Err(e) if attempt < self.options.attempts => {
                    let delay = self.options.backoff * 2u32.saturating_pow(attempt as u32 - 1);
                    warn!("Task batch write failed (attempt {attempt}), retrying in {delay:?}: {e:#}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SyncError::BatchWrite {
                        batches_written: self.batches,
                        tasks_written: self.tasks,
                        error: e,
                    })
                }
            }
        }
        self.batches += 1;
        self.tasks += batch.len();
        self.progress.written.fetch_add(batch.len(), Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::board::InputType;
    use crate::model::mapping::FieldMapping;
    use crate::providers::tests::{input, schema, work_item, MockBoard, MockTracker};
    use crate::sync::rehost::{AssetRehoster, DEFAULT_ASSET_HOST};

    fn options() -> ProcessorOptions {
        ProcessorOptions {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn processor(board: Arc<MockBoard>, cancel: CancellationToken) -> TaskProcessor {
        let tracker = Arc::new(MockTracker::default());
        let rehoster = AssetRehoster::new(tracker, board.clone(), DEFAULT_ASSET_HOST).unwrap();
        let detector = ChangeDetector::new(
            board.board_id,
            FieldMapping::from_schema(&board.schema),
            board.tasks.lock().unwrap().clone(),
            rehoster,
        );
        TaskProcessor::start(Arc::new(detector), board, options(), cancel)
    }

    fn mapped_board() -> MockBoard {
        MockBoard::new(schema(vec![input(Some("System.Title"), InputType::Text)]))
    }

    fn items(count: i64) -> Vec<WorkItem> {
        (1..=count)
            .map(|id| work_item(id, &[("System.Title", "Title")]))
            .collect()
    }

    #[tokio::test]
    async fn flushing_45_updates_writes_20_20_5() {
        let board = Arc::new(mapped_board());
        let p = processor(board.clone(), CancellationToken::new());

        p.enqueue(items(45)).await.unwrap();
        let written = p.flush().await.unwrap();

        assert_eq!(written, 45);
        assert_eq!(board.write_sizes(), vec![20, 20, 5]);
    }

    #[tokio::test]
    async fn flush_with_nothing_queued_writes_nothing() {
        let board = Arc::new(mapped_board());
        let p = processor(board.clone(), CancellationToken::new());

        assert_eq!(p.flush().await.unwrap(), 0);
        assert!(board.write_sizes().is_empty());
    }

    #[tokio::test]
    async fn items_without_changes_are_not_written() {
        let board = Arc::new(mapped_board());
        let p = processor(board.clone(), CancellationToken::new());
        let mut batch = items(2);
        batch.push(WorkItem { id: None, fields: None });
        p.enqueue(batch).await.unwrap();
        assert_eq!(p.flush().await.unwrap(), 2);

        let again = processor(board.clone(), CancellationToken::new());
        again.enqueue(items(2)).await.unwrap();
        assert_eq!(again.flush().await.unwrap(), 0);
        assert_eq!(board.write_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn failing_item_is_skipped_and_the_rest_are_written() {
        let mut board = MockBoard::new(schema(vec![
            input(Some("System.Title"), InputType::Text),
            input(Some("System.Description"), InputType::Text),
        ]));
        board.panicking_upload = Some("boom.png".into());
        let board = Arc::new(board);
        let p = processor(board.clone(), CancellationToken::new());

        let img = r#"<img src="https://dev.azure.com/org/_apis/wit/attachments/2?fileName=boom.png">"#;
        p.enqueue(vec![
            work_item(1, &[("System.Title", "One")]),
            work_item(2, &[("System.Title", "Two"), ("System.Description", img)]),
            work_item(3, &[("System.Title", "Three")]),
        ])
        .await
        .unwrap();
        let written = p.flush().await.unwrap();

        assert_eq!(written, 2);
        let mut ids: Vec<i64> = board
            .writes
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter_map(TaskUpdate::work_item_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn transient_write_failure_is_retried() {
        let board = Arc::new(mapped_board().failing_writes(2));
        let p = processor(board.clone(), CancellationToken::new());

        p.enqueue(items(5)).await.unwrap();
        assert_eq!(p.flush().await.unwrap(), 5);
        assert_eq!(board.write_sizes(), vec![5]);
    }

    #[tokio::test]
    async fn persistent_write_failure_fails_the_run() {
        let board = Arc::new(mapped_board().failing_writes(100));
        let p = processor(board.clone(), CancellationToken::new());

        p.enqueue(items(25)).await.ok();
        match p.flush().await {
            Err(SyncError::BatchWrite {
                batches_written,
                tasks_written,
                ..
            }) => {
                assert_eq!(batches_written, 0);
                assert_eq!(tasks_written, 0);
            }
            other => panic!("expected batch write error, got {other:?}"),
        }
        assert!(board.write_sizes().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_writes_nothing() {
        let board = Arc::new(mapped_board());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let p = processor(board.clone(), cancel);

        assert_eq!(p.flush().await.unwrap(), 0);
        assert!(board.write_sizes().is_empty());
    }

    #[tokio::test]
    async fn cancellation_returns_partial_count() {
        let board = Arc::new(mapped_board());
        let cancel = CancellationToken::new();
        let p = processor(board.clone(), cancel.clone());

        p.enqueue(items(45)).await.unwrap();
        cancel.cancel();
        let written = p.flush().await.unwrap();

        assert!(written <= 45);
        assert_eq!(board.write_sizes().iter().sum::<usize>(), written);
    }
}
