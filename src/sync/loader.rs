use std::future::Future;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::work_item::WorkItem;
use crate::providers::TrackerGateway;

/// Largest id list the tracker's batch endpoint accepts.
pub const PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// Reference names to fetch. Empty fetches every field.
    pub fields: Vec<String>,
    /// Work item types to restrict the query to. Empty loads all types.
    pub task_types: Vec<String>,
    /// Stop after this many work items.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub ids_found: usize,
    pub pages: usize,
    pub items: usize,
}

pub fn build_wiql(task_types: &[String]) -> String {
    let mut query = String::from("Select [Id] From WorkItems");
    if !task_types.is_empty() {
        let types: Vec<String> = task_types
            .iter()
            .map(|t| format!("'{}'", t.replace('\'', "''")))
            .collect();
        query.push_str(&format!(" Where [System.WorkItemType] In ({})", types.join(", ")));
    }
    query.push_str(" order by [System.CreatedDate] desc");
    query
}

/// Streams every matching work item to `on_page`, one page at a time.
///
/// Each page is handed over only after the previous `on_page` call resolved,
/// so at most one page is held here at once.
pub async fn load_work_items<F, Fut>(
    tracker: &dyn TrackerGateway,
    request: &LoadRequest,
    cancel: &CancellationToken,
    mut on_page: F,
) -> Result<LoadSummary>
where
    F: FnMut(Vec<WorkItem>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!("Getting work item ids");
    let mut ids = tracker
        .query_work_item_ids(&build_wiql(&request.task_types))
        .await
        .context("Work item id query failed")?;
    info!("Got {} work item ids", ids.len());

    if let Some(limit) = request.limit {
        ids.truncate(limit);
    }

    let mut summary = LoadSummary {
        ids_found: ids.len(),
        ..Default::default()
    };

    for page in ids.chunks(PAGE_SIZE) {
        if cancel.is_cancelled() {
            info!("Loading cancelled after {} pages", summary.pages);
            break;
        }
        let items = tracker
            .get_work_items_batch(page, &request.fields)
            .await
            .with_context(|| format!("Failed to load work item page {}", summary.pages + 1))?;
        summary.pages += 1;
        summary.items += items.len();
        debug!(
            "Loaded page {} ({} items, {}/{})",
            summary.pages,
            items.len(),
            summary.items,
            summary.ids_found
        );
        on_page(items).await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::MockTracker;

    async fn page_sizes_for(count: i64) -> Vec<usize> {
        let tracker = MockTracker::with_ids(count);
        let mut delivered: Vec<usize> = Vec::new();
        load_work_items(
            &tracker,
            &LoadRequest::default(),
            &CancellationToken::new(),
            |items| {
                delivered.push(items.len());
                async { anyhow::Ok(()) }
            },
        )
        .await
        .unwrap();
        assert_eq!(tracker.page_sizes(), delivered);
        delivered
    }

    #[tokio::test]
    async fn pages_are_capped_at_page_size() {
        assert_eq!(page_sizes_for(200).await, vec![200]);
        assert_eq!(page_sizes_for(201).await, vec![200, 1]);
        assert_eq!(page_sizes_for(399).await, vec![200, 199]);
    }

    #[tokio::test]
    async fn no_ids_means_no_pages() {
        assert!(page_sizes_for(0).await.is_empty());
    }

    #[tokio::test]
    async fn pages_arrive_in_query_order() {
        let tracker = MockTracker::with_ids(450);
        let mut first_ids: Vec<i64> = Vec::new();
        let summary = load_work_items(
            &tracker,
            &LoadRequest::default(),
            &CancellationToken::new(),
            |items| {
                first_ids.push(items[0].id.unwrap());
                async { anyhow::Ok(()) }
            },
        )
        .await
        .unwrap();
        assert_eq!(first_ids, vec![1, 201, 401]);
        assert_eq!(
            summary,
            LoadSummary {
                ids_found: 450,
                pages: 3,
                items: 450
            }
        );
    }

    #[tokio::test]
    async fn limit_truncates_ids() {
        let tracker = MockTracker::with_ids(500);
        let request = LoadRequest {
            limit: Some(250),
            ..Default::default()
        };
        let summary = load_work_items(&tracker, &request, &CancellationToken::new(), |_| async {
            anyhow::Ok(())
        })
        .await
        .unwrap();
        assert_eq!(tracker.page_sizes(), vec![200, 50]);
        assert_eq!(summary.items, 250);
    }

    #[tokio::test]
    async fn callback_error_stops_loading() {
        let tracker = MockTracker::with_ids(600);
        let result = load_work_items(
            &tracker,
            &LoadRequest::default(),
            &CancellationToken::new(),
            |_| async { Err(anyhow::anyhow!("consumer gone")) },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(tracker.page_sizes(), vec![200]);
    }

    #[tokio::test]
    async fn cancellation_stops_between_pages() {
        let tracker = MockTracker::with_ids(600);
        let cancel = CancellationToken::new();
        let summary = load_work_items(&tracker, &LoadRequest::default(), &cancel, |_| {
            cancel.cancel();
            async { anyhow::Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(summary.pages, 1);
    }

    #[test]
    fn wiql_orders_by_creation_date() {
        assert_eq!(
            build_wiql(&[]),
            "Select [Id] From WorkItems order by [System.CreatedDate] desc"
        );
    }

    #[test]
    fn wiql_filters_and_escapes_types() {
        let types = vec!["Bug".to_string(), "Tester's Task".to_string()];
        assert_eq!(
            build_wiql(&types),
            "Select [Id] From WorkItems Where [System.WorkItemType] In ('Bug', 'Tester''s Task') order by [System.CreatedDate] desc"
        );
    }
}
