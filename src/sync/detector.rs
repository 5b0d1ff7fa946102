use std::collections::{BTreeMap, HashMap};

use tracing::debug;
use uuid::Uuid;

use super::rehost::AssetRehoster;
use crate::model::mapping::FieldMapping;
use crate::model::task::{
    index_by_work_item, ScalarContent, ScalarValue, SyncAnnotation, Task, TaskAppData, TaskUpdate,
    TaskValue,
};
use crate::model::work_item::WorkItem;
use crate::util::hash::value_hash;

/// Decides what, if anything, must be written to the board for a work item.
pub struct ChangeDetector {
    board_id: Uuid,
    mapping: FieldMapping,
    existing: HashMap<i64, Task>,
    rehoster: AssetRehoster,
}

impl ChangeDetector {
    pub fn new(
        board_id: Uuid,
        mapping: FieldMapping,
        existing_tasks: Vec<Task>,
        rehoster: AssetRehoster,
    ) -> Self {
        for (reference_name, input) in mapping.iter() {
            if !input.input_type.is_scalar_text() {
                debug!(
                    "Input {} ({reference_name}) is not a text input and will not be synced",
                    input.name
                );
            }
        }
        Self {
            board_id,
            mapping,
            existing: index_by_work_item(existing_tasks),
            rehoster,
        }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Returns the full task state to write, or `None` when the board is
    /// already up to date (or the item carries nothing to sync).
    pub async fn detect(&self, work_item: &WorkItem) -> Option<TaskUpdate> {
        let (Some(work_item_id), Some(_)) = (work_item.id, work_item.fields.as_ref()) else {
            return None;
        };
        let existing = self.existing.get(&work_item_id);

        let mut candidate = TaskUpdate {
            id: existing.map(|t| t.id).unwrap_or_else(Uuid::new_v4),
            board_id: self.board_id,
            sort: existing.and_then(|t| t.sort.clone()),
            task_schema: existing.and_then(|t| t.task_schema.clone()),
            scalar_values: Vec::new(),
            list_values: Vec::new(),
            file_values: Vec::new(),
            task_reference_values: Vec::new(),
            app_data: TaskAppData {
                plugin_ado: None,
                other: existing
                    .and_then(|t| t.app_data.as_ref())
                    .map(|a| a.other.clone())
                    .unwrap_or_default(),
            },
        };
        let mut hashes: BTreeMap<String, String> = BTreeMap::new();

        for (reference_name, input) in self.mapping.iter() {
            if !input.input_type.is_scalar_text() {
                continue;
            }
            let Some(raw) = work_item.field_text(reference_name) else {
                continue;
            };
            let hash = value_hash(&raw);

            let existing_value = existing.and_then(|t| match t.value_for_input(input.id) {
                Some(TaskValue::Scalar(v)) => Some(v),
                _ => None,
            });
            let reusable = existing_value
                .and_then(|v| v.value.as_non_empty_str())
                .filter(|_| existing.and_then(|t| t.stored_hash(reference_name)) == Some(hash.as_str()));

            let (value, complete) = match reusable {
                Some(stored) => (stored.to_string(), true),
                None => {
                    let rehosted = self.rehoster.rehost(candidate.id, input.id, &raw).await;
                    (rehosted.text, rehosted.complete)
                }
            };

            candidate.scalar_values.push(ScalarValue {
                id: existing_value.map(|v| v.id).unwrap_or_else(Uuid::new_v4),
                input_id: input.id,
                app_data: existing_value.and_then(|v| v.app_data.clone()),
                value: ScalarContent::string(value),
            });
            // Without a hash the next run takes the changed path and retries the assets.
            if complete {
                hashes.insert(reference_name.to_string(), hash);
            }
        }

        candidate.app_data.plugin_ado = Some(SyncAnnotation {
            work_item_id,
            value_hash: hashes,
        });

        if let Some(task) = existing {
            if TaskUpdate::from(task).same_content(&candidate) {
                return None;
            }
        }
        Some(candidate)
    }
}
