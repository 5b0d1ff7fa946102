use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A task as stored on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub board_id: Uuid,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub task_schema: Option<Value>,
    #[serde(default)]
    pub values: Vec<TaskValue>,
    #[serde(default)]
    pub app_data: Option<TaskAppData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskValue {
    Scalar(ScalarValue),
    List(OpaqueValue),
    File(OpaqueValue),
    TaskReference(OpaqueValue),
}

impl TaskValue {
    pub fn input_id(&self) -> Uuid {
        match self {
            TaskValue::Scalar(v) => v.input_id,
            TaskValue::List(v) | TaskValue::File(v) | TaskValue::TaskReference(v) => v.input_id,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            TaskValue::Scalar(v) => v.id,
            TaskValue::List(v) | TaskValue::File(v) | TaskValue::TaskReference(v) => v.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarValue {
    pub id: Uuid,
    pub input_id: Uuid,
    #[serde(default)]
    pub app_data: Option<Value>,
    pub value: ScalarContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl ScalarContent {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: "string".into(),
            value: Value::String(value.into()),
        }
    }

    /// The stored string, if this is a non-empty string scalar.
    pub fn as_non_empty_str(&self) -> Option<&str> {
        if self.kind != "string" {
            return None;
        }
        self.value.as_str().filter(|s| !s.is_empty())
    }
}

/// List, file and task-reference values are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpaqueValue {
    pub id: Uuid,
    pub input_id: Uuid,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAppData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_ado: Option<SyncAnnotation>,
    /// Annotations owned by other board plugins.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAnnotation {
    pub work_item_id: i64,
    /// Reference name -> digest of the raw tracker value last written.
    #[serde(default)]
    pub value_hash: BTreeMap<String, String>,
}

impl Task {
    pub fn sync_annotation(&self) -> Option<&SyncAnnotation> {
        self.app_data.as_ref()?.plugin_ado.as_ref()
    }

    pub fn work_item_id(&self) -> Option<i64> {
        self.sync_annotation().map(|a| a.work_item_id)
    }

    pub fn stored_hash(&self, reference_name: &str) -> Option<&str> {
        self.sync_annotation()?
            .value_hash
            .get(reference_name)
            .map(String::as_str)
    }

    pub fn value_for_input(&self, input_id: Uuid) -> Option<&TaskValue> {
        self.values.iter().find(|v| v.input_id() == input_id)
    }
}

/// Index of synced tasks by the tracker work item they mirror.
pub fn index_by_work_item(tasks: Vec<Task>) -> HashMap<i64, Task> {
    tasks
        .into_iter()
        .filter_map(|t| t.work_item_id().map(|id| (id, t)))
        .collect()
}

/// Full proposed task state sent to the board's upsert mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub id: Uuid,
    pub board_id: Uuid,
    pub sort: Option<String>,
    pub task_schema: Option<Value>,
    #[serde(serialize_with = "serialize_tagged_scalars")]
    pub scalar_values: Vec<ScalarValue>,
    pub list_values: Vec<OpaqueValue>,
    pub file_values: Vec<OpaqueValue>,
    pub task_reference_values: Vec<OpaqueValue>,
    pub app_data: TaskAppData,
}

impl From<&Task> for TaskUpdate {
    fn from(task: &Task) -> Self {
        let mut update = TaskUpdate {
            id: task.id,
            board_id: task.board_id,
            sort: task.sort.clone(),
            task_schema: task.task_schema.clone(),
            scalar_values: Vec::new(),
            list_values: Vec::new(),
            file_values: Vec::new(),
            task_reference_values: Vec::new(),
            app_data: task.app_data.clone().unwrap_or_default(),
        };
        for value in &task.values {
            match value {
                TaskValue::Scalar(v) => update.scalar_values.push(v.clone()),
                TaskValue::List(v) => update.list_values.push(v.clone()),
                TaskValue::File(v) => update.file_values.push(v.clone()),
                TaskValue::TaskReference(v) => update.task_reference_values.push(v.clone()),
            }
        }
        update
    }
}

impl TaskUpdate {
    /// Structural equality where value order does not matter.
    pub fn same_content(&self, other: &TaskUpdate) -> bool {
        self.id == other.id
            && self.board_id == other.board_id
            && self.sort == other.sort
            && self.task_schema == other.task_schema
            && self.app_data == other.app_data
            && by_input(&self.scalar_values, |v| v.input_id)
                == by_input(&other.scalar_values, |v| v.input_id)
            && by_input(&self.list_values, |v| v.input_id)
                == by_input(&other.list_values, |v| v.input_id)
            && by_input(&self.file_values, |v| v.input_id)
                == by_input(&other.file_values, |v| v.input_id)
            && by_input(&self.task_reference_values, |v| v.input_id)
                == by_input(&other.task_reference_values, |v| v.input_id)
    }

    pub fn work_item_id(&self) -> Option<i64> {
        self.app_data.plugin_ado.as_ref().map(|a| a.work_item_id)
    }
}

/// Scalar values go out with their `"type": "scalar"` discriminator.
fn serialize_tagged_scalars<S: Serializer>(
    values: &[ScalarValue],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().cloned().map(TaskValue::Scalar))
}

fn by_input<T>(values: &[T], key: impl Fn(&T) -> Uuid) -> BTreeMap<Uuid, Vec<&T>> {
    let mut map: BTreeMap<Uuid, Vec<&T>> = BTreeMap::new();
    for v in values {
        map.entry(key(v)).or_default().push(v);
    }
    map
}
