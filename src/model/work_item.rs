use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const WORK_ITEM_TYPE_FIELD: &str = "System.WorkItemType";

/// A work item snapshot as returned by the tracker's batch endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, FieldValue>>,
}

/// Raw tracker field value. Null values deserialize into `Null` so that a
/// field explicitly cleared on the tracker side looks the same as a missing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Structured(Value),
}

impl FieldValue {
    /// Coerces the value to the text written into the board.
    ///
    /// Returns `None` for null and empty values. Identity references
    /// (`System.AssignedTo` and friends) collapse to their display name.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            FieldValue::Null => return None,
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Structured(v) => identity_name(v).unwrap_or_else(|| v.to_string()),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn identity_name(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    ["displayName", "uniqueName"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl WorkItem {
    pub fn field_text(&self, reference_name: &str) -> Option<String> {
        self.fields
            .as_ref()?
            .get(reference_name)
            .and_then(FieldValue::as_text)
    }

    pub fn work_item_type(&self) -> Option<String> {
        self.field_text(WORK_ITEM_TYPE_FIELD)
    }
}
