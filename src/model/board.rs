use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub app_data: Option<BoardAppData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardAppData {
    #[serde(default)]
    pub plugin_ado: Option<BoardTrackerSettings>,
}

/// Tracker connection settings an operator may store on the board itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardTrackerSettings {
    pub org_url: String,
    pub token: String,
    pub project: String,
    #[serde(default)]
    pub task_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub inputs: Vec<BoardInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInput {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub app_data: Option<InputAppData>,
}

impl BoardInput {
    /// The tracker field this input is fed from, if the operator mapped one.
    pub fn reference_name(&self) -> Option<&str> {
        self.app_data
            .as_ref()?
            .plugin_ado
            .as_ref()
            .map(|p| p.reference_name.as_str())
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAppData {
    #[serde(default)]
    pub plugin_ado: Option<InputMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMapping {
    pub reference_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    Text,
    Select,
    #[serde(other)]
    Other,
}

impl InputType {
    /// Only text-like inputs are materialized as scalar string values.
    pub fn is_scalar_text(&self) -> bool {
        matches!(self, InputType::Text | InputType::Select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_input_types_map_to_other() {
        let input: BoardInput = serde_json::from_str(
            r#"{"id":"6f1c1f38-8d0e-4c43-9a43-0d6e2b1b9a01","name":"Due","type":"date"}"#,
        )
        .unwrap();
        assert_eq!(input.input_type, InputType::Other);
        assert!(!input.input_type.is_scalar_text());
        assert_eq!(input.reference_name(), None);
    }

    #[test]
    fn reference_name_is_read_from_app_data() {
        let input: BoardInput = serde_json::from_str(
            r#"{"id":"6f1c1f38-8d0e-4c43-9a43-0d6e2b1b9a01","name":"Title","type":"text",
                "appData":{"pluginAdo":{"referenceName":"System.Title"}}}"#,
        )
        .unwrap();
        assert_eq!(input.input_type, InputType::Text);
        assert_eq!(input.reference_name(), Some("System.Title"));
    }

    #[test]
    fn empty_reference_name_is_unmapped() {
        let input: BoardInput = serde_json::from_str(
            r#"{"id":"6f1c1f38-8d0e-4c43-9a43-0d6e2b1b9a01","type":"select",
                "appData":{"pluginAdo":{"referenceName":""}}}"#,
        )
        .unwrap();
        assert_eq!(input.reference_name(), None);
    }
}
