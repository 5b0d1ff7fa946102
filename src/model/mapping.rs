use tracing::warn;

use super::board::{BoardInput, Schema};

/// Tracker reference name -> board input, in schema order.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    entries: Vec<(String, BoardInput)>,
}

impl FieldMapping {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut entries: Vec<(String, BoardInput)> = Vec::new();
        for input in &schema.inputs {
            let Some(reference_name) = input.reference_name() else {
                continue;
            };
            if entries.iter().any(|(r, _)| r == reference_name) {
                warn!(
                    "Field {reference_name} is mapped by more than one input; ignoring input {}",
                    input.id
                );
                continue;
            }
            entries.push((reference_name.to_string(), input.clone()));
        }
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoardInput)> {
        self.entries.iter().map(|(r, i)| (r.as_str(), i))
    }

    pub fn reference_names(&self) -> Vec<String> {
        self.entries.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn get(&self, reference_name: &str) -> Option<&BoardInput> {
        self.entries
            .iter()
            .find(|(r, _)| r == reference_name)
            .map(|(_, i)| i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
