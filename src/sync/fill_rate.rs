use std::collections::BTreeMap;

use crate::model::mapping::FieldMapping;
use crate::model::work_item::WorkItem;

const UNKNOWN_TYPE: &str = "(unknown type)";

/// How often each tracker field carries a value, per work item type.
#[derive(Debug, Default)]
pub struct FillRates {
    by_type: BTreeMap<String, TypeFill>,
}

#[derive(Debug, Default)]
struct TypeFill {
    items: usize,
    filled: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillRow {
    pub work_item_type: String,
    pub reference_name: String,
    pub filled: usize,
    pub total: usize,
}

impl FillRow {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.filled as f64 * 100.0 / self.total as f64
        }
    }
}

impl FillRates {
    pub fn add(&mut self, items: &[WorkItem]) {
        for item in items {
            let Some(fields) = &item.fields else {
                continue;
            };
            let work_item_type = item
                .work_item_type()
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
            let fill = self.by_type.entry(work_item_type).or_default();
            fill.items += 1;
            for (reference_name, value) in fields {
                if value.as_text().is_some() {
                    *fill.filled.entry(reference_name.clone()).or_default() += 1;
                }
            }
        }
    }

    pub fn total_items(&self) -> usize {
        self.by_type.values().map(|f| f.items).sum()
    }

    /// Rows grouped by type, best-populated fields first.
    pub fn rows(&self) -> Vec<FillRow> {
        let mut rows = Vec::new();
        for (work_item_type, fill) in &self.by_type {
            let mut fields: Vec<(&String, &usize)> = fill.filled.iter().collect();
            fields.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            rows.extend(fields.into_iter().map(|(reference_name, filled)| FillRow {
                work_item_type: work_item_type.clone(),
                reference_name: reference_name.clone(),
                filled: *filled,
                total: fill.items,
            }));
        }
        rows
    }

    /// Plain-text report; fields already feeding a board input are starred.
    pub fn render(&self, mapping: &FieldMapping) -> String {
        let mut out = format!("{} work items sampled\n", self.total_items());
        let mut current_type: Option<&str> = None;
        let rows = self.rows();
        for row in &rows {
            if current_type != Some(row.work_item_type.as_str()) {
                out.push_str(&format!("\n{} ({} items)\n", row.work_item_type, row.total));
                current_type = Some(row.work_item_type.as_str());
            }
            let marker = match mapping.get(&row.reference_name) {
                Some(input) => format!(" * -> {}", input.name),
                None => String::new(),
            };
            out.push_str(&format!(
                "  {:>5.1}%  {:>6}  {}{marker}\n",
                row.percent(),
                row.filled,
                row.reference_name
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::board::InputType;
    use crate::providers::tests::{input, schema, work_item};

    fn sample() -> FillRates {
        let mut rates = FillRates::default();
        rates.add(&[
            work_item(1, &[("System.WorkItemType", "Bug"), ("System.Title", "a"), ("Repro", "steps")]),
            work_item(2, &[("System.WorkItemType", "Bug"), ("System.Title", "b"), ("Repro", "")]),
            work_item(3, &[("System.WorkItemType", "User Story"), ("System.Title", "c")]),
        ]);
        rates
    }

    #[test]
    fn counts_non_empty_values_per_type() {
        let rows = sample().rows();
        assert_eq!(
            rows,
            vec![
                FillRow {
                    work_item_type: "Bug".into(),
                    reference_name: "System.Title".into(),
                    filled: 2,
                    total: 2
                },
                FillRow {
                    work_item_type: "Bug".into(),
                    reference_name: "System.WorkItemType".into(),
                    filled: 2,
                    total: 2
                },
                FillRow {
                    work_item_type: "Bug".into(),
                    reference_name: "Repro".into(),
                    filled: 1,
                    total: 2
                },
                FillRow {
                    work_item_type: "User Story".into(),
                    reference_name: "System.Title".into(),
                    filled: 1,
                    total: 1
                },
                FillRow {
                    work_item_type: "User Story".into(),
                    reference_name: "System.WorkItemType".into(),
                    filled: 1,
                    total: 1
                },
            ]
        );
        assert_eq!(rows[2].percent(), 50.0);
    }

    #[test]
    fn items_without_type_or_fields() {
        let mut rates = FillRates::default();
        rates.add(&[
            work_item(1, &[("System.Title", "a")]),
            WorkItem { id: Some(2), fields: None },
        ]);
        assert_eq!(rates.total_items(), 1);
        assert_eq!(rates.rows()[0].work_item_type, UNKNOWN_TYPE);
    }

    #[test]
    fn render_marks_mapped_fields() {
        let mapping = FieldMapping::from_schema(&schema(vec![input(
            Some("System.Title"),
            InputType::Text,
        )]));
        let text = sample().render(&mapping);
        assert!(text.starts_with("3 work items sampled\n"));
        assert!(text.contains("\nBug (2 items)\n"));
        assert!(text.contains("  100.0%       2  System.Title * -> System.Title\n"));
        assert!(text.contains("   50.0%       1  Repro\n"));
    }
}
