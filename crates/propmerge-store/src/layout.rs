//! Table and column names of the proposal store, and row decoding.
//!
//! Rows arrive as JSON objects (DuckDB `to_json` of the whole row), so the
//! same decoder serves every backend. Columns the layout does not name are
//! kept on the proposal as pass-through attributes.

use std::path::Path;

use chrono::NaiveDate;
use propmerge_core::{CodeSet, DateRange, SourceProposal};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::StoreError;

/// A table whose rows reference proposals and follow retained ones into staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTable {
    pub table: String,
    pub proposal_column: String,
}

impl ChildTable {
    pub fn new(table: &str, proposal_column: &str) -> Self {
        Self {
            table: table.to_string(),
            proposal_column: proposal_column.to_string(),
        }
    }
}

/// Where proposals live and what their columns are called.
///
/// Every field has a default, so a layout file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    pub proposal_table: String,
    pub id_column: String,
    pub group_column: String,
    pub fingerprint_column: String,
    pub date_from_column: String,
    pub date_to_column: String,
    pub effective_from_column: String,
    pub effective_to_column: String,
    pub product_codes_column: String,
    pub plan_codes_column: String,
    pub retained_flag_column: String,
    pub consumed_by_column: String,
    pub consumed_reason_column: String,
    pub child_tables: Vec<ChildTable>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            proposal_table: "proposals".into(),
            id_column: "id".into(),
            group_column: "group_id".into(),
            fingerprint_column: "split_config_hash".into(),
            date_from_column: "date_from".into(),
            date_to_column: "date_to".into(),
            effective_from_column: "effective_from".into(),
            effective_to_column: "effective_to".into(),
            product_codes_column: "product_codes".into(),
            plan_codes_column: "plan_codes".into(),
            retained_flag_column: "is_retained".into(),
            consumed_by_column: "consumed_by".into(),
            consumed_reason_column: "consumed_reason".into(),
            child_tables: vec![
                ChildTable::new("hierarchies", "proposal_id"),
                ChildTable::new("split_participants", "proposal_id"),
            ],
        }
    }
}

impl TableLayout {
    /// Read a layout override file (JSON).
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        let layout: Self = serde_json::from_str(&text)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Check that every table and column name is a plain identifier.
    pub fn validate(&self) -> Result<(), StoreError> {
        for name in self.known_columns().into_iter().chain([
            self.proposal_table.as_str(),
            self.retained_flag_column.as_str(),
            self.consumed_by_column.as_str(),
            self.consumed_reason_column.as_str(),
        ]) {
            check_identifier(name)?;
        }
        for child in &self.child_tables {
            check_identifier(&child.table)?;
            check_identifier(&child.proposal_column)?;
        }
        Ok(())
    }

    fn known_columns(&self) -> [&str; 9] {
        [
            self.id_column.as_str(),
            self.group_column.as_str(),
            self.fingerprint_column.as_str(),
            self.date_from_column.as_str(),
            self.date_to_column.as_str(),
            self.effective_from_column.as_str(),
            self.effective_to_column.as_str(),
            self.product_codes_column.as_str(),
            self.plan_codes_column.as_str(),
        ]
    }

    fn is_bookkeeping_column(&self, name: &str) -> bool {
        self.known_columns().contains(&name)
            || name == self.retained_flag_column
            || name == self.consumed_by_column
            || name == self.consumed_reason_column
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`.
pub fn check_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Decode one stored row into a source proposal.
///
/// `index` is the zero-based position in the snapshot, used in error messages.
/// A missing effective start falls back to the whole date range.
pub fn decode_row(
    index: usize,
    row: &Value,
    layout: &TableLayout,
) -> Result<SourceProposal, StoreError> {
    let obj = row
        .as_object()
        .ok_or_else(|| StoreError::Other(format!("row {index}: not a JSON object")))?;

    let id = required_text(index, obj, &layout.id_column)?;
    let group_id = required_text(index, obj, &layout.group_column)?;
    let fingerprint = text(obj, &layout.fingerprint_column);

    let from = text(obj, &layout.date_from_column).ok_or_else(|| StoreError::MissingField {
        row: index,
        field: layout.date_from_column.clone(),
    })?;
    let date_range = DateRange::new(
        parse_date(&id, &layout.date_from_column, &from)?,
        optional_date(&id, obj, &layout.date_to_column)?,
    );
    let effective_date_range = match text(obj, &layout.effective_from_column) {
        Some(from) => DateRange::new(
            parse_date(&id, &layout.effective_from_column, &from)?,
            optional_date(&id, obj, &layout.effective_to_column)?,
        ),
        None => date_range,
    };

    let attributes: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !layout.is_bookkeeping_column(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(SourceProposal {
        id: id.into(),
        group_id: group_id.into(),
        split_config_fingerprint: fingerprint,
        date_range,
        effective_date_range,
        product_codes: codes(obj.get(&layout.product_codes_column)),
        plan_codes: codes(obj.get(&layout.plan_codes_column)),
        attributes,
    })
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_text(index: usize, obj: &Map<String, Value>, key: &str) -> Result<String, StoreError> {
    text(obj, key).ok_or_else(|| StoreError::MissingField {
        row: index,
        field: key.to_string(),
    })
}

fn optional_date(
    id: &str,
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<NaiveDate>, StoreError> {
    text(obj, key).map(|value| parse_date(id, key, &value)).transpose()
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(id: &str, field: &str, value: &str) -> Result<NaiveDate, StoreError> {
    let day = value.trim();
    let day = day.get(..10).unwrap_or(day);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| StoreError::InvalidDate {
        id: id.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn codes(value: Option<&Value>) -> CodeSet {
    match value {
        None | Some(Value::Null) => CodeSet::default(),
        Some(Value::String(raw)) => CodeSet::decode(raw),
        Some(Value::Array(items)) => CodeSet::from_codes(items.iter().map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        Some(other) => CodeSet::decode(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn decodes_full_row() {
        let row = json!({
            "id": 17,
            "group_id": "G-100",
            "split_config_hash": "abc123",
            "date_from": "2020-01-01",
            "date_to": "2021-12-31",
            "effective_from": "2020-02-01 00:00:00",
            "effective_to": null,
            "product_codes": "[\"DENTAL\",\"VISION\"]",
            "plan_codes": "*",
            "broker": "Acme",
            "is_retained": true,
            "consumed_by": null
        });
        let p = decode_row(0, &row, &TableLayout::default()).unwrap();

        assert_eq!(p.id.as_str(), "17");
        assert_eq!(p.group_id.as_str(), "G-100");
        assert_eq!(p.split_config_fingerprint.as_deref(), Some("abc123"));
        assert_eq!(p.date_range, DateRange::new(ymd(2020, 1, 1), Some(ymd(2021, 12, 31))));
        assert_eq!(p.effective_date_range, DateRange::open(ymd(2020, 2, 1)));
        assert_eq!(p.product_codes, CodeSet::from_codes(["DENTAL", "VISION"]));
        assert!(p.plan_codes.is_match_all());
        assert_eq!(p.attributes.len(), 1);
        assert_eq!(p.attributes["broker"], "Acme");
    }

    #[test]
    fn list_columns_and_malformed_codes() {
        let row = json!({
            "id": "p1",
            "group_id": "G",
            "date_from": "2020-01-01",
            "product_codes": ["DENTAL", "*"],
            "plan_codes": "PLAN1;PLAN2"
        });
        let p = decode_row(0, &row, &TableLayout::default()).unwrap();
        assert!(p.product_codes.is_match_all());
        assert_eq!(p.plan_codes, CodeSet::from_codes(["PLAN1;PLAN2"]));
        assert!(p.split_config_fingerprint.is_none());
    }

    #[test]
    fn missing_effective_start_uses_date_range() {
        let row = json!({
            "id": "p1",
            "group_id": "G",
            "date_from": "2020-01-01",
            "date_to": "2020-06-30"
        });
        let p = decode_row(0, &row, &TableLayout::default()).unwrap();
        assert_eq!(p.effective_date_range, p.date_range);
    }

    #[test]
    fn missing_id_is_an_error() {
        let row = json!({"group_id": "G", "date_from": "2020-01-01"});
        let err = decode_row(4, &row, &TableLayout::default()).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { row: 4, ref field } if field == "id"));
    }

    #[test]
    fn bad_date_is_an_error() {
        let row = json!({"id": "p1", "group_id": "G", "date_from": "01/02/2020"});
        let err = decode_row(0, &row, &TableLayout::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDate { .. }));
    }

    #[test]
    fn custom_layout_columns() {
        let layout: TableLayout = serde_json::from_value(json!({
            "id_column": "proposal_key",
            "group_column": "grp"
        }))
        .unwrap();
        assert_eq!(layout.plan_codes_column, "plan_codes");

        let row = json!({
            "proposal_key": "k",
            "grp": "G",
            "date_from": "2020-01-01",
            "id": "other"
        });
        let p = decode_row(0, &row, &layout).unwrap();
        assert_eq!(p.id.as_str(), "k");
        assert_eq!(p.attributes["id"], "other");
    }

    #[test]
    fn layout_rejects_unsafe_identifiers() {
        let layout = TableLayout {
            proposal_table: "proposals; DROP TABLE x".into(),
            ..TableLayout::default()
        };
        assert!(matches!(layout.validate(), Err(StoreError::InvalidIdentifier(_))));
        assert!(TableLayout::default().validate().is_ok());
        assert!(check_identifier("_staging2").is_ok());
        assert!(check_identifier("2staging").is_err());
        assert!(check_identifier("").is_err());
    }

    #[test]
    fn layout_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(
            &path,
            r#"{"proposal_table": "proposal_snapshot", "child_tables": []}"#,
        )
        .unwrap();
        let layout = TableLayout::from_file(&path).unwrap();
        assert_eq!(layout.proposal_table, "proposal_snapshot");
        assert!(layout.child_tables.is_empty());
        assert_eq!(layout.id_column, "id");
    }
}
