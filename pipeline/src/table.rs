//! Shaping record sets into relational tables.
//!
//! Columns appear in first-seen order across the records. Each column's type is
//! inferred from its non-null values; a record lacking a column contributes NULL.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::camara::Record;

/// SQL type of a column, chosen from the values it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Boolean,
    Text,
}

impl ColumnKind {
    /// Type name accepted by both PostgreSQL and SQLite.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Real => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Text => "TEXT",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Real),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(Self::Text),
        }
    }

    const fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Integer, Self::Integer) => Self::Integer,
            (Self::Boolean, Self::Boolean) => Self::Boolean,
            (Self::Integer | Self::Real, Self::Integer | Self::Real) => Self::Real,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A value converted to its column's type, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Integer(Option<i64>),
    Real(Option<f64>),
    Boolean(Option<bool>),
    Text(Option<String>),
}

impl Cell {
    #[must_use]
    pub fn new(kind: ColumnKind, value: &Value) -> Self {
        match kind {
            ColumnKind::Integer => Self::Integer(value.as_i64()),
            ColumnKind::Real => Self::Real(value.as_f64()),
            ColumnKind::Boolean => Self::Boolean(value.as_bool()),
            ColumnKind::Text => Self::Text(match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
        }
    }
}

/// Columns plus row-major values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table from untyped records, inferring column types.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut kinds: Vec<Option<ColumnKind>> = Vec::new();

        for record in records {
            for (key, value) in record {
                let index = match names.iter().position(|n| n == key) {
                    Some(index) => index,
                    None => {
                        names.push(key.clone());
                        kinds.push(None);
                        names.len() - 1
                    }
                };
                if let Some(kind) = ColumnKind::of(value) {
                    kinds[index] = Some(kinds[index].map_or(kind, |k| k.merge(kind)));
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                names
                    .iter()
                    .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        let columns = names
            .into_iter()
            .zip(kinds)
            .map(|(name, kind)| Column {
                name,
                kind: kind.unwrap_or(ColumnKind::Text),
            })
            .collect();

        Self { columns, rows }
    }

    /// A table with the given columns and no rows.
    #[must_use]
    pub const fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from serializable rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a row does not serialize to a JSON object.
    pub fn from_rows<T: Serialize>(rows: &[T]) -> Result<Self, serde_json::Error> {
        let records = rows
            .iter()
            .map(|row| match serde_json::to_value(row)? {
                Value::Object(map) => Ok(map),
                other => Err(serde::ser::Error::custom(format!(
                    "expected an object row, got {other}"
                ))),
            })
            .collect::<Result<Vec<Record>, serde_json::Error>>()?;
        Ok(Self::from_records(&records))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one row converted to their column types.
    pub fn cells(&self, row: usize) -> impl Iterator<Item = Cell> + '_ {
        self.columns
            .iter()
            .zip(&self.rows[row])
            .map(|(column, value)| Cell::new(column.kind, value))
    }

    /// Rows back as records keyed by column name.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    /// Deserialize every row into `T`.
    ///
    /// # Errors
    ///
    /// Returns the first row that does not fit `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.records()
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn columns_follow_first_seen_order() {
        let table = Table::from_records(&records(json!([
            {"id": 1, "nome": "A"},
            {"siglaUf": "SP", "id": 2}
        ])));

        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "nome", "siglaUf"]);
        assert_eq!(table.rows[0], vec![json!(1), json!("A"), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(2), Value::Null, json!("SP")]);
    }

    #[test]
    fn column_kinds_are_inferred() {
        let table = Table::from_records(&records(json!([
            {"i": 1, "r": 1, "b": true, "t": "x", "n": null, "mixed": 1, "obj": {"a": 1}},
            {"i": 2, "r": 2.5, "b": false, "t": "y", "n": null, "mixed": "one", "obj": null}
        ])));

        let kinds: Vec<_> = table.columns.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("i", ColumnKind::Integer),
                ("r", ColumnKind::Real),
                ("b", ColumnKind::Boolean),
                ("t", ColumnKind::Text),
                ("n", ColumnKind::Text),
                ("mixed", ColumnKind::Text),
                ("obj", ColumnKind::Text),
            ]
        );
    }

    #[test]
    fn cells_follow_column_kind() {
        let table = Table::from_records(&records(json!([
            {"valor": 10, "tag": 5, "obj": {"a": [1]}},
            {"valor": 10.5, "tag": "x", "obj": null}
        ])));

        let first: Vec<_> = table.cells(0).collect();
        assert_eq!(
            first,
            vec![
                Cell::Real(Some(10.0)),
                Cell::Text(Some("5".into())),
                Cell::Text(Some(r#"{"a":[1]}"#.into())),
            ]
        );
        let second: Vec<_> = table.cells(1).collect();
        assert_eq!(second[2], Cell::Text(None));
    }

    #[test]
    fn sql_types() {
        insta::assert_snapshot!(
            [ColumnKind::Integer, ColumnKind::Real, ColumnKind::Boolean, ColumnKind::Text]
                .map(ColumnKind::sql_type)
                .join(", "),
            @"BIGINT, DOUBLE PRECISION, BOOLEAN, TEXT"
        );
    }

    #[test]
    fn typed_rows_round_trip_through_records() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Row {
            id: i64,
            sala: Option<String>,
        }

        let rows = vec![
            Row { id: 1, sala: Some("301".into()) },
            Row { id: 2, sala: None },
        ];
        let table = Table::from_rows(&rows).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns[1].kind, ColumnKind::Text);
        assert_eq!(table.to_typed::<Row>().unwrap(), rows);
    }

    #[test]
    fn empty_record_set_has_no_columns() {
        let table = Table::from_records(&[]);
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }

    #[test]
    fn empty_table_keeps_given_columns() {
        let table = Table::empty(vec![Column {
            name: "id".into(),
            kind: ColumnKind::Integer,
        }]);
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 1);
        assert!(table.records().is_empty());
    }
}
