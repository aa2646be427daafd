//! Rows and column metadata

use std::sync::Arc;

use crate::{FbError, SqlType, SqlValue};

/// Description of one output column, known after prepare
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub alias: String,
    pub table: String,
    pub sql_type: SqlType,
    pub subtype: i32,
    pub size: i32,
    pub scale: i32,
}

impl ColumnMeta {
    pub fn new<S: Into<String>>(name: S, sql_type: SqlType) -> Self {
        let name = name.into();
        ColumnMeta {
            alias: name.clone(),
            name,
            table: String::new(),
            sql_type,
            subtype: 0,
            size: 0,
            scale: 0,
        }
    }
}

/// One fetched or user assembled row.
///
/// Columns are 1-indexed in every accessor, following the sql
/// convention the server uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
    columns: Arc<Vec<ColumnMeta>>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Row {
            values,
            columns: Arc::new(vec![]),
        }
    }

    /// An empty row, what a sync fetch leaves behind at end of cursor
    pub fn empty() -> Self {
        Row::default()
    }

    /// Attach the column descriptors of the producing statement
    pub fn with_columns(mut self, columns: Arc<Vec<ColumnMeta>>) -> Self {
        self.columns = columns;
        self
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the value of the 1-indexed column
    pub fn get(&self, column: usize) -> Result<&SqlValue, FbError> {
        column
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .ok_or(FbError::ColumnIndex(column))
    }

    /// Get the value of the column with the given name. The match is
    /// case insensitive and the first matching column wins.
    pub fn get_by_name(&self, name: &str) -> Result<&SqlValue, FbError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name) || c.alias.eq_ignore_ascii_case(name))
            .ok_or_else(|| FbError::UnknownColumn(name.to_string()))?;

        self.values
            .get(idx)
            .ok_or_else(|| FbError::UnknownColumn(name.to_string()))
    }

    /// Shorthand null test for the 1-indexed column
    pub fn is_null(&self, column: usize) -> Result<bool, FbError> {
        self.get(column).map(|v| v.is_null())
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn columns(&self) -> &Arc<Vec<ColumnMeta>> {
        &self.columns
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Row {
        let columns = Arc::new(vec![
            ColumnMeta::new("ID", SqlType::Int),
            ColumnMeta::new("NAME", SqlType::String),
        ]);

        Row::new(vec![SqlValue::Int(7), SqlValue::Null]).with_columns(columns)
    }

    #[test]
    fn one_indexed_access() {
        let row = sample();

        assert_eq!(row.get(1).unwrap(), &SqlValue::Int(7));
        assert!(row.get(2).unwrap().is_null());
        assert_eq!(row.get(0), Err(FbError::ColumnIndex(0)));
        assert_eq!(row.get(3), Err(FbError::ColumnIndex(3)));

        assert!(!row.is_null(1).unwrap());
        assert!(row.is_null(2).unwrap());
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let row = sample();

        assert_eq!(row.get_by_name("id").unwrap(), &SqlValue::Int(7));
        assert_eq!(row.get_by_name("Name").unwrap(), &SqlValue::Null);
        assert_eq!(
            row.get_by_name("missing"),
            Err(FbError::UnknownColumn("missing".to_string()))
        );
    }
}
