pub mod memory;

use std::fmt::{self, Debug};

use indexmap::IndexMap;
use relplan_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::types::datatype::DataType;

/// Opaque reference to a table, resolved during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableHandle {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableHandle {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        TableHandle {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Opaque reference to a column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnHandle {
    pub name: String,
}

impl ColumnHandle {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnHandle { name: name.into() }
    }
}

impl fmt::Display for ColumnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub datatype: DataType,
    /// Hidden columns (such as the row id) are not part of `SELECT *` and
    /// can't be assigned to.
    pub hidden: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnMetadata {
            name: name.into(),
            datatype,
            hidden: false,
        }
    }

    pub fn new_hidden(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnMetadata {
            name: name.into(),
            datatype,
            hidden: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table: TableHandle,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    /// Iterate the non-hidden columns in declaration order.
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| !c.hidden)
    }
}

/// How a table applies row changes produced by a MERGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowChangeParadigm {
    /// Updated rows are deleted and reinserted in full.
    DeleteRowAndInsertRow,
    /// Only the columns assigned by the update are written.
    ChangeOnlyUpdatedColumns,
}

impl fmt::Display for RowChangeParadigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteRowAndInsertRow => write!(f, "DeleteRowAndInsertRow"),
            Self::ChangeOnlyUpdatedColumns => write!(f, "ChangeOnlyUpdatedColumns"),
        }
    }
}

/// Layout rows must be redistributed with before being written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Name of the partitioning function, None for the default hash
    /// partitioning.
    pub partitioning: Option<String>,
    /// Columns the partitioning function is applied to.
    pub partition_columns: Vec<String>,
}

/// Table and column schema information the planner needs.
pub trait Metadata: Debug + Sync + Send {
    /// Get the metadata for a table.
    ///
    /// Returns Ok(None) if the table doesn't exist.
    fn get_table_metadata(&self, table: &TableHandle) -> Result<Option<TableMetadata>>;

    /// Get the column handles for a table keyed by column name, in column
    /// declaration order.
    fn get_column_handles(&self, table: &TableHandle) -> Result<IndexMap<String, ColumnHandle>>;

    fn get_row_change_paradigm(&self, table: &TableHandle) -> Result<RowChangeParadigm>;

    /// Get table metadata, erroring if the table doesn't exist.
    fn require_get_table_metadata(&self, table: &TableHandle) -> Result<TableMetadata> {
        self.get_table_metadata(table)?
            .ok_or_else(|| DbError::new(format!("Missing table '{table}'")))
    }
}
