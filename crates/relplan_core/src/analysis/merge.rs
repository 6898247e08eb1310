use ahash::HashMap;

use super::ast::NodeId;
use super::scope::ScopeId;
use crate::catalog::{ColumnHandle, TableLayout};
use crate::types::datatype::DataType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub datatype: DataType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnSchema {
            name: name.into(),
            datatype,
        }
    }
}

/// Analysis of a MERGE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeAnalysis {
    /// The table reference of the target.
    pub target_table: NodeId,
    /// Visible columns of the target in declaration order.
    pub data_column_schemas: Vec<ColumnSchema>,
    pub data_column_handles: Vec<ColumnHandle>,
    /// Columns rows are redistributed on before writing.
    pub redistribution_column_handles: Vec<ColumnHandle>,
    /// Position of each target column in the target relation.
    pub column_handle_field_numbers: HashMap<ColumnHandle, usize>,
    /// Scope spanning target and source, used for the MERGE predicate and
    /// the case expressions.
    pub join_scope: ScopeId,
    pub new_table_layout: Option<TableLayout>,
}
