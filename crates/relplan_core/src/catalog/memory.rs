use ahash::HashMap;
use indexmap::IndexMap;
use relplan_error::{DbError, Result};

use super::{ColumnHandle, Metadata, RowChangeParadigm, TableHandle, TableMetadata};

#[derive(Debug, Clone)]
struct MemoryTable {
    metadata: TableMetadata,
    paradigm: RowChangeParadigm,
}

/// Metadata held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    tables: HashMap<TableHandle, MemoryTable>,
}

impl MemoryMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a table, erroring on a duplicate handle.
    pub fn create_table(
        &mut self,
        metadata: TableMetadata,
        paradigm: RowChangeParadigm,
    ) -> Result<()> {
        let handle = metadata.table.clone();
        if self.tables.contains_key(&handle) {
            return Err(DbError::new(format!("Duplicate table name: '{handle}'")));
        }
        self.tables.insert(handle, MemoryTable { metadata, paradigm });
        Ok(())
    }

    fn require_table(&self, table: &TableHandle) -> Result<&MemoryTable> {
        self.tables
            .get(table)
            .ok_or_else(|| DbError::new(format!("Missing table '{table}'")))
    }
}

impl Metadata for MemoryMetadata {
    fn get_table_metadata(&self, table: &TableHandle) -> Result<Option<TableMetadata>> {
        Ok(self.tables.get(table).map(|t| t.metadata.clone()))
    }

    fn get_column_handles(&self, table: &TableHandle) -> Result<IndexMap<String, ColumnHandle>> {
        let table = self.require_table(table)?;
        Ok(table
            .metadata
            .columns
            .iter()
            .map(|c| (c.name.clone(), ColumnHandle::new(c.name.clone())))
            .collect())
    }

    fn get_row_change_paradigm(&self, table: &TableHandle) -> Result<RowChangeParadigm> {
        Ok(self.require_table(table)?.paradigm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnMetadata;
    use crate::types::datatype::DataType;

    fn orders() -> TableMetadata {
        TableMetadata {
            table: TableHandle::new("memory", "main", "orders"),
            columns: vec![
                ColumnMetadata::new("id", DataType::Int64),
                ColumnMetadata::new("amount", DataType::Float64),
                ColumnMetadata::new_hidden("$row_id", DataType::Int64),
            ],
        }
    }

    #[test]
    fn create_and_get() {
        let mut metadata = MemoryMetadata::empty();
        metadata
            .create_table(orders(), RowChangeParadigm::DeleteRowAndInsertRow)
            .unwrap();

        let handle = TableHandle::new("memory", "main", "orders");
        let table = metadata.require_get_table_metadata(&handle).unwrap();
        let visible: Vec<_> = table.visible_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(vec!["id", "amount"], visible);

        let handles = metadata.get_column_handles(&handle).unwrap();
        assert_eq!(3, handles.len());
        assert_eq!(
            RowChangeParadigm::DeleteRowAndInsertRow,
            metadata.get_row_change_paradigm(&handle).unwrap()
        );
    }

    #[test]
    fn duplicate_and_missing() {
        let mut metadata = MemoryMetadata::empty();
        metadata
            .create_table(orders(), RowChangeParadigm::ChangeOnlyUpdatedColumns)
            .unwrap();
        metadata
            .create_table(orders(), RowChangeParadigm::ChangeOnlyUpdatedColumns)
            .unwrap_err();

        let missing = TableHandle::new("memory", "main", "missing");
        assert!(metadata.get_table_metadata(&missing).unwrap().is_none());
        metadata.require_get_table_metadata(&missing).unwrap_err();
    }
}
