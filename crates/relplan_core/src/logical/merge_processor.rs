use relplan_error::{DbError, OptionExt, Result};

use super::logical_merge::{MergeCaseKind, MergeDetails};
use crate::catalog::{ColumnHandle, RowChangeParadigm};
use crate::types::datatype::DataType;
use crate::types::scalar::ScalarValue;

/// A physical change to a single row of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Insert {
        values: Vec<ScalarValue>,
    },
    Delete {
        row_id: ScalarValue,
    },
    /// In-place change of only the given columns.
    Update {
        row_id: ScalarValue,
        values: Vec<(ColumnHandle, ScalarValue)>,
    },
}

/// Column layout shared by the row change processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRowLayout {
    /// Data columns in the order they appear in the merge row.
    pub data_columns: Vec<ColumnHandle>,
    pub data_column_types: Vec<DataType>,
    pub redistribution_columns: Vec<ColumnHandle>,
    pub row_id_type: DataType,
}

impl MergeRowLayout {
    /// Split a merge row into its data values, case number and operation
    /// code.
    fn decode<'a>(&self, merge_row: &'a ScalarValue) -> Result<DecodedMergeRow<'a>> {
        let fields = match merge_row {
            ScalarValue::Struct(fields) => fields,
            other => return Err(DbError::new(format!("Merge row is not a row value: {other}"))),
        };

        let expected = self.data_columns.len() + 2;
        if fields.len() != expected {
            return Err(DbError::new("Merge row has the wrong number of fields")
                .with_field("expected", expected)
                .with_field("got", fields.len()));
        }

        let (data, tail) = fields.split_at(self.data_columns.len());
        let case_number = tail[0].try_as_i64()?;
        let operation = tail[1].try_as_i64()?;
        let operation = i32::try_from(operation).map_err(|_| {
            DbError::new("Merge operation out of range").with_field("operation", operation)
        })?;

        Ok(DecodedMergeRow {
            data,
            case_number,
            operation,
        })
    }
}

struct DecodedMergeRow<'a> {
    data: &'a [ScalarValue],
    case_number: i64,
    operation: i32,
}

/// Updates are written as a delete of the old row followed by an insert of
/// the full new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAndInsertMergeProcessor {
    pub layout: MergeRowLayout,
}

/// Updates are written as in-place changes of only the assigned columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOnlyUpdatedColumnsMergeProcessor {
    pub layout: MergeRowLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChangeProcessor {
    DeleteAndInsert(DeleteAndInsertMergeProcessor),
    ChangeOnlyUpdatedColumns(ChangeOnlyUpdatedColumnsMergeProcessor),
}

impl RowChangeProcessor {
    pub fn new(paradigm: RowChangeParadigm, layout: MergeRowLayout) -> Self {
        match paradigm {
            RowChangeParadigm::DeleteRowAndInsertRow => {
                Self::DeleteAndInsert(DeleteAndInsertMergeProcessor { layout })
            }
            RowChangeParadigm::ChangeOnlyUpdatedColumns => {
                Self::ChangeOnlyUpdatedColumns(ChangeOnlyUpdatedColumnsMergeProcessor { layout })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeleteAndInsert(_) => "DeleteAndInsertMergeProcessor",
            Self::ChangeOnlyUpdatedColumns(_) => "ChangeOnlyUpdatedColumnsMergeProcessor",
        }
    }

    pub fn layout(&self) -> &MergeRowLayout {
        match self {
            Self::DeleteAndInsert(p) => &p.layout,
            Self::ChangeOnlyUpdatedColumns(p) => &p.layout,
        }
    }

    /// Translate one merge row and its row id into row changes.
    ///
    /// Rows that matched no case produce no changes.
    pub fn process_row(
        &self,
        details: &MergeDetails,
        merge_row: &ScalarValue,
        row_id: &ScalarValue,
    ) -> Result<Vec<RowChange>> {
        let layout = self.layout();
        let row = layout.decode(merge_row)?;

        if row.operation == MergeCaseKind::NO_MATCH {
            return Ok(Vec::new());
        }

        let kind = MergeCaseKind::from_operation_number(row.operation).ok_or_else(|| {
            DbError::new("Unrecognized merge operation").with_field("operation", row.operation)
        })?;

        let changes = match (kind, self) {
            (MergeCaseKind::Insert, _) => vec![RowChange::Insert {
                values: row.data.to_vec(),
            }],
            (MergeCaseKind::Delete, _) => vec![RowChange::Delete {
                row_id: row_id.clone(),
            }],
            (MergeCaseKind::Update, Self::DeleteAndInsert(_)) => vec![
                RowChange::Delete {
                    row_id: row_id.clone(),
                },
                RowChange::Insert {
                    values: row.data.to_vec(),
                },
            ],
            (MergeCaseKind::Update, Self::ChangeOnlyUpdatedColumns(_)) => {
                let case = usize::try_from(row.case_number)
                    .ok()
                    .and_then(|n| details.case(n))
                    .required("merge case details")?;

                let values = case
                    .columns
                    .iter()
                    .map(|column| {
                        let idx = layout
                            .data_columns
                            .iter()
                            .position(|c| c == column)
                            .required("updated column in merge row")?;
                        Ok((column.clone(), row.data[idx].clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;

                vec![RowChange::Update {
                    row_id: row_id.clone(),
                    values,
                }]
            }
        };

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::logical_merge::MergeCaseDetails;

    fn layout() -> MergeRowLayout {
        MergeRowLayout {
            data_columns: vec![ColumnHandle::new("id"), ColumnHandle::new("qty")],
            data_column_types: vec![DataType::Int64, DataType::Int32],
            redistribution_columns: Vec::new(),
            row_id_type: DataType::Int64,
        }
    }

    fn details() -> MergeDetails {
        MergeDetails {
            cases: vec![
                MergeCaseDetails {
                    case_number: 0,
                    kind: MergeCaseKind::Update,
                    columns: vec![ColumnHandle::new("qty")],
                },
                MergeCaseDetails {
                    case_number: 1,
                    kind: MergeCaseKind::Insert,
                    columns: vec![ColumnHandle::new("id"), ColumnHandle::new("qty")],
                },
            ],
        }
    }

    fn merge_row(id: i64, qty: i32, case: i32, op: i32) -> ScalarValue {
        ScalarValue::Struct(vec![
            ScalarValue::Int64(id),
            ScalarValue::Int32(qty),
            ScalarValue::Int32(case),
            ScalarValue::Int32(op),
        ])
    }

    #[test]
    fn delete_and_insert_update() {
        let processor = RowChangeProcessor::new(RowChangeParadigm::DeleteRowAndInsertRow, layout());
        let changes = processor
            .process_row(&details(), &merge_row(4, 10, 0, 3), &ScalarValue::Int64(99))
            .unwrap();

        assert_eq!(
            vec![
                RowChange::Delete {
                    row_id: ScalarValue::Int64(99)
                },
                RowChange::Insert {
                    values: vec![ScalarValue::Int64(4), ScalarValue::Int32(10)]
                },
            ],
            changes
        );
    }

    #[test]
    fn change_only_updated_columns() {
        let processor =
            RowChangeProcessor::new(RowChangeParadigm::ChangeOnlyUpdatedColumns, layout());
        let changes = processor
            .process_row(&details(), &merge_row(4, 10, 0, 3), &ScalarValue::Int64(99))
            .unwrap();

        assert_eq!(
            vec![RowChange::Update {
                row_id: ScalarValue::Int64(99),
                values: vec![(ColumnHandle::new("qty"), ScalarValue::Int32(10))],
            }],
            changes
        );
    }

    #[test]
    fn no_match_produces_nothing() {
        let processor = RowChangeProcessor::new(RowChangeParadigm::DeleteRowAndInsertRow, layout());
        let row = ScalarValue::Struct(vec![
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Int32(-1),
            ScalarValue::Int32(-1),
        ]);
        let changes = processor
            .process_row(&details(), &row, &ScalarValue::Null)
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn wrong_arity_errors() {
        let processor = RowChangeProcessor::new(RowChangeParadigm::DeleteRowAndInsertRow, layout());
        let row = ScalarValue::Struct(vec![ScalarValue::Int32(1), ScalarValue::Int32(1)]);
        processor
            .process_row(&details(), &row, &ScalarValue::Null)
            .unwrap_err();
    }

    #[test]
    fn operation_out_of_range_errors() {
        let processor = RowChangeProcessor::new(RowChangeParadigm::DeleteRowAndInsertRow, layout());
        // Would be an update if truncated to 32 bits.
        let row = ScalarValue::Struct(vec![
            ScalarValue::Int64(4),
            ScalarValue::Int32(10),
            ScalarValue::Int32(0),
            ScalarValue::Int64((1_i64 << 32) + 3),
        ]);
        let err = processor
            .process_row(&details(), &row, &ScalarValue::Int64(99))
            .unwrap_err();
        assert_eq!(relplan_error::ErrorKind::Internal, err.kind());
    }
}
