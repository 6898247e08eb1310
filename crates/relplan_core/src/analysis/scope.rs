use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ColumnHandle;
use crate::types::datatype::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Identifies one relation produced during analysis. Fields of a relation
/// are addressed by their position in the relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    pub relation: RelationId,
    pub index: usize,
}

impl FieldId {
    pub const fn new(relation: RelationId, index: usize) -> Self {
        FieldId { relation, index }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation.0, self.index)
    }
}

/// A column of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub relation_alias: Option<String>,
    /// None for anonymous expressions in a select list.
    pub name: Option<String>,
    pub datatype: DataType,
    /// Hidden fields (row ids) aren't visible to `*` expansion or set
    /// operations.
    pub hidden: bool,
    /// Column of a base table this field reads from.
    pub column: Option<ColumnHandle>,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            relation_alias: None,
            name: Some(name.into()),
            datatype,
            hidden: false,
            column: None,
        }
    }

    pub fn anonymous(datatype: DataType) -> Self {
        Field {
            relation_alias: None,
            name: None,
            datatype,
            hidden: false,
            column: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.relation_alias = Some(alias.into());
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_column(mut self, column: ColumnHandle) -> Self {
        self.column = Some(column);
        self
    }
}

/// Ordered fields of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationType {
    fields: Vec<Field>,
}

impl RelationType {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        RelationType {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn all_field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Positions of the non-hidden fields.
    pub fn visible_field_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.hidden)
            .map(|(idx, _)| idx)
    }

    pub fn visible_field_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.hidden).count()
    }
}

/// A lexical scope produced during analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// If the parent belongs to an enclosing query. Column references
    /// resolving across a query boundary are correlated references.
    pub query_boundary: bool,
    pub relation_id: RelationId,
    pub relation_type: RelationType,
}

impl Scope {
    /// Parent scope within the same query.
    pub fn local_parent(&self) -> Option<ScopeId> {
        if self.query_boundary {
            None
        } else {
            self.parent
        }
    }
}

/// Resolution of a column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    /// Scope the reference resolved in.
    pub scope: ScopeId,
    pub field: FieldId,
    /// Position of the field when all fields of the local scope hierarchy
    /// are concatenated, outermost scope first.
    pub hierarchy_field_index: usize,
}
