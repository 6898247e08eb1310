use indexmap::IndexSet;

use super::ast::AstExpr;
use super::scope::FieldId;

/// One element of a GROUP BY clause, in terms of the fields it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingElement {
    /// `CUBE (a, b, ...)`
    Cube(Vec<FieldId>),
    /// `ROLLUP (a, b, ...)`
    Rollup(Vec<FieldId>),
    /// A plain grouping column list or `GROUPING SETS (...)`.
    Sets(Vec<Vec<FieldId>>),
}

/// Grouping analysis of a query specification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupingSetAnalysis {
    /// Grouping elements in the order they appear in the query.
    pub elements: Vec<GroupingElement>,
    /// Grouping expressions that aren't plain column references. These are
    /// part of every grouping set.
    pub complex_expressions: Vec<AstExpr>,
}

impl GroupingSetAnalysis {
    /// Every field referenced by any grouping element, in order of first
    /// reference.
    pub fn all_fields(&self) -> IndexSet<FieldId> {
        let mut fields = IndexSet::new();
        for element in &self.elements {
            match element {
                GroupingElement::Cube(columns) | GroupingElement::Rollup(columns) => {
                    fields.extend(columns.iter().copied())
                }
                GroupingElement::Sets(sets) => {
                    for set in sets {
                        fields.extend(set.iter().copied());
                    }
                }
            }
        }
        fields
    }
}

/// Aggregation analysis of a query specification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationAnalysis {
    /// Aggregate function calls in the select list, HAVING and ORDER BY.
    pub aggregates: Vec<AstExpr>,
    pub grouping_sets: GroupingSetAnalysis,
    /// `GROUPING(...)` operations.
    pub grouping_operations: Vec<AstExpr>,
}
