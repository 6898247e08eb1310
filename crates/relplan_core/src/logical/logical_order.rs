use std::fmt;

use indexmap::IndexMap;
use relplan_error::Result;
use serde::{Deserialize, Serialize};

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub desc: bool,
    pub nulls_first: bool,
}

impl SortOrder {
    pub const ASC_NULLS_LAST: SortOrder = SortOrder {
        desc: false,
        nulls_first: false,
    };

    /// Create a sort order, defaulting the null ordering when not given.
    ///
    /// Nulls sort last for ascending and first for descending.
    pub fn new(desc: bool, nulls_first: Option<bool>) -> Self {
        SortOrder {
            desc,
            nulls_first: nulls_first.unwrap_or(desc),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            if self.desc { "DESC" } else { "ASC" },
            if self.nulls_first {
                "NULLS FIRST"
            } else {
                "NULLS LAST"
            }
        )
    }
}

/// Ordered list of sort keys.
///
/// A symbol appears at most once, the first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderingScheme {
    orderings: IndexMap<Symbol, SortOrder>,
}

impl OrderingScheme {
    pub fn new(keys: impl IntoIterator<Item = (Symbol, SortOrder)>) -> Self {
        let mut orderings = IndexMap::new();
        for (symbol, order) in keys {
            orderings.entry(symbol).or_insert(order);
        }
        OrderingScheme { orderings }
    }

    pub fn order_by(&self) -> impl Iterator<Item = &Symbol> {
        self.orderings.keys()
    }

    pub fn ordering(&self, symbol: &Symbol) -> Option<SortOrder> {
        self.orderings.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &SortOrder)> {
        self.orderings.iter()
    }

    pub fn len(&self) -> usize {
        self.orderings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orderings.is_empty()
    }
}

impl fmt::Display for OrderingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (sym, order)) in self.orderings.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{sym} {order}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalSort {
    pub ordering: OrderingScheme,
}

impl Explainable for LogicalSort {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Sort").with_values(
            "keys",
            self.ordering.iter().map(|(s, o)| format!("{s} {o}")),
        )
    }
}

impl LogicalNode for Node<LogicalSort> {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.get_children_output_symbols()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::symbol::SymbolAllocator;
    use crate::types::datatype::DataType;

    #[test]
    fn dedup_keeps_first() {
        let mut symbols = SymbolAllocator::new();
        let a = symbols.new_symbol("a", DataType::Int32);
        let b = symbols.new_symbol("b", DataType::Int32);

        let scheme = OrderingScheme::new([
            (a.clone(), SortOrder::new(false, None)),
            (b.clone(), SortOrder::new(true, None)),
            (a.clone(), SortOrder::new(true, Some(false))),
        ]);

        assert_eq!(2, scheme.len());
        assert_eq!(vec![&a, &b], scheme.order_by().collect::<Vec<_>>());
        assert_eq!(Some(SortOrder::ASC_NULLS_LAST), scheme.ordering(&a));
        assert_eq!("a ASC NULLS LAST, b DESC NULLS FIRST", scheme.to_string());
    }
}
