use indexmap::IndexMap;
use relplan_error::Result;

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// Ordered mapping of output symbols to the expressions producing them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignments {
    assignments: IndexMap<Symbol, Expression>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create assignments passing every symbol through unchanged.
    pub fn identity<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut assignments = Self::new();
        assignments.put_identities(symbols);
        assignments
    }

    pub fn put(&mut self, symbol: Symbol, expr: Expression) {
        self.assignments.insert(symbol, expr);
    }

    pub fn put_identity(&mut self, symbol: &Symbol) {
        self.assignments
            .insert(symbol.clone(), Expression::Symbol(symbol.clone()));
    }

    pub fn put_identities<'a>(&mut self, symbols: impl IntoIterator<Item = &'a Symbol>) {
        for symbol in symbols {
            self.put_identity(symbol);
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Expression> {
        self.assignments.get(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.assignments.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.assignments.keys()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.assignments.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Expression)> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl FromIterator<(Symbol, Expression)> for Assignments {
    fn from_iter<T: IntoIterator<Item = (Symbol, Expression)>>(iter: T) -> Self {
        Assignments {
            assignments: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalProject {
    pub assignments: Assignments,
}

impl Explainable for LogicalProject {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let non_identity = self
            .assignments
            .iter()
            .filter(|(sym, expr)| !matches!(expr, Expression::Symbol(s) if s == *sym));
        ExplainEntry::new("Project")
            .with_values("outputs", self.assignments.symbols())
            .with_map("assignments", non_identity)
    }
}

impl LogicalNode for Node<LogicalProject> {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.assignments.symbols().cloned().collect()
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        for expr in self.node.assignments.expressions() {
            func(expr)?;
        }
        Ok(())
    }
}
