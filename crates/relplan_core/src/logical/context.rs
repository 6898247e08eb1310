use std::fmt;

use serde::{Deserialize, Serialize};

use super::symbol::{Symbol, SymbolAllocator};
use crate::types::datatype::DataType;

/// Identifier for a node in a plan, unique within one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanNodeId(pub u32);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct PlanNodeIdAllocator {
    next: u32,
}

impl PlanNodeIdAllocator {
    pub fn next_id(&mut self) -> PlanNodeId {
        let id = PlanNodeId(self.next);
        self.next += 1;
        id
    }
}

/// Allocation state for a single top-level planning invocation.
///
/// Every plan node id and every symbol created while planning a statement
/// comes from here. Planning independent statements concurrently requires
/// independent contexts.
#[derive(Debug, Default)]
pub struct PlanContext {
    pub symbols: SymbolAllocator,
    pub ids: PlanNodeIdAllocator,
}

impl PlanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> PlanNodeId {
        self.ids.next_id()
    }

    pub fn new_symbol(&mut self, hint: &str, datatype: DataType) -> Symbol {
        self.symbols.new_symbol(hint, datatype)
    }
}
