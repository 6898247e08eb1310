use std::fmt;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use serde::{Deserialize, Serialize};

use crate::types::datatype::DataType;

/// A uniquely named, typed column produced by exactly one plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    name: Arc<str>,
    datatype: DataType,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Hands out fresh symbols for a single planning pass.
///
/// Names are made unique by appending a numeric suffix to the requested
/// name hint.
#[derive(Debug, Default)]
pub struct SymbolAllocator {
    used: HashSet<Arc<str>>,
    next_suffix: HashMap<String, usize>,
}

impl SymbolAllocator {
    pub fn new() -> Self {
        SymbolAllocator {
            used: HashSet::new(),
            next_suffix: HashMap::new(),
        }
    }

    /// Create a new symbol using `hint` as the base of the name.
    pub fn new_symbol(&mut self, hint: &str, datatype: DataType) -> Symbol {
        let base = sanitize_hint(hint);

        let name: Arc<str> = if !self.used.contains(base.as_str()) {
            base.clone().into()
        } else {
            let suffix = self.next_suffix.entry(base.clone()).or_insert(1);
            loop {
                let candidate = format!("{base}_{suffix}");
                *suffix += 1;
                if !self.used.contains(candidate.as_str()) {
                    break candidate.into();
                }
            }
        };

        self.used.insert(name.clone());
        Symbol { name, datatype }
    }

    /// Create a new symbol with the same name hint and type as an existing
    /// one.
    pub fn new_symbol_like(&mut self, symbol: &Symbol) -> Symbol {
        let hint = strip_suffix(symbol.name());
        self.new_symbol(hint, symbol.datatype.clone())
    }

    /// Number of symbols allocated so far.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

fn sanitize_hint(hint: &str) -> String {
    let hint = hint.trim();
    if hint.is_empty() {
        return "expr".to_string();
    }
    hint.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Strip a trailing `_<digits>` suffix so that copies of a symbol don't
/// accumulate suffixes.
fn strip_suffix(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names() {
        let mut symbols = SymbolAllocator::new();
        let a = symbols.new_symbol("a", DataType::Int32);
        let a1 = symbols.new_symbol("a", DataType::Int32);
        let a2 = symbols.new_symbol("a", DataType::Int64);

        assert_eq!("a", a.name());
        assert_eq!("a_1", a1.name());
        assert_eq!("a_2", a2.name());
        assert_eq!(&DataType::Int64, a2.datatype());
        assert_eq!(3, symbols.len());
    }

    #[test]
    fn suffix_collision_with_hint() {
        let mut symbols = SymbolAllocator::new();
        let _ = symbols.new_symbol("a_1", DataType::Int32);
        let _ = symbols.new_symbol("a", DataType::Int32);
        let third = symbols.new_symbol("a", DataType::Int32);

        assert_eq!("a_2", third.name());
    }

    #[test]
    fn symbol_like_does_not_stack_suffixes() {
        let mut symbols = SymbolAllocator::new();
        let _ = symbols.new_symbol("col", DataType::Utf8);
        let col1 = symbols.new_symbol("col", DataType::Utf8);
        let copy = symbols.new_symbol_like(&col1);

        assert_eq!("col_2", copy.name());
    }

    #[test]
    fn empty_hint() {
        let mut symbols = SymbolAllocator::new();
        assert_eq!("expr", symbols.new_symbol("", DataType::Int32).name());
        assert_eq!("x_y", symbols.new_symbol("x y", DataType::Int32).name());
    }
}
