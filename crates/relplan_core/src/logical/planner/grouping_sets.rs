//! Expansion of GROUP BY elements into grouping sets.

use indexmap::IndexSet;
use relplan_error::{DbError, Result};
use tracing::debug;

use crate::analysis::grouping::{GroupingElement, GroupingSetAnalysis};
use crate::analysis::scope::FieldId;

/// Every grouping set described by the GROUP BY elements.
///
/// Each element expands into a list of partial sets, and the result is the
/// cross product of those lists in the order the elements appear. With
/// `distinct`, sets containing the same fields are only kept once. No
/// elements at all is a single empty set.
pub fn enumerate_grouping_sets(
    analysis: &GroupingSetAnalysis,
    distinct: bool,
) -> Result<Vec<IndexSet<FieldId>>> {
    let partials = analysis
        .elements
        .iter()
        .map(expand_element)
        .collect::<Result<Vec<_>>>()?;

    let mut sets = vec![IndexSet::new()];
    for partial in &partials {
        let mut product = Vec::with_capacity(sets.len() * partial.len());
        for existing in &sets {
            for set in partial {
                let mut combined = existing.clone();
                combined.extend(set.iter().copied());
                product.push(combined);
            }
        }
        sets = product;
    }

    if distinct {
        // IndexSet equality ignores order.
        let mut unique: Vec<IndexSet<FieldId>> = Vec::with_capacity(sets.len());
        for set in sets {
            if !unique.contains(&set) {
                unique.push(set);
            }
        }
        sets = unique;
    }

    debug!(
        elements = partials.len(),
        sets = sets.len(),
        distinct,
        "enumerated grouping sets"
    );

    Ok(sets)
}

fn expand_element(element: &GroupingElement) -> Result<Vec<IndexSet<FieldId>>> {
    Ok(match element {
        GroupingElement::Cube(columns) => power_set(columns)?,
        GroupingElement::Rollup(columns) => (0..=columns.len())
            .map(|len| columns[..len].iter().copied().collect())
            .collect(),
        GroupingElement::Sets(sets) => sets
            .iter()
            .map(|set| set.iter().copied().collect())
            .collect(),
    })
}

/// All subsets of `columns`. Subset `i` holds the columns whose bit is set in
/// `i`, so the empty set comes first and the full set last.
fn power_set(columns: &[FieldId]) -> Result<Vec<IndexSet<FieldId>>> {
    let columns: Vec<FieldId> = columns
        .iter()
        .copied()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect();

    let count = u32::try_from(columns.len())
        .ok()
        .and_then(|len| 1_usize.checked_shl(len))
        .ok_or_else(|| {
            DbError::query("Too many columns in CUBE").with_field("columns", columns.len())
        })?;

    Ok((0..count)
        .map(|mask| {
            columns
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, column)| *column)
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relplan_error::ErrorKind;

    use crate::analysis::scope::RelationId;

    fn field(index: usize) -> FieldId {
        FieldId::new(RelationId(0), index)
    }

    fn set(indices: &[usize]) -> IndexSet<FieldId> {
        indices.iter().map(|&idx| field(idx)).collect()
    }

    fn analysis(elements: Vec<GroupingElement>) -> GroupingSetAnalysis {
        GroupingSetAnalysis {
            elements,
            complex_expressions: Vec::new(),
        }
    }

    #[test]
    fn no_elements_is_global() {
        let sets = enumerate_grouping_sets(&analysis(Vec::new()), false).unwrap();
        assert_eq!(vec![IndexSet::new()], sets);
    }

    #[test]
    fn cube_power_set_order() {
        let sets = enumerate_grouping_sets(
            &analysis(vec![GroupingElement::Cube(vec![field(0), field(1)])]),
            false,
        )
        .unwrap();
        assert_eq!(vec![set(&[]), set(&[0]), set(&[1]), set(&[0, 1])], sets);
    }

    #[test]
    fn rollup_prefixes() {
        let sets = enumerate_grouping_sets(
            &analysis(vec![GroupingElement::Rollup(vec![field(2), field(0)])]),
            false,
        )
        .unwrap();
        assert_eq!(vec![set(&[]), set(&[2]), set(&[2, 0])], sets);
    }

    #[test]
    fn cube_cross_rollup() {
        let sets = enumerate_grouping_sets(
            &analysis(vec![
                GroupingElement::Cube(vec![field(0), field(1)]),
                GroupingElement::Rollup(vec![field(2), field(3)]),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(12, sets.len());
        assert_eq!(set(&[]), sets[0]);
        assert_eq!(set(&[2]), sets[1]);
        assert_eq!(set(&[2, 3]), sets[2]);
        assert_eq!(set(&[0]), sets[3]);
        assert_eq!(set(&[0, 1, 2, 3]), sets[11]);
        // Cube columns come before rollup columns within a set.
        assert_eq!(
            vec![field(0), field(1), field(2), field(3)],
            sets[11].iter().copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn distinct_removes_equal_sets() {
        let elements = vec![
            GroupingElement::Sets(vec![vec![field(0)], vec![field(1)]]),
            GroupingElement::Sets(vec![vec![field(1)], vec![field(0)]]),
        ];

        // {a,b}, {a}, {b}, {b,a}
        let all = enumerate_grouping_sets(&analysis(elements.clone()), false).unwrap();
        assert_eq!(4, all.len());

        let distinct = enumerate_grouping_sets(&analysis(elements), true).unwrap();
        assert_eq!(vec![set(&[0, 1]), set(&[0]), set(&[1])], distinct);
    }

    #[test]
    fn plain_group_by_single_set() {
        let sets = enumerate_grouping_sets(
            &analysis(vec![GroupingElement::Sets(vec![vec![field(0), field(1)]])]),
            true,
        )
        .unwrap();
        assert_eq!(vec![set(&[0, 1])], sets);
    }

    #[test]
    fn cube_too_wide_is_rejected() {
        let columns = (0..usize::BITS as usize).map(field).collect();
        let err =
            enumerate_grouping_sets(&analysis(vec![GroupingElement::Cube(columns)]), false)
                .unwrap_err();
        assert_eq!(ErrorKind::Query, err.kind());
    }
}
