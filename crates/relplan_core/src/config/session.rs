use std::collections::HashMap;
use std::sync::LazyLock;

use relplan_error::{DbError, Result};

use crate::types::scalar::ScalarValue;

pub const DEFAULT_MAX_RECURSION_DEPTH: u64 = 10;

/// Session tunables consulted while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Number of times the recursive step of a recursive query is unrolled
    /// before the depth guard is appended.
    pub max_recursion_depth: u64,
    /// Skip planning an ORDER BY that is known to be implied by the ordering
    /// of its input.
    pub skip_redundant_sort: bool,
    /// Lower-case the column names in MERGE SET clauses before matching them
    /// against the target table.
    pub canonicalize_merge_identifiers: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            skip_redundant_sort: true,
            canonicalize_merge_identifiers: true,
        }
    }
}

impl PlannerConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn describe_settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_by_key(|(name, _)| *name);
        settings
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()>,
    get: fn(conf: &PlannerConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<MaxRecursionDepth>(&mut map);
    insert_setting::<SkipRedundantSort>(&mut map);
    insert_setting::<CanonicalizeMergeIdentifiers>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()>;
    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue;
}

pub struct MaxRecursionDepth;

impl SessionSetting for MaxRecursionDepth {
    const NAME: &'static str = "max_recursion_depth";
    const DESCRIPTION: &'static str =
        "Maximum number of times the recursive step of a recursive query is expanded";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        let val = scalar.try_as_i64()?;
        if val <= 0 {
            return Err(
                DbError::new("max_recursion_depth must be a positive integer")
                    .with_field("value", val),
            );
        }
        conf.max_recursion_depth = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        ScalarValue::Int64(conf.max_recursion_depth as i64)
    }
}

pub struct SkipRedundantSort;

impl SessionSetting for SkipRedundantSort {
    const NAME: &'static str = "skip_redundant_sort";
    const DESCRIPTION: &'static str =
        "Skip planning ORDER BY clauses that are implied by the ordering of their input";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        conf.skip_redundant_sort = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        conf.skip_redundant_sort.into()
    }
}

pub struct CanonicalizeMergeIdentifiers;

impl SessionSetting for CanonicalizeMergeIdentifiers {
    const NAME: &'static str = "canonicalize_merge_identifiers";
    const DESCRIPTION: &'static str =
        "Lower-case column names in MERGE SET clauses before resolving them";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        conf.canonicalize_merge_identifiers = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        conf.canonicalize_merge_identifiers.into()
    }
}
