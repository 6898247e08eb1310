pub mod context;
pub mod logical_aggregate;
pub mod logical_filter;
pub mod logical_join;
pub mod logical_limit;
pub mod logical_merge;
pub mod logical_mutation;
pub mod logical_order;
pub mod logical_project;
pub mod logical_scan;
pub mod logical_setop;
pub mod logical_values;
pub mod logical_window;
pub mod merge_processor;
pub mod operator;
pub mod plan_copier;
pub mod planner;
pub mod rewrite;
pub mod symbol;
