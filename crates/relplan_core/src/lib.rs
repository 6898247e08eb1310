pub mod analysis;
pub mod catalog;
pub mod config;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod logical;
pub mod types;
