pub mod column;
pub mod config;
pub mod dep_graph;
pub mod engine;
pub mod events;
pub mod grid;
pub mod import;
pub mod lifecycle;
pub mod outcome;
pub mod row;
pub mod rule;
pub mod store;

#[cfg(test)]
pub mod harness;
