//! naturalfix library crate
//!
//! Finds the most likely location of a single-token syntax error by
//! comparing what a forward and a backward token predictor expect at each
//! position, then proposes single-token edits that make the file parse.
//! The `naturalfix-lab` binary and the benchmarks are built on these
//! modules.

pub mod cache;
pub mod config;
pub mod context;
pub mod edit;
pub mod fix;
pub mod lab;
pub mod lang;
pub mod mutate;
pub mod pipeline;
pub mod predict;
pub mod rank;
pub mod score;
pub mod source;
pub mod util;
pub mod vector;
pub mod vocabulary;
