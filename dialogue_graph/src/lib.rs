//! # Dialogue Graph
//!
//! The "authored content" crate - dialogue graph types, option conditions,
//! the per-session context record, and graph validation. This crate is the
//! single source of truth for what a dialogue *is*; it contains no engine
//! logic and never mutates state on its own.
//!
//! Graphs are supplied declaratively (see [`DialogueGraph::from_json`]),
//! validated at load time, and immutable afterwards. Session bookkeeping
//! lives in [`DialogueContext`], which only the progression engine's
//! transition operations mutate.

pub mod context;
pub mod graph;
pub mod states;
pub mod validate;

pub use context::*;
pub use graph::*;
pub use states::*;
pub use validate::*;
