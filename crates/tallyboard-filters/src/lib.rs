//! Tallyboard filters
//!
//! Declares the dashboard filters, tracks what the user selected in each of
//! them and turns that selection into the flat parameter mapping sent to the
//! aggregate fetch:
//!
//! ```text
//! ┌───────────────┐  dependents()  ┌──────────────────┐  build_parameters()  ┌─────────────────┐
//! │  FilterGraph  │───────────────►│ FilterStateStore │─────────────────────►│ QueryParameters │
//! │ (declaration) │                │ (options/select) │                      │ column -> value │
//! └───────────────┘                └──────────────────┘                      └─────────────────┘
//!                                          ▲
//!                                          │ apply_options()
//!                                   aggregate results
//! ```
//!
//! The graph is validated once at startup (no cycles, no dangling
//! references). Changing a filter resets the selection of its *direct*
//! dependents only.

pub mod graph;
pub mod query;
pub mod state;

pub use graph::{ConfigError, FilterDefinition, FilterGraph, FilterId, FilterKind};
pub use query::{build_parameters, QueryParameters};
pub use state::{FilterState, FilterStateStore, Selection, SelectionChange, SelectionError};
