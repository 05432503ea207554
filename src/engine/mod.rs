//! Execution engine for provisio
//!
//! The engine orchestrates:
//! 1. Probing - Compare every step's current state with its desired state
//! 2. Diffing - Show the pending changes, with file edits as unified diffs
//! 3. Executing - Run the step graph in order, under one sudo scope

pub mod differ;
pub mod executor;

pub use differ::display_changes;
pub use executor::{ExecuteOptions, execute};
