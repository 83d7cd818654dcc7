//! Karma domain model.
//!
//! # Responsibility
//! - Define records, counters and ranking rows shared by repositories,
//!   the engine and the query layer.
//! - Own name normalization so every layer keys storage the same way.
//!
//! # Invariants
//! - Storage keys are always `normalize_name(display_name)`.
//! - A record whose total reaches zero through increment/decrement is deleted.

pub mod alias;
pub mod karma;
