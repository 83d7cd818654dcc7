//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define per-channel data access contracts for karma and alias datasets.
//! - Isolate SQLite query details from engine/query orchestration.
//!
//! # Invariants
//! - One repository instance wraps exactly one channel connection; channel
//!   partitioning happens in `db::registry`, never in SQL.
//! - Absence is reported as `None`/empty, not as an error.

pub mod alias_repo;
pub mod karma_repo;
