//! Karma use-case services.
//!
//! # Responsibility
//! - Orchestrate parser, alias and karma repositories into use-case APIs.
//! - Keep host/CLI layers decoupled from storage details.

pub mod format;
pub mod karma_engine;
mod queries;
