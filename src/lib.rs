//! Stagecraft - a staged, transactional execution engine for a
//! hierarchical configuration model
//!
//! Stagecraft keeps a tree of addressable resources (the configuration
//! model) and runs every mutation as an operation: a sequence of steps
//! moving through fixed stages (`Model` -> `Runtime` -> `Verify` ->
//! `Domain`) that either commits atomically or rolls back completely.
//!
//! # Architecture
//!
//! - [`core`] - Domain types: structured values, resource addresses, and
//!   the copy-on-write resource tree
//! - [`engine`] - The execution engine: stage scheduler, operation
//!   context, writer lock, commit/rollback coordinator, and the external
//!   collaborator traits (service container, authorizer, expression
//!   resolver)
//!
//! # Correctness Invariants
//!
//! 1. Committed state changes all at once or not at all
//! 2. Readers never block and never observe a partial write
//! 3. Steps never execute in an earlier stage than the one running
//! 4. Rollback and result callbacks fire in reverse registration order

pub mod core;
pub mod engine;
