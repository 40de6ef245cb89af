//! core
//!
//! Core domain types for the stagecraft engine.
//!
//! # Modules
//!
//! - [`value`] - Typed structured values (the attribute/request/response type)
//! - [`address`] - Path addresses: validated `key=value` segment sequences
//! - [`resource`] - The hierarchical, copy-on-write resource tree
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Snapshots are immutable; all mutation is copy-on-write
//! - Validation happens at construction, not at use

pub mod address;
pub mod resource;
pub mod value;
