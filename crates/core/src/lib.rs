//! `leasekeep-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (identifiers, domain errors, value
//! object marker) with no infrastructure concerns.

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{EntityId, RunId};
pub use value_object::ValueObject;
