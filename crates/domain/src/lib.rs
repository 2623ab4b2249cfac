//! # WebPrefs Domain
//!
//! Domain types and models for the WebPrefs preference cache.
//!
//! This crate contains:
//! - Subject ids, sessions and the request/response wire model
//! - Failure classification (reason, severity, permanence)
//! - Domain error types and Result definitions
//! - Key/value validation and domain constants
//!
//! ## Architecture
//! - No dependencies on other WebPrefs crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod constants;
pub mod errors;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::{PrefsError, Result};
pub use types::failure::{FailureReason, RequestFailure};
pub use types::ids::SubjectId;
pub use types::request::PrefsRequest;
pub use types::response::{ServiceResponse, StatusClass};
pub use types::session::Session;
