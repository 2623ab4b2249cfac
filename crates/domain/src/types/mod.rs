//! Domain data types: ids, sessions, requests, responses and failures.

pub mod failure;
pub mod ids;
pub mod request;
pub mod response;
pub mod session;

pub use failure::{FailureReason, RequestFailure};
pub use ids::SubjectId;
pub use request::PrefsRequest;
pub use response::{ServiceResponse, StatusClass};
pub use session::Session;
