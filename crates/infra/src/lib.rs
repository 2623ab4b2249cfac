//! # WebPrefs Infra
//!
//! Infrastructure adapters for the WebPrefs sync engine:
//! - [`WebPreferencesService`]: the reqwest-backed request dispatcher
//! - [`HttpSessionAuthenticator`]: session validation over HTTP
//! - [`OfflinePreferences`]: local JSON-file fallback store
//! - [`PreferencesManager`]: per-host facade and preference-set registry
//!
//! ## Architecture
//! - Implements the ports defined in `webprefs-core`
//! - All HTTP and filesystem code lives here

pub mod auth;
pub mod errors;
pub mod manager;
pub mod offline;
pub mod service;

// Re-export commonly used items
pub use auth::{HttpSessionAuthenticator, SessionAuthenticator, TrustingAuthenticator};
pub use errors::InfraError;
pub use manager::{ManagerConfig, PreferencesManager};
pub use offline::OfflinePreferences;
pub use service::{ServiceConfig, WebPreferencesService};
