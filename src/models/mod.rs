//! # Data Models
//!
//! This module contains all the data models used throughout the authgate service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod oauth_state;
pub mod session;
pub mod user;

pub use oauth_state::Entity as OAuthState;
pub use session::Entity as Session;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "authgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
