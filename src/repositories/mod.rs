//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities. The stores are the authority for the
//! atomicity of consume/delete operations; no caller-side locking is assumed.

pub mod oauth_state;
pub mod session;
pub mod user;

pub use oauth_state::OAuthStateRepository;
pub use session::SessionRepository;
pub use user::UserRepository;
