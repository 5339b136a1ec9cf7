//! # Authgate Library
//!
//! This library provides the core functionality for the authgate service:
//! the OAuth handshake coordinator, session lifecycle, login rate limiting,
//! background cleanup, and the HTTP surface that ties them together.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod session;
pub mod telemetry;
pub use migration;
