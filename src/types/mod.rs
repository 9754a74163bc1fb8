//! Types
//!
//! Credential and configuration type definitions.

pub mod config;
pub mod credential;

pub use config::*;
pub use credential::*;
