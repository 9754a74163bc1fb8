//! Core Components
//!
//! Core infrastructure shared by the middleware.

pub mod transport;

pub use transport::*;
