//! Authentication Flows
//!
//! Flows that obtain a credential outside the refresh path.

pub mod login;

pub use login::{create_mock_login_flow, LoginFlow, LoginFlowImpl, LoginOutcome, MockLoginFlow};
