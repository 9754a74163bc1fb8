//! Authentication Middleware
//!
//! Request authentication before a call and response interception after it.

pub mod authenticator;
pub mod interceptor;

pub use authenticator::RequestAuthenticator;
pub use interceptor::ResponseAuthorizationInterceptor;
