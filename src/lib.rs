//! Bearer Authentication Integration
//!
//! HTTP client middleware that attaches a bearer credential to every request
//! and refreshes it, at most once at a time, when the server reports it expired.
//!
//! # Features
//!
//! - Bearer credential attachment on every outgoing request
//! - Single-flight credential refresh shared by every concurrently failing request
//! - Transparent replay of rejected requests with the refreshed credential
//! - Login against a credential-issuing endpoint
//! - Pluggable credential storage (in memory, key-value, JSON file)
//!
//! # Example
//!
//! ```rust,ignore
//! use bearer_auth_integration::{client_config, AuthenticatedClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = client_config()
//!         .base_url("https://api.example.com/api")
//!         .from_env()
//!         .build()?;
//!
//!     let client = AuthenticatedClient::new(config)?;
//!
//!     client
//!         .login(&json!({ "email": "neo@example.com", "password": "secret" }))
//!         .await?;
//!
//!     // Expired credentials are refreshed and the request replayed.
//!     let response = client.get("categories").await?;
//!     println!("{}", response.body);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: credential and configuration types
//! - `error`: error hierarchy
//! - `core`: HTTP transport boundary
//! - `credential`: credential storage and the refresh coordinator
//! - `middleware`: request authenticator and response interceptor
//! - `flows`: login
//! - `builders`: fluent configuration builder
//! - `telemetry`: refresh and replay metrics
//! - `client`: high-level client wiring the pipeline together

pub mod builders;
pub mod client;
pub mod core;
pub mod credential;
pub mod error;
pub mod flows;
pub mod middleware;
pub mod telemetry;
pub mod types;

// Re-export main client
pub use client::{authenticated_client, AuthenticatedClient};

// Re-export builders
pub use builders::{client_config, ClientConfigBuilder};

// Re-export errors
pub use error::{
    AuthError, AuthResult, ConfigurationError, CredentialError, NetworkError, ProtocolError,
    RefreshError,
};

// Re-export types
pub use types::{ClientConfig, Credential, AUTHORIZATION_HEADER, BEARER_SCHEME};

// Re-export core components
pub use crate::core::{
    create_mock_transport, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    MockHttpTransport, ReqwestHttpTransport,
};

// Re-export credential management
pub use credential::{
    // Storage
    create_in_memory_credential_store, create_mock_credential_store, CredentialStore,
    InMemoryCredentialStore, InMemoryKeyValueStore, JsonFileKeyValueStore,
    KeyValueCredentialStore, KeyValueStore, MockCredentialStore,
    // Refresh
    RefreshCoordinator, RefreshOutcome, RefreshState,
};

// Re-export middleware
pub use middleware::{RequestAuthenticator, ResponseAuthorizationInterceptor};

// Re-export flows
pub use flows::{create_mock_login_flow, LoginFlow, LoginFlowImpl, LoginOutcome, MockLoginFlow};

// Re-export telemetry
pub use telemetry::{
    create_in_memory_metrics, no_op_metrics, AuthMetrics, InMemoryMetrics, MetricEntry,
    MetricLabels, NoOpMetrics,
};
