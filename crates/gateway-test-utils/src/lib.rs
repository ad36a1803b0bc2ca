//! # Gateway Test Utilities
//!
//! Shared test utilities for the gateway service.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs and token signing (`TestKeypair`, `TestClaims`)
//! - A wiremock key service (`MockKeyService`)
//! - An in-memory counting key source (`CountingKeySource`)
//! - Server test harness (`TestGatewayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let keypair = TestKeypair::new(1);
//!     let keys = MockKeyService::serving(&keypair).await;
//!     let server = TestGatewayServer::spawn(&keys.uri(), test_downstream()).await?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/orders", server.url()))
//!         .bearer_auth(keypair.sign_token(&TestClaims::valid("user-1")))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod key_sources;
pub mod mock_key_service;
pub mod server_harness;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use key_sources::*;
pub use mock_key_service::*;
pub use server_harness::*;
