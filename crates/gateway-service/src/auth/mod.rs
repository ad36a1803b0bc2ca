//! Token authentication for the gateway.
//!
//! - `keys` - decoded verification key material
//! - `key_source` - remote key endpoint client
//! - `key_provider` - TTL cache with coalesced fetches and forced refresh
//! - `verifier` - signature and claims verification
//! - `allow_list` - exact paths that bypass authentication
//! - `filter` - the per-request decision with one refresh-and-retry

pub mod allow_list;
pub mod claims;
pub mod filter;
pub mod key_provider;
pub mod key_source;
pub mod keys;
pub mod verifier;

pub use allow_list::AllowList;
pub use claims::Claims;
pub use filter::{AuthFilter, AuthOutcome, RejectReason};
pub use key_provider::{KeyProvider, StaleKeyPolicy};
pub use key_source::{HttpKeySource, KeySource};
pub use keys::{KeyError, KeyMaterial};
pub use verifier::{TokenVerifier, VerifyError};
