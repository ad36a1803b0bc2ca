//! In-memory key source for provider and filter tests
//!
//! `CountingKeySource` serves whichever `TestKeypair` is current and counts
//! every fetch, without any network.

use crate::crypto_fixtures::TestKeypair;
use async_trait::async_trait;
use gateway_service::auth::{KeyError, KeyMaterial, KeySource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Key source that counts fetches and can be rotated or failed at will.
///
/// # Example
/// ```rust,ignore
/// let source = Arc::new(CountingKeySource::new(TestKeypair::new(1)));
/// let provider = KeyProvider::new(source.clone(), Duration::from_secs(60));
/// provider.get_key().await?;
/// assert_eq!(source.fetch_count(), 1);
/// ```
pub struct CountingKeySource {
    current: Mutex<Option<TestKeypair>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl CountingKeySource {
    pub fn new(keypair: TestKeypair) -> Self {
        Self {
            current: Mutex::new(Some(keypair)),
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// A source whose every fetch fails.
    pub fn failing() -> Self {
        Self {
            current: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Sleep for `delay` inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve `keypair` from the next fetch on. Fetches already in flight
    /// still return the previous key.
    pub fn rotate_to(&self, keypair: TestKeypair) {
        *self.current.lock().unwrap() = Some(keypair);
    }

    /// Fail every fetch from now on.
    pub fn set_failing(&self) {
        *self.current.lock().unwrap() = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for CountingKeySource {
    async fn fetch(&self) -> Result<KeyMaterial, KeyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // The response reflects the issuer's key when the request arrived
        let current = self.current.lock().unwrap().clone();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match current {
            Some(keypair) => Ok(keypair.key_material()),
            None => Err(KeyError::Fetch("key service unavailable".to_string())),
        }
    }
}
