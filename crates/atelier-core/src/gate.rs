//! Credential gate
//!
//! Decides which image provider credential a chat request runs under.
//! A caller-supplied key is used as-is and never touches the limiter.
//! Without one, the request spends one unit of the caller's quota on the
//! shared project key.

use crate::error::{Error, RATE_LIMIT_MESSAGE};
use crate::utils::FixedWindowLimiter;
use atelier_imaging::{ClientFactory, ImagingClient};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Where the request's credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The caller sent their own key
    Caller,
    /// The shared project key, subject to rate limiting
    Shared,
}

/// Image client bound to the request's credential
#[derive(Clone)]
pub struct ClientHandle {
    /// The client
    pub client: Arc<dyn ImagingClient>,
    /// Credential origin
    pub source: KeySource,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Gate rejection
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Shared key quota exhausted for this identity
    #[error("{}", RATE_LIMIT_MESSAGE)]
    RateLimited {
        /// Seconds until the window rolls over
        retry_after_secs: u64,
    },

    /// The limiter could not be consulted
    #[error("rate limiter unavailable: {0}")]
    Backend(#[source] Error),
}

impl From<GateError> for Error {
    fn from(err: GateError) -> Self {
        match err {
            GateError::RateLimited { retry_after_secs } => Error::RateLimited {
                retry_after: Some(retry_after_secs),
            },
            GateError::Backend(e) => e,
        }
    }
}

/// Credential / rate gate
pub struct CredentialGate {
    factory: Arc<dyn ClientFactory>,
    shared_key: String,
    limiter: Option<FixedWindowLimiter>,
}

impl CredentialGate {
    /// Gate over `factory`, using `shared_key` when the caller has none
    ///
    /// `limiter: None` disables rate limiting for the shared key.
    #[must_use]
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        shared_key: impl Into<String>,
        limiter: Option<FixedWindowLimiter>,
    ) -> Self {
        Self {
            factory,
            shared_key: shared_key.into(),
            limiter,
        }
    }

    /// Whether shared-key requests are rate limited
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Client bound to the shared project key, without consuming quota
    #[must_use]
    pub fn shared_client(&self) -> Arc<dyn ImagingClient> {
        self.factory.for_key(&self.shared_key)
    }

    /// Pick the credential for one request
    ///
    /// # Errors
    ///
    /// `RateLimited` when the identity's window is exhausted, `Backend` when the
    /// limiter store fails.
    pub async fn authorize(
        &self,
        caller_key: Option<&str>,
        identity: &str,
    ) -> std::result::Result<ClientHandle, GateError> {
        if let Some(key) = caller_key.map(str::trim).filter(|k| !k.is_empty()) {
            debug!(key = %atelier_llm::util::mask_api_key(key), "Using caller-supplied key");
            return Ok(ClientHandle {
                client: self.factory.for_key(key),
                source: KeySource::Caller,
            });
        }

        if let Some(limiter) = &self.limiter {
            let result = limiter.acquire(identity).await.map_err(|e| {
                error!(identity = %identity, error = %e, "Rate limiter unavailable");
                GateError::Backend(e)
            })?;

            if !result.allowed {
                info!(identity = %identity, current = result.current, "Shared key quota exhausted");
                return Err(GateError::RateLimited {
                    retry_after_secs: result.retry_after_secs(),
                });
            }

            debug!(identity = %identity, remaining = result.remaining, "Shared key request allowed");
        }

        Ok(ClientHandle {
            client: self.shared_client(),
            source: KeySource::Shared,
        })
    }
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{ManualClock, MemoryRateLimitStore, MockRateLimitStore, RateLimitConfig};
    use atelier_imaging::ScriptedImagingClient;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingFactory {
        keys: Mutex<Vec<String>>,
    }

    impl RecordingFactory {
        fn keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    impl ClientFactory for RecordingFactory {
        fn for_key(&self, key: &str) -> Arc<dyn ImagingClient> {
            self.keys.lock().unwrap().push(key.to_string());
            Arc::new(ScriptedImagingClient::new())
        }
    }

    fn limiter(max: u32, store: Arc<dyn crate::utils::RateLimitStore>) -> FixedWindowLimiter {
        FixedWindowLimiter::with_clock(
            RateLimitConfig::new(max, Duration::from_secs(60)),
            store,
            Arc::new(ManualClock::new(0)),
        )
    }

    #[tokio::test]
    async fn test_caller_key_bypasses_limiter() {
        let mut store = MockRateLimitStore::new();
        store.expect_increment().times(0);

        let factory = Arc::new(RecordingFactory::default());
        let gate = CredentialGate::new(
            factory.clone(),
            "shared-key",
            Some(limiter(1, Arc::new(store))),
        );

        for _ in 0..3 {
            let handle = gate.authorize(Some(" caller-key "), "1.2.3.4").await.unwrap();
            assert_eq!(handle.source, KeySource::Caller);
        }
        assert_eq!(factory.keys(), vec!["caller-key"; 3]);
    }

    #[tokio::test]
    async fn test_blank_caller_key_uses_shared_key() {
        let mut store = MockRateLimitStore::new();
        store.expect_increment().times(1).returning(|_, _| Ok(1));

        let factory = Arc::new(RecordingFactory::default());
        let gate = CredentialGate::new(
            factory.clone(),
            "shared-key",
            Some(limiter(5, Arc::new(store))),
        );

        let handle = gate.authorize(Some("   "), "1.2.3.4").await.unwrap();
        assert_eq!(handle.source, KeySource::Shared);
        assert_eq!(factory.keys(), vec!["shared-key"]);
    }

    #[tokio::test]
    async fn test_request_over_quota_is_rejected_before_client_is_built() {
        let factory = Arc::new(RecordingFactory::default());
        let gate = CredentialGate::new(
            factory.clone(),
            "shared-key",
            Some(limiter(2, Arc::new(MemoryRateLimitStore::new()))),
        );

        assert!(gate.authorize(None, "1.2.3.4").await.is_ok());
        assert!(gate.authorize(None, "1.2.3.4").await.is_ok());

        let err = gate.authorize(None, "1.2.3.4").await.unwrap_err();
        assert!(err.to_string().contains("Add your own FAL API key"));
        match err {
            GateError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 60),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(factory.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_a_backend_error() {
        let mut store = MockRateLimitStore::new();
        store
            .expect_increment()
            .returning(|_, _| Err(Error::Store("down".to_string())));

        let factory = Arc::new(RecordingFactory::default());
        let gate = CredentialGate::new(factory.clone(), "shared-key", Some(limiter(5, Arc::new(store))));

        let err = gate.authorize(None, "1.2.3.4").await.unwrap_err();
        assert!(matches!(err, GateError::Backend(Error::Store(_))));
        assert!(factory.keys().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_allows() {
        let factory = Arc::new(RecordingFactory::default());
        let gate = CredentialGate::new(factory.clone(), "shared-key", None);
        assert!(!gate.is_rate_limited());

        for _ in 0..10 {
            let handle = gate.authorize(None, "1.2.3.4").await.unwrap();
            assert_eq!(handle.source, KeySource::Shared);
        }
    }
}
