//! Mock implementations for testing.

use auth_csrf_client::{Clock, CsrfError, CsrfResult, CsrfToken, DEFAULT_TOKEN_TTL, TokenFetcher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct FetcherState {
    clock: Arc<ManualClock>,
    ttl: Duration,
    script: Mutex<VecDeque<CsrfResult<String>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

/// Token fetcher returning scripted results.
///
/// Once the script runs out it issues `token-<n>` where `n` is the call
/// number. Clones share counters and script.
#[derive(Debug, Clone)]
pub struct MockTokenFetcher {
    state: Arc<FetcherState>,
}

impl MockTokenFetcher {
    /// Fetcher stamping tokens with `clock`.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            state: Arc::new(FetcherState {
                clock,
                ttl: DEFAULT_TOKEN_TTL,
                script: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                gate: None,
            }),
        }
    }

    /// Results to hand out before falling back to generated tokens.
    #[must_use]
    pub fn with_script<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = CsrfResult<String>>,
    {
        self.rebuild(|state| state.script = Mutex::new(script.into_iter().collect()))
    }

    /// Hold every fetch until `gate` is notified.
    #[must_use]
    pub fn with_gate(self, gate: Arc<Notify>) -> Self {
        self.rebuild(|state| state.gate = Some(gate))
    }

    /// Validity window of issued tokens.
    #[must_use]
    pub fn with_ttl(self, ttl: Duration) -> Self {
        self.rebuild(|state| state.ttl = ttl)
    }

    /// Number of fetches started.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn rebuild(self, edit: impl FnOnce(&mut FetcherState)) -> Self {
        let mut state = Arc::try_unwrap(self.state).unwrap_or_else(|shared| FetcherState {
            clock: Arc::clone(&shared.clock),
            ttl: shared.ttl,
            script: Mutex::new(
                shared
                    .script
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            ),
            calls: AtomicUsize::new(shared.calls.load(Ordering::SeqCst)),
            gate: shared.gate.clone(),
        });
        edit(&mut state);
        Self {
            state: Arc::new(state),
        }
    }
}

impl TokenFetcher for MockTokenFetcher {
    async fn fetch(&self) -> CsrfResult<CsrfToken> {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.state.gate {
            gate.notified().await;
        }
        let next = self
            .state
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let value = next.unwrap_or_else(|| Ok(format!("token-{call}")))?;
        Ok(CsrfToken::issued(value, self.state.clock.now(), self.state.ttl))
    }
}

/// Scripted network failure.
#[must_use]
pub fn network_failure() -> CsrfResult<String> {
    Err(CsrfError::network("connection refused"))
}

/// Scripted non-2xx answer from the token endpoint.
#[must_use]
pub fn status_failure(status: u16) -> CsrfResult<String> {
    Err(CsrfError::protocol(
        Some(status),
        format!("Failed to fetch CSRF token: {status}"),
    ))
}
