//! Token cache with single-flight refresh.
//!
//! The store owns the only copy of the current token and of the pending
//! fetch handle. Concurrent callers that find no valid token all await one
//! shared fetch; the fetch settles the store itself, exactly once, so the
//! outcome does not depend on which waiter happens to poll it.

use crate::clock::{Clock, SystemClock};
use crate::error::CsrfResult;
use crate::events::{SessionEvent, SessionEvents};
use crate::fetcher::TokenFetcher;
use crate::token::CsrfToken;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Type alias for the inflight future.
type InflightFuture = Shared<BoxFuture<'static, CsrfResult<CsrfToken>>>;

/// An outstanding fetch, tagged so a late settlement can recognise that it
/// was superseded by `clear()`.
struct PendingFetch {
    id: u64,
    future: InflightFuture,
}

#[derive(Default)]
struct StoreState {
    token: Option<CsrfToken>,
    pending: Option<PendingFetch>,
    last_fetch_id: u64,
}

/// CSRF token store.
///
/// Create one per application session and share it by `Arc`; call
/// [`TokenStore::clear`] on logout.
pub struct TokenStore<F: TokenFetcher> {
    fetcher: Arc<F>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<StoreState>>,
    events: SessionEvents,
}

impl<F: TokenFetcher> TokenStore<F> {
    /// Create an empty store.
    #[must_use]
    pub fn new(fetcher: F, events: SessionEvents) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(StoreState::default())),
            events,
        }
    }

    /// Replace the time source used for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Event hub this store publishes to.
    #[must_use]
    pub const fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// The underlying fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Return a valid token, fetching one if needed.
    ///
    /// Joins the in-flight fetch when there is one. A failed fetch is
    /// reported to every waiter; an expired value is never returned.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (`Network` or `Protocol`).
    #[instrument(skip(self))]
    pub async fn get_valid_token(&self) -> CsrfResult<SecretString> {
        let inflight = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();

            if let Some(token) = state.token.as_ref().filter(|t| t.is_valid_at(now)) {
                return Ok(token.value().clone());
            }

            match &state.pending {
                Some(pending) => {
                    debug!(fetch_id = pending.id, "Joining in-flight CSRF token fetch");
                    pending.future.clone()
                }
                None => self.start_fetch(&mut state),
            }
        };

        inflight.await.map(|token| token.value().clone())
    }

    /// Register a new pending fetch. Caller holds the state lock.
    fn start_fetch(&self, state: &mut StoreState) -> InflightFuture {
        state.last_fetch_id += 1;
        let id = state.last_fetch_id;

        let fetcher = Arc::clone(&self.fetcher);
        let shared_state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let events = self.events.clone();

        let fut: BoxFuture<'static, CsrfResult<CsrfToken>> = Box::pin(async move {
            debug!(fetch_id = id, "Fetching CSRF token");
            let result = fetcher.fetch().await;

            let mut state = shared_state.lock().await;
            let current = state.pending.as_ref().is_some_and(|p| p.id == id);
            if !current {
                debug!(fetch_id = id, "Discarding CSRF token fetch superseded by clear");
                return result;
            }

            state.pending = None;
            match &result {
                Ok(token) => {
                    state.token = Some(token.clone());
                    drop(state);
                    let expires_in = token.remaining_at(clock.now());
                    info!(fetch_id = id, expires_in_secs = expires_in.as_secs(), "CSRF token refreshed");
                    events.publish(SessionEvent::TokenRefreshed { expires_in });
                }
                Err(e) => warn!(fetch_id = id, error = %e, "CSRF token fetch failed"),
            }
            result
        });

        let shared = fut.shared();
        state.pending = Some(PendingFetch {
            id,
            future: shared.clone(),
        });
        shared
    }

    /// Discard the token, its expiry and any pending fetch handle.
    ///
    /// A fetch already on the wire still resolves its own waiters, but its
    /// result is not stored.
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.token = None;
            state.pending = None;
        }
        info!("CSRF token cleared");
        self.events.publish(SessionEvent::TokenCleared);
    }

    /// Current token, valid or not.
    pub async fn cached_token(&self) -> Option<CsrfToken> {
        self.state.lock().await.token.clone()
    }

    /// Whether a token is cached and unexpired right now.
    pub async fn has_valid_token(&self) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .await
            .token
            .as_ref()
            .is_some_and(|t| t.is_valid_at(now))
    }

    /// Whether a fetch is outstanding.
    pub async fn is_fetch_in_flight(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }
}
