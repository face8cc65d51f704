//! Session notifications for the host UI.
//!
//! The host subscribes and decides how to present them; nothing here blocks
//! or waits for acknowledgement.

use crate::error::ErrorKind;
use reqwest::Method;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// Something the UI may want to tell the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new token was fetched and stored
    TokenRefreshed {
        /// Time left on the new token
        expires_in: Duration,
    },
    /// The cached token was discarded
    TokenCleared,
    /// A protected request got 403 and is being resent with a fresh token
    RetryingAfterRejection {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
    },
    /// The resent request was rejected as well
    SessionExpired {
        /// Request method
        method: Method,
        /// Request URL
        url: String,
    },
    /// Startup token fetch failed
    InitializationFailed {
        /// Failure bucket
        kind: ErrorKind,
        /// Failure detail
        reason: String,
    },
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SessionEvents {
    /// Create a hub buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let events = SessionEvents::default();
        events.publish(SessionEvent::TokenCleared);
        assert_eq!(events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let events = SessionEvents::new(8);
        let mut rx = events.subscribe();

        events.publish(SessionEvent::TokenCleared);
        events.publish(SessionEvent::SessionExpired {
            method: Method::POST,
            url: "http://localhost/x".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::TokenCleared);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::SessionExpired { method, .. } if method == Method::POST
        ));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let events = SessionEvents::default();
        let mut rx = events.subscribe();
        events.clone().publish(SessionEvent::TokenCleared);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::TokenCleared);
    }
}
