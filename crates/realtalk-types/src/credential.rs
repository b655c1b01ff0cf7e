use chrono::{DateTime, Utc};
use std::fmt;

/// Short-lived client secret minted by the session backend.
///
/// A credential authorizes exactly one negotiation. It is moved into the
/// transport negotiator and dropped when the offer/answer exchange ends;
/// every reconnect fetches a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The bearer token presented to the realtime endpoint.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True when an expiry is known and `now` is at or past it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
