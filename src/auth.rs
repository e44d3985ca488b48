//! Authentication for coordinator requests.
//!
//! Two layers: a static `Authorization` mechanism fixed for the transport's
//! lifetime, and an optional refreshable credential (short-lived OAuth style
//! token) that is forwarded through the extra-credential header and renewed
//! before a query is executed once it has expired.

use std::fmt;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::Mutex;

use crate::error::Result;

/// Static `Authorization` header mechanisms.
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    Basic { user: String, password: String },
    Bearer(String),
}

impl Authentication {
    pub fn basic<S: Into<String>>(user: S, password: S) -> Self { Authentication::Basic { user: user.into(), password: password.into() } }
    pub fn bearer<S: Into<String>>(token: S) -> Self { Authentication::Bearer(token.into()) }

    pub fn header_value(&self) -> String {
        match self {
            Authentication::Basic { user, password } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
                format!("Basic {encoded}")
            }
            Authentication::Bearer(token) => format!("Bearer {token}"),
        }
    }
}

// Never print secrets.
impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::Basic { user, .. } => write!(f, "Basic({user}, ***)"),
            Authentication::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

/// Credential that expires and must be refreshed synchronously before use.
pub trait RefreshableCredential: Send + Sync {
    fn is_valid(&self) -> bool;

    /// Obtain a fresh token, replacing the cached one.
    fn refresh(&self) -> Result<String>;

    /// Name under which the token is forwarded to connectors.
    fn credential_key(&self) -> &str { "hive.gcs.oauth" }
}

struct CachedEntry {
    token: String,
    expires_at: Instant,
}

/// Token cache around a fetch function returning `(token, time-to-live)`.
/// Tokens are treated as expired `skew` before their real expiry.
pub struct CachedToken<F> {
    key: String,
    skew: Duration,
    fetch: F,
    entry: Mutex<Option<CachedEntry>>,
}

impl<F> CachedToken<F>
where
    F: Fn() -> Result<(String, Duration)> + Send + Sync,
{
    pub fn new<S: Into<String>>(key: S, fetch: F) -> Self {
        Self { key: key.into(), skew: Duration::from_secs(30), fetch, entry: Mutex::new(None) }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn token(&self) -> Option<String> { self.entry.lock().as_ref().map(|e| e.token.clone()) }
}

impl<F> RefreshableCredential for CachedToken<F>
where
    F: Fn() -> Result<(String, Duration)> + Send + Sync,
{
    fn is_valid(&self) -> bool {
        match self.entry.lock().as_ref() {
            Some(e) => e.expires_at > Instant::now() + self.skew,
            None => false,
        }
    }

    fn refresh(&self) -> Result<String> {
        let (token, ttl) = (self.fetch)()?;
        *self.entry.lock() = Some(CachedEntry { token: token.clone(), expires_at: Instant::now() + ttl });
        Ok(token)
    }

    fn credential_key(&self) -> &str { &self.key }
}
