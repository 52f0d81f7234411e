//! Authenticated session lifecycle.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated
//!                         ^                  |
//!                         +-- near expiry ---+
//!                         +-- 401 / 403 -----+
//! ```
//!
//! Every authenticated call goes through [`Session::ensure_auth`], which
//! refreshes the bearer token proactively once it is within the configured
//! margin of its expiry. Refreshes are single-flight: concurrent callers queue
//! on one mutex and re-check the token after acquiring it, so at most one
//! nonce/signature exchange is ever in flight.

use std::{fmt, future::Future, time::Duration};

use tokio::sync::{Mutex, RwLock};

use crate::{Error, Result};

/// A bearer token and its expiry in nanoseconds since the unix epoch.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expiry_ns: i64,
}

impl Token {
    pub fn new(value: impl Into<String>, expiry_ns: i64) -> Self {
        Self {
            value: value.into(),
            expiry_ns,
        }
    }

    /// Raw token, for the `Authorization: Bearer` header.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expiry_ns(&self) -> i64 {
        self.expiry_ns
    }

    /// Returns true while `now_ns + margin` is still before the expiry.
    pub fn is_fresh_at(&self, now_ns: i64, margin: Duration) -> bool {
        let margin_ns = i64::try_from(margin.as_nanos()).unwrap_or(i64::MAX);
        now_ns.saturating_add(margin_ns) < self.expiry_ns
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expiry_ns", &self.expiry_ns)
            .finish()
    }
}

/// Current wall-clock time in nanoseconds.
pub(crate) fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Performs the nonce/signature exchange that yields a fresh token.
pub trait Authenticator: Sync {
    fn authenticate(&self) -> impl Future<Output = Result<Token>> + Send;
}

/// Owned session state: cached token plus the lock guarding its refresh.
pub struct Session {
    token: RwLock<Option<Token>>,
    refresh: Mutex<()>,
    margin: Duration,
}

impl Session {
    /// Creates an unauthenticated session.
    pub fn new(margin: Duration) -> Self {
        Self {
            token: RwLock::new(None),
            refresh: Mutex::new(()),
            margin,
        }
    }

    /// The cached token, fresh or not.
    pub async fn token(&self) -> Option<Token> {
        self.token.read().await.clone()
    }

    /// Drops the cached token; the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    async fn fresh_token(&self) -> Option<Token> {
        let now = now_ns();
        self.token
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_fresh_at(now, self.margin))
            .cloned()
    }

    /// Returns a token valid for at least the refresh margin, authenticating if needed.
    pub async fn ensure_auth<A: Authenticator>(&self, auth: &A) -> Result<Token> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // another caller may have refreshed while we waited
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        self.authenticate(auth).await
    }

    /// Replaces a token the server rejected.
    ///
    /// If a concurrent caller already replaced `rejected`, its token is reused
    /// instead of authenticating again.
    pub async fn renew<A: Authenticator>(&self, auth: &A, rejected: &Token) -> Result<Token> {
        let _guard = self.refresh.lock().await;
        if let Some(current) = self.token().await {
            if current != *rejected {
                return Ok(current);
            }
        }

        self.authenticate(auth).await
    }

    /// Runs `op` with valid credentials.
    ///
    /// A 401/403 from `op` triggers exactly one re-authentication and one
    /// retry; a second failure is returned unmodified.
    pub async fn call<A, F, Fut, T>(&self, auth: &A, mut op: F) -> Result<T>
    where
        A: Authenticator,
        F: FnMut(Token) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.ensure_auth(auth).await?;
        match op(token.clone()).await {
            Err(err) if err.is_unauthorized() => {
                log::debug!("credentials rejected: {err}, re-authenticating");
                let token = self.renew(auth, &token).await?;
                op(token).await
            }
            res => res,
        }
    }

    async fn authenticate<A: Authenticator>(&self, auth: &A) -> Result<Token> {
        log::debug!("authenticating");
        let token = auth.authenticate().await.map_err(|err| match err {
            err @ Error::AuthenticationFailure(_) => err,
            other => Error::AuthenticationFailure(other.to_string()),
        })?;
        log::debug!("authenticated, token expires at {}ns", token.expiry_ns());

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}
