// crates/scaler-client/src/token.rs
// ============================================================================
// Module: Scaler Token Broker
// Description: Access-token lifecycle with single-flight refresh.
// Purpose: Hand every concurrent caller a non-expired bearer credential.
// Dependencies: jsonwebtoken, reqwest, serde, tokio
// ============================================================================

//! ## Overview
//! [`TokenBroker`] owns the current [`Credential`] and refreshes it from the
//! issuance endpoint when it is missing or expired. Concurrent callers that
//! need a refresh while one is outstanding queue as waiters and are resolved
//! from that single call's outcome.
//! Invariants:
//! - At most one issuance call is outstanding at any instant.
//! - A credential is handed out only while `now + skew < expires_at`.
//! - The credential is replaced wholesale; readers never see partial state.
//! - A cancelled refresher releases its waiters with [`AuthError::Abandoned`].
//!
//! Security posture: the token signature is not verified; the service is
//! trusted. Tokens and the API key never appear in `Debug` output or events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::oneshot;
use url::Url;

use crate::config::ApiKey;
use crate::config::ScalerConfig;
use crate::http::BodyError;
use crate::http::bearer_header;
use crate::http::error_preview;
use crate::http::read_json;
use crate::telemetry::Outcome;
use crate::telemetry::Phase;
use crate::telemetry::ScalerEvent;
use crate::telemetry::ScalerObserver;
use crate::wire::IssuanceResponse;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token refresh failures.
///
/// # Invariants
/// - Clonable so one refresh outcome reaches the refresher and every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Issuance endpoint answered with a non-success status.
    #[error("status: {status}, text: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided diagnostic text.
        body: String,
    },
    /// Issuance request could not be sent or read.
    #[error("transport error: {0}")]
    Transport(String),
    /// Issuance response did not match the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Issued token has no usable expiry.
    #[error("invalid access token: {0}")]
    InvalidToken(String),
    /// The in-flight refresh was cancelled before it resolved.
    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl From<BodyError> for AuthError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Transport(message) => Self::Transport(message),
            BodyError::TooLarge {
                ..
            }
            | BodyError::Json(_) => Self::Protocol(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Credential
// ============================================================================

/// Bearer token plus its decoded expiry.
///
/// # Invariants
/// - `expires_at` is decoded from the token's `exp` claim.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token.
    token: Arc<str>,
    /// Expiry instant from the `exp` claim.
    expires_at: SystemTime,
}

impl Credential {
    /// Builds a credential by decoding the token's expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] when the expiry cannot be decoded.
    pub fn parse(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        let expires_at = decode_expiry(&token)?;
        Ok(Self {
            token: Arc::from(token),
            expires_at,
        })
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the expiry instant.
    #[must_use]
    pub const fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Returns true when the credential is still usable at `now` given `skew`.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime, skew: Duration) -> bool {
        now.checked_add(skew).is_some_and(|threshold| threshold < self.expires_at)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Claims read from the token payload.
#[derive(Deserialize)]
struct ExpiryClaims {
    /// Expiry in seconds since the Unix epoch.
    exp: f64,
}

/// Validation for expiry decoding: signature and `exp` enforcement are off,
/// but the header must parse and `exp` must be present.
static EXPIRY_VALIDATION: LazyLock<Validation> = LazyLock::new(|| {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
});

/// Decodes the `exp` claim of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] when the token is not a well-formed JWT
/// or `exp` is missing or out of range.
pub fn decode_expiry(token: &str) -> Result<SystemTime, AuthError> {
    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &EXPIRY_VALIDATION)
        .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
    let exp = data.claims.exp;
    if !exp.is_finite() || exp < 0.0 {
        return Err(AuthError::InvalidToken("exp claim out of range".to_string()));
    }
    Duration::try_from_secs_f64(exp)
        .ok()
        .and_then(|offset| UNIX_EPOCH.checked_add(offset))
        .ok_or_else(|| AuthError::InvalidToken("exp claim out of range".to_string()))
}

// ============================================================================
// SECTION: Broker State
// ============================================================================

/// Outcome delivered to queued waiters.
type RefreshOutcome = Result<Credential, AuthError>;

/// Credential state machine.
enum BrokerState {
    /// No credential held.
    Empty,
    /// Credential held; may have expired since it was stored.
    Valid(Credential),
    /// Issuance call outstanding; waiters resolve when it completes.
    Refreshing(Vec<oneshot::Sender<RefreshOutcome>>),
}

/// Decision taken under the state lock.
enum Action {
    /// Credential is usable now.
    Ready(Credential),
    /// Another caller is refreshing; await its outcome.
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// This caller is the sole refresher.
    Refresh,
}

// ============================================================================
// SECTION: Token Broker
// ============================================================================

/// Shared access-token owner with single-flight refresh.
///
/// # Invariants
/// - State transitions happen under one mutex that is never held across an await.
/// - Only the sole refresher leaves the `Refreshing` state.
pub struct TokenBroker {
    /// HTTP client used for issuance calls.
    client: Client,
    /// Issuance endpoint.
    issuance_url: Url,
    /// Long-lived API key.
    api_key: ApiKey,
    /// Margin subtracted from expiry.
    refresh_skew: Duration,
    /// Credential state machine.
    state: Mutex<BrokerState>,
    /// Event sink for refresh outcomes.
    observer: Arc<dyn ScalerObserver>,
}

impl TokenBroker {
    /// Creates a broker with no credential.
    #[must_use]
    pub fn new(client: Client, config: &ScalerConfig, observer: Arc<dyn ScalerObserver>) -> Self {
        Self {
            client,
            issuance_url: config.issuance_url.clone(),
            api_key: config.api_key.clone(),
            refresh_skew: config.refresh_skew,
            state: Mutex::new(BrokerState::Empty),
            observer,
        }
    }

    /// Seeds the broker with a previously obtained credential.
    #[must_use]
    pub fn with_credential(self, credential: Credential) -> Self {
        *self.lock_state() = BrokerState::Valid(credential);
        self
    }

    /// Returns the held credential without refreshing, if any.
    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        match &*self.lock_state() {
            BrokerState::Valid(credential) => Some(credential.clone()),
            BrokerState::Empty | BrokerState::Refreshing(_) => None,
        }
    }

    /// Returns a non-expired credential, refreshing it when required.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the refresh this call performed or awaited failed.
    pub async fn ensure_valid(&self) -> Result<Credential, AuthError> {
        let action = {
            let mut state = self.lock_state();
            let now = SystemTime::now();
            let action = match &mut *state {
                BrokerState::Valid(credential)
                    if credential.is_valid_at(now, self.refresh_skew) =>
                {
                    Action::Ready(credential.clone())
                }
                BrokerState::Refreshing(waiters) => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    Action::Wait(receiver)
                }
                BrokerState::Empty | BrokerState::Valid(_) => Action::Refresh,
            };
            if matches!(action, Action::Refresh) {
                *state = BrokerState::Refreshing(Vec::new());
            }
            action
        };
        match action {
            Action::Ready(credential) => Ok(credential),
            Action::Wait(receiver) => receiver.await.unwrap_or(Err(AuthError::Abandoned)),
            Action::Refresh => {
                let guard = RefreshGuard {
                    broker: self,
                    armed: true,
                };
                let outcome = self.issue().await;
                guard.complete(outcome)
            }
        }
    }

    /// Performs one issuance call and reports its outcome.
    async fn issue(&self) -> RefreshOutcome {
        let started = Instant::now();
        let outcome = self.request_token().await;
        let event = match &outcome {
            Ok(_) => ScalerEvent::new(Phase::TokenRefresh, Outcome::Ok),
            Err(err) => {
                let status = match err {
                    AuthError::Status {
                        status, ..
                    } => Some(*status),
                    _ => None,
                };
                ScalerEvent::new(Phase::TokenRefresh, Outcome::Error)
                    .with_status(status)
                    .with_message(err.to_string())
            }
        };
        self.observer.record(&event.with_latency(started.elapsed()));
        outcome
    }

    /// Requests a new token from the issuance endpoint.
    async fn request_token(&self) -> RefreshOutcome {
        let header = bearer_header(self.api_key.expose()).map_err(AuthError::Protocol)?;
        let response = self
            .client
            .post(self.issuance_url.clone())
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = error_preview(response).await;
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let issued: IssuanceResponse = read_json(response).await?;
        let credential = Credential::parse(issued.access_token)?;
        if !credential.is_valid_at(SystemTime::now(), self.refresh_skew) {
            return Err(AuthError::InvalidToken("issued token is already expired".to_string()));
        }
        Ok(credential)
    }

    /// Locks the state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("issuance_url", &self.issuance_url.as_str())
            .field("refresh_skew", &self.refresh_skew)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Refresh Guard
// ============================================================================

/// Resolves the `Refreshing` state exactly once, even on cancellation.
struct RefreshGuard<'a> {
    /// Broker whose state is being refreshed.
    broker: &'a TokenBroker,
    /// Whether the guard still owns the refresh.
    armed: bool,
}

impl RefreshGuard<'_> {
    /// Stores the outcome and resolves every waiter with it.
    fn complete(mut self, outcome: RefreshOutcome) -> RefreshOutcome {
        self.armed = false;
        let next = match &outcome {
            Ok(credential) => BrokerState::Valid(credential.clone()),
            Err(_) => BrokerState::Empty,
        };
        let previous = std::mem::replace(&mut *self.broker.lock_state(), next);
        if let BrokerState::Refreshing(waiters) = previous {
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
        outcome
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.broker.lock_state();
        if matches!(*state, BrokerState::Refreshing(_)) {
            // Dropping the senders wakes waiters with `Abandoned`.
            *state = BrokerState::Empty;
        }
    }
}
