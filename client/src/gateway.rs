//! Request gateway with single-flight credential renewal.
//!
//! Every authorized call goes through [`Gateway::send_authorized`]. When the
//! server rejects the access credential (or the token policy says it would),
//! the call parks on the renewal queue. Exactly one renewal runs at a time:
//!
//! ```text
//! ┌──────┐ first auth failure  ┌────────────────────────┐
//! │ Idle │ ──────────────────> │ Refreshing { waiters }  │
//! └──────┘                     └────────────────────────┘
//!     ^     renewal resolved:        │
//!     │     drain waiters FIFO       │ further auth failures
//!     └──────────────────────────────┘ push onto waiters
//! ```
//!
//! Renewal success replaces the stored pair and resolves every waiter, in the
//! order the calls originally failed, with the new access token; each parked
//! call then reissues itself once. Renewal failure rejects every waiter with
//! `AuthInvalid`, clears the store, and broadcasts a forced-logout signal.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use pomokan_types::{ApiError, Credential};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::{oneshot, watch};
use url::Url;

use crate::retry::RetryConfig;
use crate::{CredentialStore, http_client, read_capped_error_body, token};

/// Application-wide session signal. `ForcedLogout` is broadcast when renewal
/// fails irrecoverably; the UI must drop to the login screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    Active,
    ForcedLogout,
}

/// A call parked while a renewal is in flight. Resolved with the renewed
/// access token, or rejected when the session is over.
type Waiter = oneshot::Sender<Result<String, ApiError>>;

/// Renewal state. The waiter vector is the FIFO queue: calls are pushed in
/// the order they failed and drained front to back when the renewal resolves.
/// It is empty before any renewal starts and after every renewal finishes.
#[derive(Debug)]
enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

/// Gateway to the task service. Cheap to clone; clones share credentials,
/// renewal state and the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

#[derive(Debug)]
struct GatewayInner {
    http: reqwest::Client,
    base_url: Url,
    credentials: CredentialStore,
    refresh: Mutex<RefreshState>,
    session: watch::Sender<SessionSignal>,
    retry: RetryConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(serde::Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl Gateway {
    #[must_use]
    pub fn new(base_url: Url, credentials: CredentialStore) -> Self {
        Self::with_retry(base_url, credentials, RetryConfig::default())
    }

    #[must_use]
    pub fn with_retry(base_url: Url, credentials: CredentialStore, retry: RetryConfig) -> Self {
        let (session, _) = watch::channel(SessionSignal::Active);
        Self {
            inner: Arc::new(GatewayInner {
                http: http_client().clone(),
                base_url,
                credentials,
                refresh: Mutex::new(RefreshState::Idle),
                session,
                retry,
            }),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Watch for forced-logout. The value flips back to `Active` on the next
    /// successful login.
    #[must_use]
    pub fn session(&self) -> watch::Receiver<SessionSignal> {
        self.inner.session.subscribe()
    }

    pub(crate) fn endpoint(&self, path: &str) -> Url {
        self.inner
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.inner.base_url.clone())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    pub(crate) fn mark_logged_in(&self, credential: Credential) {
        self.inner.credentials.replace(credential);
        self.inner.session.send_replace(SessionSignal::Active);
    }

    pub(crate) fn mark_logged_out(&self) {
        self.inner.credentials.clear();
        self.inner.session.send_replace(SessionSignal::ForcedLogout);
    }

    /// Send a call that needs no credential (register, login, health).
    pub(crate) async fn send_plain<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response = build().send().await.map_err(classify_transport)?;
        classify_response(response).await
    }

    /// Send an authorized call, renewing the credential at most once.
    ///
    /// Pre-flight: a stored pair the token policy calls stale is routed into
    /// renewal before the first send, exactly as if the call had already
    /// failed authorization. Post-flight: a 401 parks the call on the renewal
    /// queue; after one reissue a second 401 surfaces as `AuthExpired`.
    /// Failures for any other reason are classified and surfaced immediately,
    /// never queued.
    pub(crate) async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        // A call that renews pre-flight is already spending its one renewal.
        let mut reissued = false;
        let mut access_token = match self.inner.credentials.get() {
            Some(credential) if token::is_usable(&credential, Utc::now()) => {
                credential.access_token().to_owned()
            }
            _ => {
                reissued = true;
                self.renewed_token().await?
            }
        };
        loop {
            let response = build()
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(classify_transport)?;

            if response.status() == StatusCode::UNAUTHORIZED && !reissued {
                access_token = self.renewed_token().await?;
                reissued = true;
                continue;
            }

            return classify_response(response).await;
        }
    }

    /// Park on the renewal queue and wait for the renewed access token.
    ///
    /// The first caller to arrive while Idle flips the state to Refreshing
    /// and starts the single renewal task; everyone else (and the first
    /// caller itself) waits on the queue. The renewal task runs detached so
    /// a caller dropping its future cannot strand the queue.
    async fn renewed_token(&self) -> Result<String, ApiError> {
        let rx = {
            let mut state = self.inner.refresh.lock().expect("refresh mutex poisoned");
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    tracing::debug!(queued = waiters.len(), "Renewal in flight; call queued");
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    tracing::debug!("Starting credential renewal");
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        let outcome = gateway.exchange_refresh_token().await;
                        gateway.finish_renewal(outcome);
                    });
                }
            }
            rx
        };

        rx.await.map_err(|_| ApiError::AuthInvalid)?
    }

    /// POST the refresh credential for a new pair.
    ///
    /// Any failure here is fatal for the session, so every error folds into
    /// `AuthInvalid`; the underlying cause is logged before it is erased.
    async fn exchange_refresh_token(&self) -> Result<Credential, ApiError> {
        let Some(current) = self.inner.credentials.get() else {
            tracing::warn!("Renewal requested with no stored credential");
            return Err(ApiError::AuthInvalid);
        };

        let url = self.endpoint("/auth/refresh");
        let response = self
            .inner
            .http
            .post(url)
            .json(&RefreshRequest {
                refresh_token: current.refresh_token(),
            })
            .send()
            .await
            .map_err(classify_transport);

        let pair = match response {
            Ok(response) => match classify_response(response).await {
                Ok(response) => response
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| ApiError::Transport {
                        message: e.to_string(),
                    }),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        match pair {
            Ok(pair) => Ok(Credential::new(pair.access_token, pair.refresh_token)),
            Err(err) => {
                tracing::warn!(%err, "Credential renewal failed");
                Err(ApiError::AuthInvalid)
            }
        }
    }

    /// Resolve the renewal: drain the queue exactly once, in FIFO order, and
    /// return to Idle.
    fn finish_renewal(&self, outcome: Result<Credential, ApiError>) {
        let waiters = {
            let mut state = self.inner.refresh.lock().expect("refresh mutex poisoned");
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };

        match outcome {
            Ok(credential) => {
                self.inner.credentials.replace(credential.clone());
                tracing::debug!(waiters = waiters.len(), "Renewal complete; replaying queued calls");
                for waiter in waiters {
                    let _ = waiter.send(Ok(credential.access_token().to_owned()));
                }
            }
            Err(_) => {
                tracing::warn!(
                    waiters = waiters.len(),
                    "Renewal failed; rejecting queued calls and forcing logout"
                );
                for waiter in waiters {
                    let _ = waiter.send(Err(ApiError::AuthInvalid));
                }
                self.mark_logged_out();
            }
        }
    }
}

pub(crate) fn classify_transport(error: reqwest::Error) -> ApiError {
    if error.is_connect() || error.is_timeout() {
        ApiError::TransientUnavailable { status: None }
    } else {
        ApiError::Transport {
            message: error.to_string(),
        }
    }
}

/// Classify a response into the error taxonomy. This is the only place that
/// inspects status codes; everything downstream matches on `ApiError`.
pub(crate) async fn classify_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = detail_message(read_capped_error_body(response).await);
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::AuthExpired,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::Validation { message }
        }
        StatusCode::SERVICE_UNAVAILABLE => ApiError::TransientUnavailable {
            status: Some(status.as_u16()),
        },
        _ => ApiError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

/// The service wraps error text as `{"detail": ...}`; unwrap it when present.
fn detail_message(body: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => match json.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(detail) => detail.to_string(),
            None => body,
        },
        Err(_) => body,
    }
}
