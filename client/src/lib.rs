//! HTTP gateway for the Pomokan task service.
//!
//! # Architecture
//!
//! - [`Gateway`] - wraps every outbound call, attaches the access credential,
//!   and transparently renews it exactly once when the server rejects it.
//!   Concurrent callers coalesce behind that single renewal and are replayed
//!   in the order they failed.
//! - [`CredentialStore`] - durable holder of the current access/refresh pair;
//!   survives restarts and notifies a watch channel on every replacement.
//! - [`token`] - pure policy deciding whether a stored access token is still
//!   usable or must be renewed before the next send.
//! - [`retry`] - bounded exponential backoff, used only by the
//!   pomodoro-increment call.
//!
//! # Error handling
//!
//! Every response is classified into [`pomokan_types::ApiError`] at the
//! network boundary. An `AuthExpired` rejection is recovered internally and
//! never reaches callers unless renewal itself fails, in which case the
//! stored pair is cleared and [`SessionSignal::ForcedLogout`] is broadcast.

mod api;
mod credentials;
mod gateway;
pub mod retry;
pub mod token;

use std::sync::OnceLock;
use std::time::Duration;

pub use credentials::CredentialStore;
pub use gateway::{Gateway, SessionSignal};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

pub(crate) fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build tuned HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// Read an error body without trusting the server to keep it small.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(mut text) => {
            if text.len() > MAX_ERROR_BODY_BYTES {
                text.truncate(MAX_ERROR_BODY_BYTES);
                text.push_str("...(truncated)");
            }
            text
        }
        Err(e) => {
            tracing::debug!(%status, "Failed to read error body: {e}");
            String::new()
        }
    }
}
