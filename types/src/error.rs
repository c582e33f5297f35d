use thiserror::Error;

/// Error taxonomy for task service calls.
///
/// Constructed exactly once, at the network-call boundary, from the response
/// status and body. Downstream logic matches on these variants and never
/// re-inspects raw transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The access credential was rejected. The gateway recovers this
    /// internally via renewal; it reaches callers only when a reissued call
    /// is rejected a second time.
    #[error("access credential rejected")]
    AuthExpired,

    /// The refresh credential was rejected during renewal. Fatal for the
    /// session: stored credentials are cleared and a logged-out state forced.
    #[error("session expired: refresh credential rejected")]
    AuthInvalid,

    /// Service temporarily unavailable or unreachable. Retried with backoff
    /// on the pomodoro-increment path; surfaced immediately everywhere else.
    #[error("service temporarily unavailable")]
    TransientUnavailable { status: Option<u16> },

    /// Target entity absent. A successful no-op for delete, an error for
    /// update and fetch.
    #[error("resource not found")]
    NotFound,

    /// Input rejected by the server. No retry.
    #[error("request rejected: {message}")]
    Validation { message: String },

    /// Any other non-success response.
    #[error("unexpected response ({status}): {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, broken connection).
    #[error("transport failure: {message}")]
    Transport { message: String },
}

impl ApiError {
    /// True for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUnavailable { .. })
    }
}
