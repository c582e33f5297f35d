//! Access-token usability policy.
//!
//! The service issues JWT access tokens whose `exp` claim is the only part the
//! client inspects. The policy is pure: no network, no clock reads of its own
//! (callers inject `now`), and it fails permissively - a token it cannot
//! decode is reported unusable, which routes the caller into renewal instead
//! of crashing on garbage.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use pomokan_types::Credential;

/// Safety margin before the `exp` claim. A token inside this window is
/// treated as already expired so a request does not race its own expiry in
/// flight.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// Decode the `exp` claim from a JWT access token.
///
/// Returns `None` for anything that is not a well-formed `header.payload.sig`
/// token with a numeric `exp`.
#[must_use]
pub fn expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Whether the stored pair can authorize a request issued at `now`.
#[must_use]
pub fn is_usable(credential: &Credential, now: DateTime<Utc>) -> bool {
    match expiry(credential.access_token()) {
        Some(exp) => now + TimeDelta::seconds(EXPIRY_SKEW_SECS) < exp,
        None => false,
    }
}
