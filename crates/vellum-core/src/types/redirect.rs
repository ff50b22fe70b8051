//! Redirect control-flow signal.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// A request from a hook handler to stop the current chain and send the
/// client elsewhere.
///
/// This is control flow, not a failure: it never reaches the client as an
/// error and is applied to the response by the route resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectSignal {
    /// Target location written to the `Location` header.
    pub location: String,
    /// Redirect status code (always 3xx).
    pub status: u16,
}

impl RedirectSignal {
    /// Creates a temporary (302) redirect.
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: StatusCode::FOUND.as_u16(),
        }
    }

    /// Creates a redirect with an explicit status.
    ///
    /// Statuses outside the 3xx range fall back to 302.
    pub fn with_status(location: impl Into<String>, status: u16) -> Self {
        let status = if (300..400).contains(&status) {
            status
        } else {
            StatusCode::FOUND.as_u16()
        };
        Self {
            location: location.into(),
            status,
        }
    }

    /// Creates a permanent (301) redirect.
    pub fn permanent(location: impl Into<String>) -> Self {
        Self::with_status(location, StatusCode::MOVED_PERMANENTLY.as_u16())
    }

    /// Returns the redirect status as a `StatusCode`.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::FOUND)
    }
}
