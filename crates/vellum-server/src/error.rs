//! Maps `AppError` to HTML error responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use vellum_core::error::AppError;

use vellum_render::template::escape_html;

/// Minimal HTML error document for a failed request.
///
/// The error message is logged, never sent to the client.
#[derive(Debug)]
pub struct ErrorPage {
    status: StatusCode,
}

impl ErrorPage {
    /// Error page for an application error.
    pub fn from_error(error: &AppError) -> Self {
        let status = error.kind.status_code();
        if status.is_server_error() {
            error!(kind = %error.kind, error = %error.message, "Request failed");
        }
        Self { status }
    }

    /// Error page with an explicit status.
    pub fn with_status(status: StatusCode) -> Self {
        Self { status }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTML document.
    pub fn html(&self) -> String {
        let reason = escape_html(self.status.canonical_reason().unwrap_or("Error"));
        let code = self.status.as_u16();
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{code} {reason}</title></head>\
             <body><h1>{code} {reason}</h1></body></html>"
        )
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            self.html(),
        )
            .into_response()
    }
}
