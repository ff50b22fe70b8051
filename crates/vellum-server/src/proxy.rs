//! Upstream proxy for development asset servers.

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;
use vellum_core::traits::adapter::ProxyOptions;

use crate::error::ErrorPage;

/// Largest request body forwarded upstream.
const MAX_FORWARDED_BODY: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards requests under a mount path to an upstream base URL.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    mount: String,
    target: String,
    strip_prefix: bool,
}

impl UpstreamProxy {
    /// Creates a proxy for a mount path.
    pub fn new(mount: &str, options: ProxyOptions) -> AppResult<Self> {
        let target = options.target.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&target).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid proxy target '{}': {e}", options.target),
                e,
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::configuration(format!(
                "Proxy target '{}' must be an http(s) URL",
                options.target
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Proxy, "Cannot build proxy client", e)
            })?;

        Ok(Self {
            client,
            mount: normalize_mount(mount)?,
            target,
            strip_prefix: options.strip_prefix,
        })
    }

    /// Mount path, without trailing slash.
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Whether a request path falls under the mount path.
    pub fn matches(&self, path: &str) -> bool {
        path_matches(&self.mount, path)
    }

    /// Upstream URL for a request path (with query).
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        let path = match path_and_query.strip_prefix(self.mount.as_str()) {
            Some(rest) if self.strip_prefix => rest,
            _ => path_and_query,
        };
        if path.starts_with('/') {
            format!("{}{}", self.target, path)
        } else {
            format!("{}/{}", self.target, path)
        }
    }

    /// Forwards a request and streams the upstream response back.
    pub async fn forward(&self, request: Request) -> Response {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(mount = %self.mount, target = %self.target, error = %e, "Proxy request failed");
                ErrorPage::from_error(&e).into_response()
            }
        }
    }

    async fn try_forward(&self, request: Request) -> AppResult<Response> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = self.upstream_url(path_and_query);

        debug!(method = %parts.method, url = %url, "Proxying request");

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let body = to_bytes(body, MAX_FORWARDED_BODY).await.map_err(|e| {
            AppError::with_source(ErrorKind::Proxy, "Cannot read request body", e)
        })?;

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Proxy, format!("Upstream {url} unreachable"), e)
            })?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Whether `path` equals `mount` or lies below it.
pub(crate) fn path_matches(mount: &str, path: &str) -> bool {
    path.strip_prefix(mount)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn normalize_mount(mount: &str) -> AppResult<String> {
    let trimmed = mount.trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err(AppError::configuration(format!(
            "Proxy path '{mount}' must be a non-root absolute path"
        )));
    }
    Ok(trimmed.to_string())
}
