//! The routing gateway: per-request bypass decision and reverse-proxy rewrite

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use store::{keys, StateStore};
use tracing::warn;

const BYPASS_PATH_PREFIXES: &[&str] = &[
    "/api",
    "/watchdog",
    "/favicon.ico",
    "/robots.txt",
    "/sitemap",
    "/bootstrap.js",
    "/bootstrap.js.map",
];

/// Outcome of parsing `SANDBOX_SELF_URL` at config load time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfHost {
    /// `SANDBOX_SELF_URL` was never set; self-loop protection does not apply
    Unset,
    /// Set but not a usable URL; treated as "any request is self"
    Malformed,
    Host(String),
}

impl SelfHost {
    #[must_use]
    pub fn from_url(raw: Option<&str>) -> Self {
        match raw {
            None => SelfHost::Unset,
            Some(raw) => match reqwest::Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_string)) {
                Some(host) => SelfHost::Host(host),
                None => SelfHost::Malformed,
            },
        }
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub self_host: SelfHost,
    pub disable_edge_rewrite: bool,
    pub debug_sandbox_routing: bool,
}

/// Shared state injected into every gateway request
pub struct GatewayState<S> {
    pub store: std::sync::Arc<S>,
    pub http: reqwest::Client,
    pub config: GatewayConfig,
}

enum Backend {
    Active(String),
    Fallback(String),
}

impl Backend {
    fn url(&self) -> &str {
        match self {
            Backend::Active(u) | Backend::Fallback(u) => u,
        }
    }

    fn routing_label(&self) -> &'static str {
        match self {
            Backend::Active(_) => "edge-rewrite",
            Backend::Fallback(_) => "edge-rewrite-stale",
        }
    }
}

/// Axum handler: the gateway fallback route, mounted behind the trigger and
/// health routes so those always take priority over rewriting.
pub async fn handle<S>(State(state): State<std::sync::Arc<GatewayState<S>>>, request: Request) -> Response
where
    S: StateStore,
{
    if should_bypass(&state.config, request.headers(), request.uri()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let backend = match resolve_backend(state.store.as_ref()).await {
        Ok(Some(backend)) => backend,
        Ok(None) => return no_healthy_sandbox_response(),
        Err(err) => {
            warn!(error = %err, "failed to resolve routing backend");
            return no_healthy_sandbox_response();
        }
    };

    rewrite(&state, backend, request).await
}

fn should_bypass(config: &GatewayConfig, headers: &HeaderMap, uri: &Uri) -> bool {
    match &config.self_host {
        SelfHost::Unset => {}
        // A malformed SANDBOX_SELF_URL is treated as "any request is self"
        // — bypass everything rather than risk a rewrite loop against an
        // unidentifiable origin.
        SelfHost::Malformed => return true,
        SelfHost::Host(self_host) => {
            let request_host = headers
                .get(axum::http::header::HOST)
                .and_then(|v| v.to_str().ok());
            if request_host.is_some_and(|host| host.eq_ignore_ascii_case(self_host)) {
                return true;
            }
        }
    }

    if config.disable_edge_rewrite {
        return true;
    }

    if headers
        .get("x-sandbox-bypass")
        .and_then(|v| v.to_str().ok())
        == Some("true")
    {
        return true;
    }

    let path = uri.path();
    BYPASS_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

async fn resolve_backend<S: StateStore>(store: &S) -> Result<Option<Backend>, store::StoreError> {
    if let Some(value) = store.read_first(&keys::active_url_fallbacks()).await? {
        if let Some(url) = value.as_str() {
            return Ok(Some(Backend::Active(url.to_string())));
        }
    }
    if let Some(value) = store.read_first(&keys::last_known_good_fallbacks()).await? {
        if let Some(url) = value.as_str() {
            return Ok(Some(Backend::Fallback(url.to_string())));
        }
    }
    Ok(None)
}

fn no_healthy_sandbox_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [
            ("cache-control", "no-store"),
            ("content-type", "text/plain; charset=utf-8"),
        ],
        "No healthy sandbox available",
    )
        .into_response()
}

async fn rewrite<S>(
    state: &GatewayState<S>,
    backend: Backend,
    request: Request,
) -> Response
where
    S: StateStore,
{
    let target = match reqwest::Url::parse(backend.url()) {
        Ok(url) => url,
        Err(err) => {
            warn!(url = backend.url(), error = %err, "routing target is not a valid URL");
            return no_healthy_sandbox_response();
        }
    };
    let origin = format!(
        "{}://{}",
        target.scheme(),
        target.host_str().unwrap_or_default()
    );

    let (parts, body) = request.into_parts();
    let upstream_url = compose_upstream_url(&target, &parts.uri);

    let body_bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut forward_headers = parts.headers.clone();
    forward_headers.remove(axum::http::header::HOST);
    if let Ok(value) = HeaderValue::from_str(&origin) {
        forward_headers.insert("x-sandbox-origin", value);
    }

    let upstream_request = state
        .http
        .request(to_reqwest_method(&parts.method), upstream_url)
        .headers(forward_headers)
        .body(body_bytes);

    let debug_probe = if state.config.debug_sandbox_routing {
        Some(probe_upstream(&state.http, &target, &parts).await)
    } else {
        None
    };

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %upstream_url_display(&target, &parts.uri), error = %err, "upstream request failed");
            return no_healthy_sandbox_response();
        }
    };

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    let response_body = upstream_response
        .bytes()
        .await
        .unwrap_or_default();

    response_headers.remove(reqwest::header::TRANSFER_ENCODING);

    let mut builder = Response::builder().status(status);
    for (name, value) in &response_headers {
        builder = builder.header(name, value);
    }
    builder = builder
        .header("x-sandbox-origin", origin)
        .header("x-sandbox-routing", backend.routing_label());

    if let Some((probe_status, probe_error)) = debug_probe {
        builder = builder.header("x-sandbox-probe-status", probe_status.to_string());
        if let Some(error) = probe_error {
            builder = builder.header("x-sandbox-probe-error", error);
        }
    }

    builder
        .body(Body::from(response_body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn compose_upstream_url(target: &reqwest::Url, incoming: &Uri) -> reqwest::Url {
    let mut upstream = target.clone();
    upstream.set_path(incoming.path());
    upstream.set_query(incoming.query());
    upstream
}

fn upstream_url_display(target: &reqwest::Url, incoming: &Uri) -> String {
    compose_upstream_url(target, incoming).to_string()
}

fn to_reqwest_method(method: &Method) -> reqwest::Method {
    reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET)
}

/// `HEAD` (for GET/HEAD requests) or `OPTIONS` (otherwise) probe of the
/// composed upstream URL, used only to annotate `x-sandbox-probe-status`
/// when `DEBUG_SANDBOX_ROUTING` is enabled. Never affects routing itself.
async fn probe_upstream(
    client: &reqwest::Client,
    target: &reqwest::Url,
    parts: &axum::http::request::Parts,
) -> (i32, Option<String>) {
    let upstream_url = compose_upstream_url(target, &parts.uri);
    let probe_method = match parts.method {
        Method::GET | Method::HEAD => reqwest::Method::HEAD,
        _ => reqwest::Method::OPTIONS,
    };

    match client.request(probe_method, upstream_url).send().await {
        Ok(response) => (i32::from(response.status().as_u16()), None),
        Err(err) => (-1, Some(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderName;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(
                HeaderName::try_from(*k).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        headers
    }

    fn config(self_host: SelfHost) -> GatewayConfig {
        GatewayConfig {
            self_host,
            disable_edge_rewrite: false,
            debug_sandbox_routing: false,
        }
    }

    #[test]
    fn self_host_match_bypasses() {
        let cfg = config(SelfHost::Host("router.example".to_string()));
        let headers = headers_with(&[("host", "router.example")]);
        assert!(should_bypass(&cfg, &headers, &"/foo".parse().unwrap()));
    }

    #[test]
    fn unset_self_url_does_not_bypass_by_itself() {
        let cfg = config(SelfHost::Unset);
        let headers = headers_with(&[("host", "other.example")]);
        assert!(!should_bypass(&cfg, &headers, &"/dashboard".parse().unwrap()));
    }

    #[test]
    fn malformed_self_url_bypasses_everything() {
        let cfg = config(SelfHost::Malformed);
        let headers = HeaderMap::new();
        assert!(should_bypass(&cfg, &headers, &"/foo".parse().unwrap()));
    }

    #[test]
    fn disable_edge_rewrite_bypasses() {
        let mut cfg = config(SelfHost::Host("router.example".to_string()));
        cfg.disable_edge_rewrite = true;
        let headers = headers_with(&[("host", "other.example")]);
        assert!(should_bypass(&cfg, &headers, &"/foo".parse().unwrap()));
    }

    #[test]
    fn bypass_header_bypasses() {
        let cfg = config(SelfHost::Host("router.example".to_string()));
        let headers = headers_with(&[("host", "other.example"), ("x-sandbox-bypass", "true")]);
        assert!(should_bypass(&cfg, &headers, &"/foo".parse().unwrap()));
    }

    #[test]
    fn api_and_watchdog_paths_bypass() {
        let cfg = config(SelfHost::Host("router.example".to_string()));
        let headers = headers_with(&[("host", "other.example")]);
        assert!(should_bypass(&cfg, &headers, &"/api/health".parse().unwrap()));
        assert!(should_bypass(&cfg, &headers, &"/watchdog".parse().unwrap()));
        assert!(should_bypass(&cfg, &headers, &"/favicon.ico".parse().unwrap()));
    }

    #[test]
    fn ordinary_path_with_other_host_does_not_bypass() {
        let cfg = config(SelfHost::Host("router.example".to_string()));
        let headers = headers_with(&[("host", "other.example")]);
        assert!(!should_bypass(&cfg, &headers, &"/dashboard".parse().unwrap()));
    }

    #[test]
    fn upstream_url_preserves_path_and_query_over_target_origin() {
        let target = reqwest::Url::parse("https://sbx-1.example:8443/ignored").unwrap();
        let incoming: Uri = "/some/path?x=1&y=2".parse().unwrap();
        let composed = compose_upstream_url(&target, &incoming);
        assert_eq!(composed.as_str(), "https://sbx-1.example:8443/some/path?x=1&y=2");
    }
}
