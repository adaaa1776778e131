//! Tenant resolution middleware.
//!
//! Runs before every handler: reads the session cookie and `?tenant=` query,
//! resolves the tenant, then runs the rest of the request inside
//! [`context::scope`] with the [`RequestContext`] also inserted as an
//! extension for handlers that take it explicitly.

use crate::server::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use helpdesk_tenancy::context;
use helpdesk_tenancy::resolver::{Resolution, TenantSource};
use std::collections::HashMap;
use std::sync::Arc;

/// Value of cookie `name` in the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Percent-decoded `?tenant=` value, if present and non-empty.
pub fn query_tenant(uri: &Uri) -> Option<String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut q)| q.remove("tenant"))
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(name: &str, token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax")).ok()
}

pub fn clear_cookie(name: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")).ok()
}

/// API callers get a 401 they can act on; browsers are sent to the login page.
fn login_required(path: &str) -> Response {
    if path.starts_with("/api/") {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"ok": false, "error": "Login required", "login": "/login"})),
        )
            .into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

pub async fn resolve_tenant(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let path = req.uri().path().to_string();
    let cookie_name = state.config.tenancy.session_cookie.clone();
    let token = cookie_value(req.headers(), &cookie_name);
    let session = token.as_deref().and_then(|t| state.sessions.get(t));
    let query_tenant = query_tenant(req.uri());

    match state.resolver.resolve(&path, session.as_ref(), query_tenant.as_deref()) {
        Ok(Resolution::Resolved(ctx, source)) => {
            // Remember the widget's tenant for the visitor's follow-up requests.
            let mut new_cookie = None;
            let remembered = session.as_ref().and_then(|s| s.chat_tenant.as_deref());
            if source == TenantSource::Query && remembered != Some(ctx.tenant_id.as_str()) {
                let mut visitor = session.unwrap_or_default();
                visitor.chat_tenant = Some(ctx.tenant_id.clone());
                let updated = token
                    .as_deref()
                    .is_some_and(|t| state.sessions.update(t, visitor.clone()));
                if !updated {
                    let t = state.sessions.create(visitor);
                    new_cookie = session_cookie(&cookie_name, &t);
                }
            }

            req.extensions_mut().insert(ctx.clone());
            let mut response = context::scope(ctx, next.run(req)).await;
            if let Some(cookie) = new_cookie {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            response
        }
        Ok(Resolution::Anonymous) => next.run(req).await,
        Ok(Resolution::LoginRequired) => login_required(&path),
        Ok(Resolution::CorruptedSession) => {
            if let Some(t) = &token {
                state.sessions.destroy(t);
            }
            tracing::warn!("⚠️ Destroyed inconsistent session on {path}");
            let mut response = login_required(&path);
            if let Some(cookie) = clear_cookie(&cookie_name) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            response
        }
        Err(e) => {
            tracing::error!("❌ Tenant resolution failed on {path}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": "An internal error occurred"})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; hd_session=abc123; x=1"));
        assert_eq!(cookie_value(&headers, "hd_session").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_query_tenant() {
        let uri = |s: &str| s.parse::<Uri>().unwrap();
        assert_eq!(query_tenant(&uri("/help?a=1&tenant=acme")).as_deref(), Some("acme"));
        assert_eq!(query_tenant(&uri("/help?tenant=acme%2Dshop")).as_deref(), Some("acme-shop"));
        assert_eq!(query_tenant(&uri("/help?tenant=caf%C3%A9+bar")).as_deref(), Some("café bar"));
        assert_eq!(query_tenant(&uri("/help?tenant=")), None);
        assert_eq!(query_tenant(&uri("/help?tenant")), None);
        assert_eq!(query_tenant(&uri("/help")), None);
    }

    #[test]
    fn test_login_required_shapes() {
        assert_eq!(login_required("/api/knowledge").status(), StatusCode::UNAUTHORIZED);
        let redirect = login_required("/");
        assert_eq!(redirect.status(), StatusCode::SEE_OTHER);
        assert_eq!(redirect.headers()[header::LOCATION], "/login");
    }
}
