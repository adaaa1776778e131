//! API route handlers for the gateway.

use crate::middleware::{clear_cookie, cookie_value, session_cookie};
use crate::server::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use helpdesk_core::config::RetrievalConfig;
use helpdesk_core::types::KnowledgeSource;
use helpdesk_knowledge::{build_context, extract_keywords};
use helpdesk_tenancy::context::{self, RequestContext};
use helpdesk_tenancy::Session;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

const MAX_LOGIN_ATTEMPTS: u32 = 5;
pub(crate) const LOGIN_WINDOW_SECS: u64 = 300;

/// Tenant settings staff may read and change over the API.
pub const EDITABLE_SETTINGS: &[&str] = &["livechat_prompt"];

/// JSON error response with a status code.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({"ok": false, "error": self.1}))).into_response()
    }
}

pub type ApiResult = std::result::Result<Json<Value>, ApiError>;

/// Log the real error server-side, hand the client a generic message.
pub fn internal_error(context: &str, e: impl std::fmt::Display) -> ApiError {
    tracing::error!("[{context}] {e}");
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".into())
}

/// Audit writes never fail the request; failures are logged.
fn audit(state: &AppState, event_type: &str, actor_id: &str, details: Option<&str>) {
    if let Err(e) = state.platform.log_event(event_type, actor_id, details) {
        tracing::warn!("⚠️ Audit log write failed ({event_type}): {e}");
    }
}

// ── Public ────────────────────────────────────

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "open_stores": state.stores.open_count(),
    }))
}

#[derive(Deserialize)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

/// Returns true when `email` is still allowed another attempt.
fn record_login_attempt(state: &AppState, email: &str) -> bool {
    let Ok(mut attempts) = state.login_attempts.lock() else {
        return true;
    };
    let now = Instant::now();
    if let Some((_, first_at)) = attempts.get(email)
        && now.duration_since(*first_at).as_secs() >= LOGIN_WINDOW_SECS
    {
        attempts.remove(email);
    }
    let entry = attempts.entry(email.to_string()).or_insert((0, now));
    entry.0 += 1;
    entry.0 <= MAX_LOGIN_ATTEMPTS
}

pub async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginReq>) -> Response {
    let email = req.email.trim().to_lowercase();
    if !record_login_attempt(&state, &email) {
        return ApiError(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts. Please wait 5 minutes.".into(),
        )
        .into_response();
    }

    let (user, hash) = match state.platform.get_user_by_email(&email) {
        Ok(Some(found)) => found,
        Ok(None) => return ApiError(StatusCode::UNAUTHORIZED, "Invalid credentials".into()).into_response(),
        Err(e) => return internal_error("login", e).into_response(),
    };

    let password = req.password;
    let ok = tokio::task::spawn_blocking(move || helpdesk_tenancy::auth::verify_password(&password, &hash))
        .await
        .unwrap_or(false);
    if !ok {
        audit(&state, "login_failed", &user.id, None);
        return ApiError(StatusCode::UNAUTHORIZED, "Invalid credentials".into()).into_response();
    }

    // Staff accounts without a tenant would produce a half-populated session.
    let Some(tenant_id) = user.tenant_id.clone() else {
        return ApiError(StatusCode::FORBIDDEN, "Account is not attached to a tenant".into()).into_response();
    };

    if let Ok(mut attempts) = state.login_attempts.lock() {
        attempts.remove(&email);
    }
    audit(&state, "login_success", &user.id, None);
    tracing::info!("🔐 {} logged in", user.email);

    let token = state.sessions.create(Session {
        user_id: Some(user.id.clone()),
        tenant_id: Some(tenant_id.clone()),
        chat_tenant: None,
    });
    let body = Json(json!({"ok": true, "user": user.email, "role": user.role, "tenant_id": tenant_id}));
    match session_cookie(&state.config.tenancy.session_cookie, &token) {
        Some(cookie) => ([(header::SET_COOKIE, cookie)], body).into_response(),
        None => internal_error("login", "invalid session cookie name").into_response(),
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let name = &state.config.tenancy.session_cookie;
    if let Some(token) = cookie_value(&headers, name) {
        state.sessions.destroy(&token);
    }
    let body = Json(json!({"ok": true}));
    match clear_cookie(name) {
        Some(cookie) => ([(header::SET_COOKIE, cookie)], body).into_response(),
        None => body.into_response(),
    }
}

/// Published help-center articles of the visitor's tenant.
pub async fn help_articles() -> ApiResult {
    let ctx = context::current().map_err(|_| ApiError::not_found("Unknown help center"))?;
    let articles = ctx
        .store
        .list_published_articles()
        .map_err(|e| internal_error("help_articles", e))?;
    Ok(Json(json!({"ok": true, "tenant": ctx.tenant_slug, "articles": articles})))
}

// ── Staff ────────────────────────────────────

/// Landing summary for logged-in staff.
pub async fn dashboard_page(Extension(ctx): Extension<RequestContext>) -> ApiResult {
    let entries = ctx.store.count_entries().map_err(|e| internal_error("dashboard", e))?;
    let articles = ctx.store.list_articles().map_err(|e| internal_error("dashboard", e))?;
    Ok(Json(json!({
        "ok": true,
        "tenant": ctx.tenant_slug,
        "trial_expired": ctx.trial_expired,
        "knowledge_entries": entries,
        "articles": articles.len(),
    })))
}

pub async fn tenant_info(State(state): State<Arc<AppState>>, Extension(ctx): Extension<RequestContext>) -> ApiResult {
    let tenant = state
        .platform
        .get_tenant(&ctx.tenant_id)
        .map_err(|e| internal_error("tenant_info", e))?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;
    Ok(Json(json!({
        "ok": true,
        "tenant": {
            "id": tenant.id,
            "name": tenant.name,
            "slug": tenant.slug,
            "plan": tenant.plan,
            "active": tenant.active,
            "trial_ends_at": tenant.trial_ends_at,
        },
        "trial_expired": ctx.trial_expired,
    })))
}

/// The logged-in staff member and their tenant.
pub async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> ApiResult {
    let user_id = cookie_value(&headers, &state.config.tenancy.session_cookie)
        .and_then(|token| state.sessions.get(&token))
        .and_then(|session| session.user_id)
        .ok_or_else(|| ApiError(StatusCode::UNAUTHORIZED, "Login required".into()))?;
    let user = state
        .platform
        .get_user_by_id(&user_id)
        .map_err(|e| internal_error("current_user", e))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({
        "ok": true,
        "user": {"id": user.id, "email": user.email, "role": user.role},
        "tenant": ctx.tenant_slug,
        "trial_expired": ctx.trial_expired,
    })))
}

fn editable_setting(key: &str) -> Result<(), ApiError> {
    if EDITABLE_SETTINGS.contains(&key) {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("Unknown setting '{key}'")))
    }
}

pub async fn get_setting(Extension(ctx): Extension<RequestContext>, Path(key): Path<String>) -> ApiResult {
    editable_setting(&key)?;
    let value = ctx.store.get_setting(&key).map_err(|e| internal_error("get_setting", e))?;
    Ok(Json(json!({"ok": true, "key": key, "value": value})))
}

#[derive(Deserialize)]
pub struct SettingReq {
    pub value: String,
}

pub async fn put_setting(
    Extension(ctx): Extension<RequestContext>,
    Path(key): Path<String>,
    Json(req): Json<SettingReq>,
) -> ApiResult {
    editable_setting(&key)?;
    ctx.store
        .set_setting(&key, req.value.trim())
        .map_err(|e| internal_error("put_setting", e))?;
    tracing::info!("⚙️ [{}] Setting '{key}' updated", ctx.tenant_slug);
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct EntryReq {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

fn validate_entry(title: &str, content: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    if content.trim().is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }
    Ok(())
}

pub async fn list_entries(Extension(ctx): Extension<RequestContext>) -> ApiResult {
    let entries = ctx.store.list_entries().map_err(|e| internal_error("list_entries", e))?;
    Ok(Json(json!({
        "ok": true,
        "count": entries.len(),
        "entries": entries,
        "trial_expired": ctx.trial_expired,
    })))
}

pub async fn create_entry(Extension(ctx): Extension<RequestContext>, Json(req): Json<EntryReq>) -> ApiResult {
    validate_entry(&req.title, &req.content)?;
    let source = req.source.as_deref().map(KnowledgeSource::parse).unwrap_or_default();
    let entry = ctx
        .store
        .create_entry(req.title.trim(), &req.content, source)
        .map_err(|e| internal_error("create_entry", e))?;
    tracing::info!("📚 [{}] Knowledge entry '{}' added", ctx.tenant_slug, entry.title);
    Ok(Json(json!({"ok": true, "entry": entry})))
}

pub async fn get_entry(Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> ApiResult {
    let entry = ctx
        .store
        .get_entry(&id)
        .map_err(|e| internal_error("get_entry", e))?
        .ok_or_else(|| ApiError::not_found("Entry not found"))?;
    Ok(Json(json!({"ok": true, "entry": entry})))
}

pub async fn update_entry(
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(req): Json<EntryReq>,
) -> ApiResult {
    validate_entry(&req.title, &req.content)?;
    let updated = ctx
        .store
        .update_entry(&id, req.title.trim(), &req.content)
        .map_err(|e| internal_error("update_entry", e))?;
    if !updated {
        return Err(ApiError::not_found("Entry not found"));
    }
    Ok(Json(json!({"ok": true})))
}

pub async fn delete_entry(Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> ApiResult {
    let deleted = ctx.store.delete_entry(&id).map_err(|e| internal_error("delete_entry", e))?;
    if !deleted {
        return Err(ApiError::not_found("Entry not found"));
    }
    tracing::info!("🗑️ [{}] Knowledge entry {id} deleted", ctx.tenant_slug);
    Ok(Json(json!({"ok": true})))
}

pub async fn toggle_entry(Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> ApiResult {
    let active = ctx
        .store
        .toggle_entry(&id)
        .map_err(|e| internal_error("toggle_entry", e))?
        .ok_or_else(|| ApiError::not_found("Entry not found"))?;
    Ok(Json(json!({"ok": true, "active": active})))
}

#[derive(Deserialize)]
pub struct ContextReq {
    pub question: String,
    /// "livechat" (default) or "ticket_reply".
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub budget: Option<usize>,
}

/// Show staff exactly what the model would be grounded on for a question.
pub async fn preview_context(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<ContextReq>,
) -> ApiResult {
    let mut cfg: RetrievalConfig = match req.mode.as_deref() {
        Some("ticket_reply") => state.config.retrieval.ticket_reply.clone(),
        _ => state.config.retrieval.livechat.clone(),
    };
    if let Some(budget) = req.budget {
        cfg.budget = budget;
    }
    let entries = ctx
        .store
        .list_active_entries()
        .map_err(|e| internal_error("preview_context", e))?;
    let keywords = extract_keywords(&req.question, &cfg);
    let context = build_context(&entries, &req.question, &cfg);
    Ok(Json(json!({
        "ok": true,
        "keywords": keywords,
        "length": context.chars().count(),
        "budget": cfg.budget,
        "context": context,
    })))
}

#[derive(Deserialize)]
pub struct ArticleReq {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// Lowercase ASCII slug with single dashes.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub async fn list_articles(Extension(ctx): Extension<RequestContext>) -> ApiResult {
    let articles = ctx.store.list_articles().map_err(|e| internal_error("list_articles", e))?;
    Ok(Json(json!({"ok": true, "articles": articles})))
}

pub async fn create_article(Extension(ctx): Extension<RequestContext>, Json(req): Json<ArticleReq>) -> ApiResult {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let slug = slugify(req.slug.as_deref().unwrap_or(&req.title));
    if slug.is_empty() {
        return Err(ApiError::bad_request("Slug must contain letters or digits"));
    }
    let existing = ctx.store.list_articles().map_err(|e| internal_error("create_article", e))?;
    if existing.iter().any(|a| a.slug == slug) {
        return Err(ApiError(StatusCode::CONFLICT, format!("Slug '{slug}' is already used")));
    }
    let article = ctx
        .store
        .create_article(req.title.trim(), &slug, req.excerpt.trim(), &req.body, req.published)
        .map_err(|e| internal_error("create_article", e))?;
    Ok(Json(json!({"ok": true, "article": article})))
}

#[derive(Deserialize)]
pub struct PublishReq {
    pub published: bool,
}

/// Show or hide an article on the public help center.
pub async fn publish_article(
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(req): Json<PublishReq>,
) -> ApiResult {
    let updated = ctx
        .store
        .set_article_published(&id, req.published)
        .map_err(|e| internal_error("publish_article", e))?;
    if !updated {
        return Err(ApiError::not_found("Article not found"));
    }
    Ok(Json(json!({"ok": true, "published": req.published})))
}
