//! HTTP server implementation using Axum.

use crate::jobs::JobQueue;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{get, post},
};
use helpdesk_core::config::{HelpdeskConfig, expand_path};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_providers::LlmClient;
use helpdesk_tenancy::{PlatformDb, SessionStore, StoreRegistry, TenantResolver};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
pub struct AppState {
    pub config: HelpdeskConfig,
    pub platform: Arc<PlatformDb>,
    pub stores: Arc<StoreRegistry>,
    pub resolver: TenantResolver,
    pub sessions: SessionStore,
    pub llm: Arc<dyn LlmClient>,
    pub jobs: JobQueue,
    pub start_time: Instant,
    /// Rate limiter: email → (attempt_count, first_attempt_time)
    pub login_attempts: Mutex<HashMap<String, (u32, Instant)>>,
}

impl AppState {
    /// Wire state from already-opened components.
    pub fn new(config: HelpdeskConfig, platform: Arc<PlatformDb>, stores: Arc<StoreRegistry>, llm: Arc<dyn LlmClient>) -> Self {
        let resolver = TenantResolver::new(
            Arc::clone(&platform),
            Arc::clone(&stores),
            config.tenancy.public_prefixes.clone(),
        );
        Self {
            config,
            platform,
            stores,
            resolver,
            sessions: SessionStore::default(),
            llm,
            jobs: JobQueue::default(),
            start_time: Instant::now(),
            login_attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Open the platform database, tenant data dir and LLM client named in `config`.
    pub fn from_config(config: HelpdeskConfig) -> Result<Self> {
        let platform_path = expand_path(&config.tenancy.platform_db);
        if let Some(parent) = platform_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let platform = Arc::new(PlatformDb::open(&platform_path)?);
        let stores = Arc::new(StoreRegistry::new(expand_path(&config.tenancy.data_dir)));
        let llm = helpdesk_providers::create_client(&config.llm)?;
        Ok(Self::new(config, platform, stores, llm))
    }

    /// Drop rate-limit entries whose window has elapsed; returns how many went.
    pub fn prune_login_attempts(&self) -> usize {
        self.prune_login_attempts_at(Instant::now())
    }

    fn prune_login_attempts_at(&self, now: Instant) -> usize {
        let Ok(mut attempts) = self.login_attempts.lock() else {
            return 0;
        };
        let before = attempts.len();
        let window = Duration::from_secs(crate::routes::LOGIN_WINDOW_SECS);
        attempts.retain(|_, (_, first_at)| now.duration_since(*first_at) < window);
        before - attempts.len()
    }
}

/// Security headers middleware: nosniff, frame and referrer policy.
async fn security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::HeaderValue;
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    response
}

fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    // The livechat widget is embedded on customer sites.
    // Example: HELPDESK_CORS_ORIGINS=https://shop.example.com,https://example.com
    match std::env::var("HELPDESK_CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed)
        }
        _ => cors.allow_origin(Any),
    }
}

/// Build the Axum router with all routes.
///
/// Every route passes through tenant resolution; whether a tenant is
/// required is decided by path class, not by route registration.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::{livechat, routes};

    let staff = Router::new()
        .route("/", get(routes::dashboard_page))
        .route("/api/tenant", get(routes::tenant_info))
        .route("/api/me", get(routes::current_user))
        .route("/api/settings/{key}", get(routes::get_setting).put(routes::put_setting))
        .route("/api/knowledge", get(routes::list_entries).post(routes::create_entry))
        .route(
            "/api/knowledge/{id}",
            get(routes::get_entry).put(routes::update_entry).delete(routes::delete_entry),
        )
        .route("/api/knowledge/{id}/toggle", post(routes::toggle_entry))
        .route("/api/knowledge/context", post(routes::preview_context))
        .route("/api/articles", get(routes::list_articles).post(routes::create_article))
        .route("/api/articles/{id}/publish", post(routes::publish_article))
        .route("/api/ai/suggest-reply", post(livechat::suggest_reply));

    let public = Router::new()
        .route("/health", get(routes::health_check))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/help/api/articles", get(routes::help_articles))
        .route("/api/livechat/ask", post(livechat::ask))
        .route("/api/livechat/ask-async", post(livechat::ask_async))
        .route("/api/jobs/{id}", get(livechat::job_status));

    staff
        .merge(public)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            crate::middleware::resolve_tenant,
        ))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.server.body_limit))
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start(state: Arc<AppState>) -> Result<()> {
    let port = state.config.server.port;
    // Bind to 127.0.0.1 unless explicitly exposed; production sits behind a reverse proxy.
    let bind_all = state.config.server.bind_all
        || std::env::var("HELPDESK_BIND_ALL").unwrap_or_default() == "1";
    let bind_addr = if bind_all { [0, 0, 0, 0] } else { [127, 0, 0, 1] };
    let addr = std::net::SocketAddr::from((bind_addr, port));

    // Idle sessions are dropped on access; sweep the rest periodically.
    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(600));
        loop {
            tick.tick().await;
            let purged = sweeper.sessions.purge_expired();
            let pruned = sweeper.jobs.prune();
            let attempts = sweeper.prune_login_attempts();
            if purged + pruned + attempts > 0 {
                tracing::debug!("🧹 Purged {purged} sessions, {pruned} jobs, {attempts} login windows");
            }
        }
    });

    let app = build_router(state);
    tracing::info!("🚀 Helpdesk gateway running at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HelpdeskError::Http(format!("Bind error: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| HelpdeskError::Http(format!("Server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use helpdesk_core::types::{Message, Role};
    use helpdesk_providers::{LlmError, LlmErrorKind};
    use helpdesk_tenancy::Session;
    use serde_json::{Value, json};
    use std::path::Path;
    use tower::ServiceExt;

    const PRICING: &str = "Our pricing explained.\n\n\
        1. Activation fees: a one-time activation fee of 49 EUR is charged when the line is opened.\n\n\
        2. Monthly fees: the subscription costs 19 EUR per month, billed at the start of each month.\n\n\
        3. Termination fees: closing the line within the first year costs 30 EUR.\n\n\
        4. Payment methods: we accept cards, bank transfers and direct debit mandates.\n\n\
        5. Refunds: unused months are refunded pro rata within fourteen days of the request.";

    struct StubLlm {
        reply: std::result::Result<String, LlmErrorKind>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, messages: &[Message]) -> std::result::Result<String, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(kind) => Err(LlmError::new(*kind, "stubbed failure")),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
        llm: Arc<StubLlm>,
    }

    fn fixture_with(reply: std::result::Result<String, LlmErrorKind>, data_dir: Option<&Path>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(PlatformDb::open(Path::new(":memory:")).unwrap());
        let stores = Arc::new(StoreRegistry::new(
            data_dir.map(Path::to_path_buf).unwrap_or_else(|| dir.path().join("tenants")),
        ));
        let llm = Arc::new(StubLlm { reply, seen: Mutex::new(Vec::new()) });
        let state = Arc::new(AppState::new(HelpdeskConfig::default(), platform, stores, llm.clone()));
        Fixture { _dir: dir, state, llm }
    }

    fn fixture() -> Fixture {
        fixture_with(Ok("Activation costs 49 EUR.".into()), None)
    }

    /// Create a tenant plus a logged-in staff session; returns (tenant_id, cookie header).
    fn staff(state: &AppState, slug: &str) -> (String, String) {
        let tenant = state.platform.create_tenant(slug, slug, "pro", None).unwrap();
        let token = state.sessions.create(Session {
            user_id: Some(format!("user-{slug}")),
            tenant_id: Some(tenant.id.clone()),
            chat_tenant: None,
        });
        (tenant.id, format!("hd_session={token}"))
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        req.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = build_router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    #[tokio::test]
    async fn test_health_check() {
        let f = fixture();
        let (status, headers, json) = send(&f.state, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_scoped_paths_require_login() {
        let f = fixture();
        let (status, _, json) = send(&f.state, get("/api/knowledge", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["ok"], false);

        let (status, headers, _) = send(&f.state, get("/", None)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/login");

        let (status, _, _) = send(&f.state, get("/api/knowledge", Some("hd_session=bogus"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let f = fixture();
        let (_, cookie_a) = staff(&f.state, "alpha");
        let (_, cookie_b) = staff(&f.state, "beta");

        let (status, _, json) = send(
            &f.state,
            post_json("/api/knowledge", Some(&cookie_a), json!({"title": "Secret", "content": "alpha only"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = json["entry"]["id"].as_str().unwrap().to_string();

        let (_, _, json) = send(&f.state, get("/api/knowledge", Some(&cookie_b))).await;
        assert_eq!(json["count"], 0);
        let (status, _, _) = send(&f.state, get(&format!("/api/knowledge/{id}"), Some(&cookie_b))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, json) = send(&f.state, get("/api/knowledge", Some(&cookie_a))).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["entries"][0]["title"], "Secret");
    }

    #[tokio::test]
    async fn test_knowledge_crud() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let (_, _, json) = send(
            &f.state,
            post_json("/api/knowledge", Some(&cookie), json!({"title": "Pricing FAQ", "content": PRICING})),
        )
        .await;
        let id = json["entry"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/knowledge/{id}");

        let put = Request::put(&uri)
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"title": "Prices", "content": "49 EUR"}).to_string()))
            .unwrap();
        assert_eq!(send(&f.state, put).await.0, StatusCode::OK);
        let (_, _, json) = send(&f.state, get(&uri, Some(&cookie))).await;
        assert_eq!(json["entry"]["title"], "Prices");

        let (_, _, json) = send(&f.state, post_json(&format!("{uri}/toggle"), Some(&cookie), json!({}))).await;
        assert_eq!(json["active"], false);

        let delete = Request::delete(&uri).header(header::COOKIE, &cookie).body(Body::empty()).unwrap();
        assert_eq!(send(&f.state, delete).await.0, StatusCode::OK);
        assert_eq!(send(&f.state, get(&uri, Some(&cookie))).await.0, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &f.state,
            post_json("/api/knowledge", Some(&cookie), json!({"title": " ", "content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_corrupted_session_is_destroyed() {
        let f = fixture();
        let token = f.state.sessions.create(Session {
            user_id: Some("u1".into()),
            tenant_id: None,
            chat_tenant: None,
        });
        let cookie = format!("hd_session={token}");
        let (status, headers, _) = send(&f.state, get("/api/knowledge", Some(&cookie))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));
        assert!(f.state.sessions.get(&token).is_none());
    }

    #[tokio::test]
    async fn test_login_flow() {
        let f = fixture();
        let tenant = f.state.platform.create_tenant("Acme", "acme", "pro", Some(14)).unwrap();
        let hash = helpdesk_tenancy::auth::hash_password_with_cost("s3cret", 4).unwrap();
        f.state
            .platform
            .create_user("agent@acme.test", &hash, Some(&tenant.id), "agent")
            .unwrap();

        let (status, _, _) = send(
            &f.state,
            post_json("/login", None, json!({"email": "agent@acme.test", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, headers, json) = send(
            &f.state,
            post_json("/login", None, json!({"email": "Agent@acme.test", "password": "s3cret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant_id"], tenant.id.as_str());
        let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let (status, _, json) = send(&f.state, get("/api/tenant", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant"]["slug"], "acme");
        assert_eq!(json["trial_expired"], false);

        send(&f.state, post_json("/logout", Some(&cookie), json!({}))).await;
        assert_eq!(send(&f.state, get("/api/tenant", Some(&cookie))).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let f = fixture();
        for _ in 0..5 {
            let req = post_json("/login", None, json!({"email": "x@y.z", "password": "nope"}));
            assert_eq!(send(&f.state, req).await.0, StatusCode::UNAUTHORIZED);
        }
        let req = post_json("/login", None, json!({"email": "x@y.z", "password": "nope"}));
        assert_eq!(send(&f.state, req).await.0, StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_prune_login_attempts() {
        let f = fixture();
        let start = Instant::now();
        {
            let mut attempts = f.state.login_attempts.lock().unwrap();
            attempts.insert("old@x.z".into(), (3, start));
            attempts.insert("new@x.z".into(), (1, start + Duration::from_secs(200)));
        }
        let later = start + Duration::from_secs(crate::routes::LOGIN_WINDOW_SECS + 1);
        assert_eq!(f.state.prune_login_attempts_at(later), 1);
        let attempts = f.state.login_attempts.lock().unwrap();
        assert!(attempts.contains_key("new@x.z"));
        assert!(!attempts.contains_key("old@x.z"));
    }

    #[tokio::test]
    async fn test_current_user() {
        let f = fixture();
        let tenant = f.state.platform.create_tenant("Acme", "acme", "pro", None).unwrap();
        let user_id = f
            .state
            .platform
            .create_user("agent@acme.test", "unused", Some(&tenant.id), "admin")
            .unwrap();
        let token = f.state.sessions.create(Session {
            user_id: Some(user_id),
            tenant_id: Some(tenant.id.clone()),
            chat_tenant: None,
        });
        let cookie = format!("hd_session={token}");
        let (status, _, json) = send(&f.state, get("/api/me", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["email"], "agent@acme.test");
        assert_eq!(json["user"]["role"], "admin");
        assert_eq!(json["tenant"], "acme");
        assert_eq!(send(&f.state, get("/api/me", None)).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deactivated_tenant_is_degraded_not_blocked() {
        let f = fixture();
        let (tenant_id, cookie) = staff(&f.state, "acme");
        f.state.platform.set_tenant_active(&tenant_id, false).unwrap();
        let (status, _, json) = send(&f.state, get("/api/tenant", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["trial_expired"], true);
    }

    #[tokio::test]
    async fn test_livechat_ai_answer_grounded_on_knowledge() {
        let f = fixture();
        let (tenant_id, _) = staff(&f.state, "acme");
        let store = f.state.stores.get_or_open(&tenant_id).unwrap();
        store
            .create_entry("Pricing FAQ", PRICING, helpdesk_core::types::KnowledgeSource::Text)
            .unwrap();

        let (status, headers, json) = send(
            &f.state,
            post_json(
                "/api/livechat/ask?tenant=acme",
                None,
                json!({"question": "What are the activation fees?", "conversation_id": "conv-1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reply"]["source"], "ai");
        assert_eq!(json["reply"]["answer"], "Activation costs 49 EUR.");
        assert!(headers.contains_key(header::SET_COOKIE));

        let seen = f.llm.seen.lock().unwrap();
        let system = &seen[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("1. Activation fees"));
        assert_eq!(seen[0].last().unwrap(), &Message::user("What are the activation fees?"));

        let history = store.history("conv-1", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_livechat_uses_tenant_prompt_setting() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let put = Request::put("/api/settings/livechat_prompt")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"value": "You are Acme's cheerful support bot."}).to_string()))
            .unwrap();
        assert_eq!(send(&f.state, put).await.0, StatusCode::OK);
        let (_, _, json) = send(&f.state, get("/api/settings/livechat_prompt", Some(&cookie))).await;
        assert_eq!(json["value"], "You are Acme's cheerful support bot.");
        let (status, _, _) = send(&f.state, get("/api/settings/llm_api_key", Some(&cookie))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &f.state,
            post_json("/api/livechat/ask?tenant=acme", None, json!({"question": "Do you deliver on weekends?"})),
        )
        .await;
        let seen = f.llm.seen.lock().unwrap();
        assert!(seen[0][0].content.starts_with("You are Acme's cheerful support bot."));
    }

    #[tokio::test]
    async fn test_livechat_history_is_sent_on_follow_up() {
        let f = fixture();
        staff(&f.state, "acme");
        for question in ["Hello there, what are your opening hours?", "And on sundays?"] {
            send(
                &f.state,
                post_json("/api/livechat/ask?tenant=acme", None, json!({"question": question, "conversation_id": "c"})),
            )
            .await;
        }
        let seen = f.llm.seen.lock().unwrap();
        // system + previous user + previous assistant + new question
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][1].content, "Hello there, what are your opening hours?");
    }

    #[tokio::test]
    async fn test_livechat_faq_short_circuit() {
        let f = fixture();
        let (tenant_id, _) = staff(&f.state, "acme");
        let store = f.state.stores.get_or_open(&tenant_id).unwrap();
        store
            .create_article("Activation fees", "activation-fees", "", "Activation costs 49 EUR, charged once.", true)
            .unwrap();

        let (_, _, json) = send(
            &f.state,
            post_json("/api/livechat/ask?tenant=acme", None, json!({"question": "What are the activation fees?"})),
        )
        .await;
        assert_eq!(json["reply"]["source"], "faq");
        assert_eq!(json["reply"]["article"], "activation-fees");
        assert!(f.llm.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_livechat_fallback_on_llm_failure() {
        let f = fixture_with(Err(LlmErrorKind::RateLimit), None);
        staff(&f.state, "acme");
        let (status, _, json) = send(
            &f.state,
            post_json("/api/livechat/ask?tenant=acme", None, json!({"question": "Can I change my plan?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reply"]["source"], "fallback");
        assert_eq!(json["reply"]["error_kind"], "rate_limit");
        assert!(!json["reply"]["answer"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_livechat_unknown_tenant() {
        let f = fixture();
        let (status, _, _) = send(
            &f.state,
            post_json("/api/livechat/ask?tenant=nobody", None, json!({"question": "hi there"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_tenant_remembered_in_session() {
        let f = fixture();
        let (tenant_id, _) = staff(&f.state, "acme");
        let store = f.state.stores.get_or_open(&tenant_id).unwrap();
        store.create_article("Returns", "returns", "30 days", "Returns accepted for 30 days.", true).unwrap();

        let (_, headers, _) = send(&f.state, get("/help/api/articles?tenant=acme", None)).await;
        let cookie = headers[header::SET_COOKIE].to_str().unwrap().split(';').next().unwrap().to_string();

        let (status, _, json) = send(&f.state, get("/help/api/articles", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant"], "acme");
        assert_eq!(json["articles"][0]["slug"], "returns");

        let (status, _, _) = send(&f.state, get("/help/api/articles", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_tenant_switches_chat_tenant() {
        let f = fixture();
        for slug in ["alpha", "beta"] {
            let (tenant_id, _) = staff(&f.state, slug);
            let store = f.state.stores.get_or_open(&tenant_id).unwrap();
            store.create_article(slug, slug, "", "Welcome.", true).unwrap();
        }

        let (_, headers, _) = send(&f.state, get("/help/api/articles?tenant=alpha", None)).await;
        let cookie = headers[header::SET_COOKIE].to_str().unwrap().split(';').next().unwrap().to_string();

        // Same tenant again: nothing new to remember.
        let (_, headers, _) = send(&f.state, get("/help/api/articles?tenant=alpha", Some(&cookie))).await;
        assert!(!headers.contains_key(header::SET_COOKIE));

        let (status, _, json) = send(&f.state, get("/help/api/articles?tenant=beta", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant"], "beta");

        let (_, _, json) = send(&f.state, get("/help/api/articles", Some(&cookie))).await;
        assert_eq!(json["tenant"], "beta");
    }

    #[tokio::test]
    async fn test_publish_article_hides_from_help_center() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let (_, _, json) = send(
            &f.state,
            post_json("/api/articles", Some(&cookie), json!({"title": "Shipping", "body": "3 days."})),
        )
        .await;
        let id = json["article"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/articles/{id}/publish");
        let (status, _, _) = send(&f.state, post_json(&uri, Some(&cookie), json!({"published": false}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, _, json) = send(&f.state, get("/help/api/articles?tenant=acme", None)).await;
        assert_eq!(json["articles"], json!([]));

        let (status, _, _) = send(
            &f.state,
            post_json("/api/articles/missing/publish", Some(&cookie), json!({"published": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_same_tenant() {
        let f = fixture();
        let (tenant_id, cookie) = staff(&f.state, "acme");
        let requests = (0..10).map(|i| {
            let state = Arc::clone(&f.state);
            let cookie = cookie.clone();
            tokio::spawn(async move {
                let req = post_json(
                    "/api/knowledge",
                    Some(&cookie),
                    json!({"title": format!("Entry {i}"), "content": "written concurrently"}),
                );
                send(&state, req).await.0
            })
        });
        let statuses = futures::future::join_all(requests).await;
        assert!(statuses.into_iter().all(|s| s.unwrap() == StatusCode::OK));
        let store = f.state.stores.get_or_open(&tenant_id).unwrap();
        assert_eq!(store.count_entries().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_ask_async_and_poll() {
        let f = fixture();
        staff(&f.state, "acme");
        staff(&f.state, "other");
        let (_, _, json) = send(
            &f.state,
            post_json("/api/livechat/ask-async?tenant=acme", None, json!({"question": "Do you ship abroad?"})),
        )
        .await;
        let job_id = json["job_id"].as_str().unwrap().to_string();

        let (status, _, _) = send(&f.state, get(&format!("/api/jobs/{job_id}?tenant=other"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/jobs/{job_id}?tenant=acme");
        let mut last = Value::Null;
        for _ in 0..200 {
            let (_, _, json) = send(&f.state, get(&uri, None)).await;
            if json["status"] != "pending" {
                last = json;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "done");
        assert_eq!(last["result"]["source"], "ai");
    }

    #[tokio::test]
    async fn test_preview_context_respects_budget() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let big = PRICING.repeat(40);
        send(
            &f.state,
            post_json("/api/knowledge", Some(&cookie), json!({"title": "Pricing FAQ", "content": big})),
        )
        .await;
        let (_, _, json) = send(
            &f.state,
            post_json(
                "/api/knowledge/context",
                Some(&cookie),
                json!({"question": "What are the activation fees?", "budget": 2000}),
            ),
        )
        .await;
        assert_eq!(json["keywords"], json!(["activation", "fees"]));
        assert!(json["length"].as_u64().unwrap() <= 2000);
        assert!(json["context"].as_str().unwrap().contains("Activation fees"));
    }

    #[tokio::test]
    async fn test_suggest_reply() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let (_, _, json) = send(
            &f.state,
            post_json("/api/ai/suggest-reply", Some(&cookie), json!({"message": "Why was I charged 49 EUR?"})),
        )
        .await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["suggestion"], "Activation costs 49 EUR.");
    }

    #[tokio::test]
    async fn test_articles_slug_conflict() {
        let f = fixture();
        let (_, cookie) = staff(&f.state, "acme");
        let body = json!({"title": "Reset my password", "body": "Use the link."});
        let (_, _, json) = send(&f.state, post_json("/api/articles", Some(&cookie), body.clone())).await;
        assert_eq!(json["article"]["slug"], "reset-my-password");
        let (status, _, _) = send(&f.state, post_json("/api/articles", Some(&cookie), body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_store_open_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let f = fixture_with(Ok(String::new()), Some(&blocker));
        let (_, cookie) = staff(&f.state, "acme");
        let (status, _, json) = send(&f.state, get("/api/knowledge", Some(&cookie))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "An internal error occurred");
    }
}
