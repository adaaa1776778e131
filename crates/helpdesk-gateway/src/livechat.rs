//! Livechat answers grounded on the tenant's knowledge base.
//!
//! ```text
//! question ──▶ history (last N) ──▶ store visitor message
//!                  │
//!                  ▼
//!          FAQ short-circuit? ──yes──▶ canned reply        (source: "faq")
//!                  │ no
//!                  ▼
//!          knowledge context + FAQ context + history
//!                  │
//!                  ▼
//!              LLM call ──ok──▶ reply                      (source: "ai")
//!                  │ err
//!                  ▼
//!          typed fallback text                             (source: "fallback")
//! ```

use crate::prompt::build_messages;
use crate::routes::{ApiError, ApiResult, internal_error};
use crate::server::AppState;
use axum::Json;
use axum::extract::{Extension, Path, State};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::Role;
use helpdesk_knowledge::faq::{faq_context, find_answer};
use helpdesk_knowledge::{build_context, extract_keywords};
use helpdesk_tenancy::context::{self, RequestContext};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Instructions for drafting agent replies to tickets.
const SUGGEST_PROMPT: &str = "You draft replies for a support agent answering a customer ticket. \
Use only the provided knowledge and FAQ context, keep a friendly professional tone, \
and leave placeholders like [order number] where details are missing.";

#[derive(Debug, Deserialize)]
pub struct AskReq {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivechatReply {
    pub conversation_id: String,
    pub answer: String,
    /// "faq", "ai" or "fallback".
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Answer one visitor question and persist both sides of the exchange.
pub async fn answer_question(
    state: &AppState,
    ctx: &RequestContext,
    conversation_id: &str,
    question: &str,
) -> Result<LivechatReply> {
    let store = &ctx.store;
    let history = store.history(conversation_id, state.config.llm.history_limit)?;
    store.append_message(conversation_id, Role::User, question)?;

    let retrieval = &state.config.retrieval.livechat;
    let keywords = extract_keywords(question, retrieval);
    let articles = store.list_published_articles()?;

    if let Some(faq) = find_answer(&articles, &keywords, &state.config.faq) {
        store.append_message(conversation_id, Role::Assistant, &faq.answer)?;
        tracing::info!("💬 [{}] FAQ answer '{}' (score {})", ctx.tenant_slug, faq.slug, faq.score);
        return Ok(LivechatReply {
            conversation_id: conversation_id.to_string(),
            answer: faq.answer,
            source: "faq",
            article: Some(faq.slug),
            error_kind: None,
        });
    }

    let entries = store.list_active_entries()?;
    let knowledge = build_context(&entries, question, retrieval);
    let faq_ctx = faq_context(&articles, &keywords, &state.config.faq);
    let prompt = store
        .get_setting("livechat_prompt")?
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.config.llm.system_prompt.clone());
    let messages = build_messages(&prompt, &knowledge, &faq_ctx, &history, question);

    let (answer, source, error_kind) = match state.llm.chat(&messages).await {
        Ok(text) => (text, "ai", None),
        Err(e) => {
            tracing::warn!("⚠️ [{}] LLM failed ({}), using fallback", ctx.tenant_slug, e.kind);
            (e.user_message().to_string(), "fallback", Some(e.kind.as_str().to_string()))
        }
    };
    store.append_message(conversation_id, Role::Assistant, &answer)?;
    tracing::info!(
        "💬 [{}] {source} answer for {conversation_id} ({} chars of context)",
        ctx.tenant_slug,
        knowledge.chars().count()
    );

    Ok(LivechatReply {
        conversation_id: conversation_id.to_string(),
        answer,
        source,
        article: None,
        error_kind,
    })
}

fn prepare(req: AskReq) -> std::result::Result<(RequestContext, String, String), ApiError> {
    let ctx = context::current().map_err(|_| ApiError::not_found("Unknown tenant"))?;
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::bad_request("Question is required"));
    }
    let conversation_id = req
        .conversation_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    Ok((ctx, conversation_id, question))
}

pub async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskReq>) -> ApiResult {
    let (ctx, conversation_id, question) = prepare(req)?;
    let reply = answer_question(&state, &ctx, &conversation_id, &question)
        .await
        .map_err(|e| internal_error("livechat", e))?;
    Ok(Json(json!({"ok": true, "reply": reply})))
}

/// Queue the answer and return a job id to poll.
pub async fn ask_async(State(state): State<Arc<AppState>>, Json(req): Json<AskReq>) -> ApiResult {
    let (ctx, conversation_id, question) = prepare(req)?;
    let worker_state = Arc::clone(&state);
    let conv = conversation_id.clone();
    let job_id = state.jobs.submit(ctx, move || async move {
        let ctx = context::current()?;
        let reply = answer_question(&worker_state, &ctx, &conv, &question).await?;
        Ok::<_, HelpdeskError>(serde_json::to_value(reply)?)
    });
    Ok(Json(json!({"ok": true, "job_id": job_id, "conversation_id": conversation_id})))
}

pub async fn job_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let ctx = context::current().map_err(|_| ApiError::not_found("Job not found"))?;
    let status = state
        .jobs
        .poll(&ctx.tenant_id, &id)
        .ok_or_else(|| ApiError::not_found("Job not found"))?;
    let mut body = serde_json::to_value(status).map_err(|e| internal_error("job_status", e))?;
    body["ok"] = json!(true);
    body["job_id"] = json!(id);
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct SuggestReq {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Draft a reply to a customer ticket for a staff member to edit.
pub async fn suggest_reply(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<SuggestReq>,
) -> ApiResult {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }
    let retrieval = &state.config.retrieval.ticket_reply;
    let entries = ctx.store.list_active_entries().map_err(|e| internal_error("suggest_reply", e))?;
    let articles = ctx
        .store
        .list_published_articles()
        .map_err(|e| internal_error("suggest_reply", e))?;
    let history = match req.conversation_id.as_deref() {
        Some(conv) => ctx
            .store
            .history(conv, state.config.llm.history_limit)
            .map_err(|e| internal_error("suggest_reply", e))?,
        None => Vec::new(),
    };

    let keywords = extract_keywords(message, retrieval);
    let knowledge = build_context(&entries, message, retrieval);
    let faq_ctx = faq_context(&articles, &keywords, &state.config.faq);
    let messages = build_messages(SUGGEST_PROMPT, &knowledge, &faq_ctx, &history, message);

    match state.llm.chat(&messages).await {
        Ok(suggestion) => Ok(Json(json!({"ok": true, "suggestion": suggestion}))),
        Err(e) => {
            tracing::warn!("⚠️ [{}] Reply suggestion failed ({}): {}", ctx.tenant_slug, e.kind, e.message);
            Ok(Json(json!({"ok": false, "error": e.user_message(), "error_kind": e.kind.as_str()})))
        }
    }
}
