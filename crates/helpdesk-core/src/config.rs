//! Helpdesk configuration system.
//!
//! Every numeric threshold used by the retrieval engine and the FAQ
//! short-circuit lives here as a named, tunable field.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HelpdeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub faq: FaqConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl HelpdeskConfig {
    /// Load config from the default path (~/.helpdesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HelpdeskError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HelpdeskError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment overrides for secrets and endpoints.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = ["HELPDESK_LLM_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
        {
            self.llm.api_key = key;
        }
        if let Ok(url) = std::env::var("HELPDESK_LLM_BASE_URL")
            && !url.is_empty()
        {
            self.llm.base_url = url;
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the helpdesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".helpdesk")
    }
}

/// Expand `~` and environment variables in a configured path.
///
/// Unset variables leave the path with only `~` expanded.
pub fn expand_path(p: &str) -> PathBuf {
    let expanded = shellexpand::full(p)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(p).into_owned());
    PathBuf::from(expanded)
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind 0.0.0.0 instead of 127.0.0.1.
    #[serde(default)]
    pub bind_all: bool,
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_port() -> u16 { 3000 }
fn default_body_limit() -> usize { 2 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_all: false,
            body_limit: default_body_limit(),
        }
    }
}

/// Tenant resolution and storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Directory holding one SQLite file per tenant.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Platform registry database (tenants, users, audit log).
    #[serde(default = "default_platform_db")]
    pub platform_db: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Path prefixes reachable without a logged-in tenant session.
    #[serde(default = "default_public_prefixes")]
    pub public_prefixes: Vec<String>,
}

fn default_data_dir() -> String { "~/.helpdesk/tenants".into() }
fn default_platform_db() -> String { "~/.helpdesk/platform.db".into() }
fn default_session_cookie() -> String { "hd_session".into() }
fn default_public_prefixes() -> Vec<String> {
    ["/health", "/login", "/logout", "/help", "/api/livechat", "/api/jobs", "/widget"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            platform_db: default_platform_db(),
            session_cookie: default_session_cookie(),
            public_prefixes: default_public_prefixes(),
        }
    }
}

/// Retrieval presets per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default)]
    pub livechat: RetrievalConfig,
    /// Fields missing from `[retrieval.ticket_reply]` keep the ticket-reply preset.
    #[serde(default = "RetrievalConfig::ticket_reply", deserialize_with = "ticket_reply_preset")]
    pub ticket_reply: RetrievalConfig,
}

fn ticket_reply_preset<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<RetrievalConfig, D::Error> {
    use serde::de::Error;
    let overrides = toml::Table::deserialize(d)?;
    let toml::Value::Table(mut merged) = toml::Value::try_from(RetrievalConfig::ticket_reply()).map_err(D::Error::custom)?
    else {
        return Err(D::Error::custom("ticket_reply preset is not a table"));
    };
    merged.extend(overrides);
    toml::Value::Table(merged).try_into().map_err(D::Error::custom)
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            livechat: RetrievalConfig::default(),
            ticket_reply: RetrievalConfig::ticket_reply(),
        }
    }
}

/// Knowledge splitting, keyword and assembly thresholds.
///
/// Lengths are measured in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Hard upper bound on the assembled context.
    pub budget: usize,
    /// Entries shorter than this are kept whole.
    pub short_doc_threshold: usize,
    /// A structural strategy must produce more sections than this.
    pub min_sections: usize,
    /// Sections shorter than this (trimmed) do not count toward `min_sections`.
    pub min_section_len: usize,
    /// Sections shorter than this are merged into a neighbour.
    pub merge_below: usize,
    /// Target size of paragraph groups in the unstructured fallback.
    pub fallback_chunk_size: usize,
    /// No section is ever longer than this.
    pub hard_cap: usize,
    /// Leading characters of a chunk treated as its heading.
    pub heading_window: usize,
    pub heading_weight: u32,
    pub body_weight: u32,
    /// Length of the per-entry "table of contents" filler chunk.
    pub toc_len: usize,
    /// Minimum remaining budget for appending a truncated chunk.
    pub min_truncate_room: usize,
    /// Assemblies shorter than this fall back to entry openings.
    pub degenerate_len: usize,
    /// Per-entry opening length used by the unfiltered fallback.
    pub opening_len: usize,
    pub min_keyword_len: usize,
    pub max_keywords: usize,
    /// Terms present in nearly every question (brand/product names, greetings).
    pub noise_terms: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            budget: 18_000,
            short_doc_threshold: 1_500,
            min_sections: 3,
            min_section_len: 30,
            merge_below: 120,
            fallback_chunk_size: 1_500,
            hard_cap: 3_500,
            heading_window: 150,
            heading_weight: 3,
            body_weight: 1,
            toc_len: 400,
            min_truncate_room: 500,
            degenerate_len: 100,
            opening_len: 1_500,
            min_keyword_len: 3,
            max_keywords: 20,
            noise_terms: ["bonjour", "hello", "merci", "thanks", "please", "svp", "stp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetrievalConfig {
    /// Livechat grounding preset (the default).
    pub fn livechat() -> Self {
        Self::default()
    }

    /// Ticket-reply suggestion preset: smaller budget, finer splitting.
    pub fn ticket_reply() -> Self {
        Self {
            budget: 6_000,
            short_doc_threshold: 600,
            fallback_chunk_size: 1_200,
            hard_cap: 3_000,
            toc_len: 300,
            opening_len: 800,
            ..Self::default()
        }
    }
}

/// FAQ short-circuit weights and confidence thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    pub enabled: bool,
    pub title_weight: u32,
    pub excerpt_weight: u32,
    pub body_weight: u32,
    /// Minimum total score for a canned reply.
    pub min_score: u32,
    /// Minimum distinct keywords found in the title for a canned reply.
    pub min_title_hits: usize,
    /// Character budget of the FAQ context handed to the model.
    pub context_budget: usize,
    pub max_context_articles: usize,
    /// Cap on the canned reply length when built from the article body.
    pub answer_len: usize,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title_weight: 5,
            excerpt_weight: 2,
            body_weight: 1,
            min_score: 10,
            min_title_hits: 2,
            context_budget: 3_000,
            max_context_articles: 5,
            answer_len: 600,
        }
    }
}

/// Language model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Number of past conversation messages sent with each question.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String { "https://api.openai.com/v1".into() }
fn default_model() -> String { "gpt-4o-mini".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 800 }
fn default_history_limit() -> usize { 10 }
fn default_system_prompt() -> String {
    "You are the support assistant of this help desk. Answer only from the provided \
     knowledge and FAQ context. If the answer is not there, say so and offer to \
     connect the visitor with a human agent."
        .into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_limit: default_history_limit(),
            system_prompt: default_system_prompt(),
        }
    }
}
