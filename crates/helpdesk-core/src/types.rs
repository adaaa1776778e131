//! Domain records shared across crates.

use serde::{Deserialize, Serialize};

/// How a knowledge entry was contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource {
    /// Pasted text.
    #[default]
    Text,
    /// Scraped web page.
    Url,
    /// Uploaded document transcript.
    File,
    /// Image transcript.
    Image,
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeSource::Text => "text",
            KnowledgeSource::Url => "url",
            KnowledgeSource::File => "file",
            KnowledgeSource::Image => "image",
        }
    }

    /// Parse a stored value; unknown values fall back to `Text`.
    pub fn parse(s: &str) -> Self {
        match s {
            "url" => KnowledgeSource::Url,
            "file" => KnowledgeSource::File,
            "image" => KnowledgeSource::Image,
            _ => KnowledgeSource::Text,
        }
    }
}

impl std::fmt::Display for KnowledgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff-contributed document used to ground livechat answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: KnowledgeSource,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeEntry {
    /// Build an unsaved entry, mostly useful for retrieval tests and previews.
    pub fn draft(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            content: content.into(),
            source: KnowledgeSource::Text,
            active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

/// A help-center article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub body: String,
    pub published: bool,
    pub created_at: String,
}

/// Chat message role (OpenAI wire names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A message sent to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A stored livechat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}
