//! # Helpdesk Knowledge
//!
//! Knowledge retrieval for livechat answers and ticket-reply suggestions.
//! No vector DB, no embeddings: structure heuristics plus keyword overlap.
//!
//! ## Design
//! - **Splitting ladder**: markdown, numbered, bold, symbol headings, then
//!   paragraphs; the first strategy that yields enough real sections wins
//! - **Keyword scoring**: accent-insensitive, heading hits weigh more than body hits
//! - **Hard budget**: the assembled context never exceeds the caller's budget
//! - **Never empty**: with no match, entry openings are used instead
//!
//! ## How it works
//! ```text
//! Visitor: "What are the activation fees?"
//!   ↓
//! extract_keywords → ["activation", "fees"]
//!   ↓
//! split_sections(entry) for every active entry
//!   ↓ score, sort
//! "### Pricing FAQ\n1. Activation fees..." first
//!   ↓
//! Injected into the system prompt as context
//! ```
//!
//! Everything here is pure string processing: no I/O, no failure modes.

pub mod faq;
pub mod keywords;
pub mod retrieval;
pub mod splitter;
pub mod text;

pub use faq::FaqAnswer;
pub use keywords::extract_keywords;
pub use retrieval::{ScoredChunk, build_context};
pub use splitter::{Section, split_sections};
