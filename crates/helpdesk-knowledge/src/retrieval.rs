//! Relevance scoring and budgeted context assembly.

use crate::keywords::{extract_keywords, normalize};
use crate::splitter::split_sections;
use crate::text::{char_len, truncate_chars};
use helpdesk_core::config::RetrievalConfig;
use helpdesk_core::types::KnowledgeEntry;
use std::collections::HashSet;

/// A scored candidate chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredChunk<'a> {
    /// Index into the entries slice passed to [`rank_chunks`].
    pub entry: usize,
    pub title: &'a str,
    /// Byte offset inside the entry content.
    pub start: usize,
    pub text: &'a str,
    pub score: u32,
}

impl ScoredChunk<'_> {
    fn render(&self) -> String {
        render_block(self.title, self.text)
    }
}

fn render_block(title: &str, text: &str) -> String {
    format!("### {}\n{}\n\n", title.trim(), text.trim())
}

/// Keyword score of a chunk. A keyword found within the heading window
/// (title plus opening text) earns `heading_weight`, else `body_weight`
/// if it appears further down.
pub fn score_chunk(title: &str, text: &str, keywords: &[String], cfg: &RetrievalConfig) -> u32 {
    if keywords.is_empty() {
        return 0;
    }
    let haystack = normalize(&format!("{title}\n{text}"));
    let head = truncate_chars(&haystack, cfg.heading_window);
    let body = &haystack[head.len()..];
    keywords
        .iter()
        .map(|kw| {
            if head.contains(kw.as_str()) {
                cfg.heading_weight
            } else if body.contains(kw.as_str()) {
                cfg.body_weight
            } else {
                0
            }
        })
        .sum()
}

/// All candidate chunks for `keywords`, best first.
///
/// Candidates are the matching sections of every active entry plus one
/// zero-score opening slice per entry, so no entry is entirely invisible.
/// Ties keep entry then section order.
pub fn rank_chunks<'a>(
    entries: &'a [KnowledgeEntry],
    keywords: &[String],
    cfg: &RetrievalConfig,
) -> Vec<ScoredChunk<'a>> {
    let mut chunks = Vec::new();
    for (idx, entry) in entries.iter().enumerate().filter(|(_, e)| e.active) {
        let mut seen = HashSet::new();
        for section in split_sections(&entry.content, cfg) {
            let score = score_chunk(&entry.title, section.text, keywords, cfg);
            if score > 0 {
                seen.insert(section.start);
                chunks.push(ScoredChunk {
                    entry: idx,
                    title: &entry.title,
                    start: section.start,
                    text: section.text,
                    score,
                });
            }
        }

        let opening = entry.content.trim_start();
        let start = entry.content.len() - opening.len();
        let toc = truncate_chars(opening, cfg.toc_len).trim_end();
        if !toc.is_empty() && !seen.contains(&start) {
            chunks.push(ScoredChunk { entry: idx, title: &entry.title, start, text: toc, score: 0 });
        }
    }
    chunks.sort_by(|a, b| b.score.cmp(&a.score));
    chunks
}

/// Greedy fill; a relevant chunk that overflows is truncated into the
/// remaining room when enough of it would survive.
fn assemble(chunks: &[ScoredChunk<'_>], cfg: &RetrievalConfig) -> String {
    let mut out = String::new();
    let mut used = 0;
    for chunk in chunks {
        let block = chunk.render();
        let len = char_len(&block);
        if used + len <= cfg.budget {
            out.push_str(&block);
            used += len;
            continue;
        }
        let room = cfg.budget - used;
        if chunk.score > 0 && room >= cfg.min_truncate_room {
            out.push_str(truncate_chars(&block, room));
        }
        break;
    }
    out
}

/// Opening of every active entry, in order, up to the budget.
fn openings(entries: &[KnowledgeEntry], cfg: &RetrievalConfig) -> String {
    let mut out = String::new();
    let mut used = 0;
    for entry in entries.iter().filter(|e| e.active) {
        if entry.title.trim().is_empty() && entry.content.trim().is_empty() {
            continue;
        }
        let block = render_block(&entry.title, truncate_chars(entry.content.trim(), cfg.opening_len));
        let len = char_len(&block);
        if used + len > cfg.budget {
            out.push_str(truncate_chars(&block, cfg.budget - used));
            break;
        }
        out.push_str(&block);
        used += len;
    }
    out
}

/// Compose the knowledge context for `question`, at most `cfg.budget` chars.
///
/// Deterministic, never fails. Empty only when no active entry has any text.
pub fn build_context(entries: &[KnowledgeEntry], question: &str, cfg: &RetrievalConfig) -> String {
    let keywords = extract_keywords(question, cfg);
    let mut context = if keywords.is_empty() {
        String::new()
    } else {
        assemble(&rank_chunks(entries, &keywords, cfg), cfg)
    };

    if char_len(context.trim()) < cfg.degenerate_len {
        tracing::debug!("📚 No usable keyword match for {keywords:?}, using entry openings");
        context = openings(entries, cfg);
    }

    truncate_chars(context.trim_end(), cfg.budget).to_string()
}
