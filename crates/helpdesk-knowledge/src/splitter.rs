//! Structural section splitting.
//!
//! Knowledge entries arrive as hand-written FAQs, scraped pages and pasted
//! docs with no guaranteed structure. Each strategy below is a pure
//! `&str -> Vec<Section>` parser; [`split_sections`] walks them in priority
//! order and keeps the first whose output has enough substantial sections.
//!
//! Sections are always contiguous slices of the input: concatenating them in
//! order gives back the original content (short documents excepted, which
//! come back trimmed).

use crate::text::{char_len, window_end};
use helpdesk_core::config::RetrievalConfig;
use regex::Regex;
use std::sync::LazyLock;

/// A contiguous slice of an entry's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// Byte offset of `text` inside the entry content.
    pub start: usize,
    pub text: &'a str,
}

impl<'a> Section<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    fn span(content: &'a str, start: usize, end: usize) -> Self {
        Self { start, text: &content[start..end] }
    }
}

/// A candidate parser.
pub type Strategy = for<'a> fn(&'a str) -> Vec<Section<'a>>;

/// Strategies in priority order.
pub const LADDER: &[(&str, Strategy)] = &[
    ("markdown_headings", markdown_headings),
    ("numbered_items", numbered_items),
    ("bold_headings", bold_headings),
    ("symbol_headings", symbol_headings),
    ("paragraphs", paragraphs),
];

static MARKDOWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,4}[ \t]+\S").expect("markdown heading regex"));

// Leading NBSP / zero-width chars are common in text pasted from editors.
static NUMBERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t\x{00A0}\x{200B}-\x{200D}\x{FEFF}]*\d{1,3}[.)][ \t]+\S")
        .expect("numbered item regex")
});

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\*\*[^*\n]+\*\*").expect("bold heading regex"));

static SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[■▪▶►➤●◆★✦]|\p{Lu}[\p{Lu}\d \t'&/,:()\-]{3,}\r?$)")
        .expect("symbol heading regex")
});

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\r?\n)+").expect("blank line regex"));

/// Slice `content` at each cut offset.
fn slices_at<'a>(content: &'a str, cuts: impl IntoIterator<Item = usize>) -> Vec<Section<'a>> {
    let mut sections = Vec::new();
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            sections.push(Section::span(content, start, cut));
            start = cut;
        }
    }
    if start < content.len() {
        sections.push(Section::span(content, start, content.len()));
    }
    sections
}

fn split_before<'a>(content: &'a str, re: &Regex) -> Vec<Section<'a>> {
    slices_at(content, re.find_iter(content).map(|m| m.start()))
}

/// `# Title` .. `#### Title`.
pub fn markdown_headings(content: &str) -> Vec<Section<'_>> {
    split_before(content, &MARKDOWN)
}

/// `1. Title`, `20) Title`.
pub fn numbered_items(content: &str) -> Vec<Section<'_>> {
    split_before(content, &NUMBERED)
}

/// `**Title**` at the start of a line.
pub fn bold_headings(content: &str) -> Vec<Section<'_>> {
    split_before(content, &BOLD)
}

/// `■ Title`, `► Title`, or an all-uppercase line.
pub fn symbol_headings(content: &str) -> Vec<Section<'_>> {
    split_before(content, &SYMBOL)
}

/// Blank-line delimited paragraphs; separators stay with the preceding paragraph.
pub fn paragraphs(content: &str) -> Vec<Section<'_>> {
    slices_at(content, BLANK_LINES.find_iter(content).map(|m| m.end()))
}

fn is_accepted(sections: &[Section<'_>], cfg: &RetrievalConfig) -> bool {
    sections
        .iter()
        .filter(|s| char_len(s.text.trim()) >= cfg.min_section_len)
        .count()
        > cfg.min_sections
}

/// Run the ladder and return the first accepted strategy's output.
pub fn first_accepted<'a>(
    content: &'a str,
    ladder: &[(&'static str, Strategy)],
    cfg: &RetrievalConfig,
) -> Option<(&'static str, Vec<Section<'a>>)> {
    ladder.iter().find_map(|(name, strategy)| {
        let sections = strategy(content);
        is_accepted(&sections, cfg).then_some((*name, sections))
    })
}

/// Fold sections shorter than `merge_below` into their successor
/// (or, for a trailing one, into its predecessor).
pub fn merge_small<'a>(content: &'a str, sections: Vec<Section<'a>>, merge_below: usize) -> Vec<Section<'a>> {
    let mut merged: Vec<Section<'a>> = Vec::with_capacity(sections.len());
    for section in sections {
        if let Some(last) = merged.last_mut()
            && char_len(last.text.trim()) < merge_below
        {
            *last = Section::span(content, last.start, section.end());
            continue;
        }
        merged.push(section);
    }
    if merged.len() > 1
        && merged.last().is_some_and(|s| char_len(s.text.trim()) < merge_below)
        && let Some(tail) = merged.pop()
        && let Some(prev) = merged.last_mut()
    {
        *prev = Section::span(content, prev.start, tail.end());
    }
    merged
}

/// Greedy paragraph grouping up to `fallback_chunk_size` chars.
pub fn fallback_chunks<'a>(content: &'a str, cfg: &RetrievalConfig) -> Vec<Section<'a>> {
    let mut chunks = Vec::new();
    let mut current: Option<(Section<'a>, usize)> = None;
    for para in paragraphs(content) {
        let len = char_len(para.text);
        current = match current {
            None => Some((para, len)),
            Some((cur, cur_len)) if cur_len + len <= cfg.fallback_chunk_size => {
                Some((Section::span(content, cur.start, para.end()), cur_len + len))
            }
            Some((cur, _)) => {
                chunks.push(cur);
                Some((para, len))
            }
        };
    }
    chunks.extend(current.map(|(s, _)| s));
    chunks
}

/// Cut every section longer than `hard_cap` chars into whitespace-aligned windows.
pub fn cap_sections<'a>(content: &'a str, sections: Vec<Section<'a>>, hard_cap: usize) -> Vec<Section<'a>> {
    let mut out = Vec::with_capacity(sections.len());
    for section in sections {
        if char_len(section.text) <= hard_cap {
            out.push(section);
            continue;
        }
        let mut start = section.start;
        while start < section.end() {
            let cut = window_end(&content[start..section.end()], hard_cap.max(1));
            out.push(Section::span(content, start, start + cut));
            start += cut;
        }
    }
    out
}

/// Split one knowledge entry into scoring units.
pub fn split_sections<'a>(content: &'a str, cfg: &RetrievalConfig) -> Vec<Section<'a>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let total = char_len(content);
    if total < cfg.short_doc_threshold {
        let start = content.len() - content.trim_start().len();
        return vec![Section { start, text: trimmed }];
    }

    let sections = match first_accepted(content, LADDER, cfg) {
        Some((name, sections)) => {
            let sections = merge_small(content, sections, cfg.merge_below);
            tracing::debug!("✂️ Split {total} chars via {name} into {} sections", sections.len());
            sections
        }
        None => {
            let chunks = fallback_chunks(content, cfg);
            tracing::debug!("✂️ No structure in {total} chars, {} fallback chunks", chunks.len());
            chunks
        }
    };
    cap_sections(content, sections, cfg.hard_cap)
}
