//! FAQ short-circuit over published help-center articles.
//!
//! When a question clearly matches an article title, the visitor gets the
//! article's answer directly and the LLM is never called.

use crate::keywords::normalize;
use crate::text::{char_len, truncate_chars};
use helpdesk_core::config::FaqConfig;
use helpdesk_core::types::Article;
use serde::Serialize;

/// A canned answer taken from an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaqAnswer {
    pub article_id: String,
    pub title: String,
    pub slug: String,
    pub answer: String,
    pub score: u32,
}

#[derive(Debug, Clone, Copy)]
struct ArticleScore {
    score: u32,
    title_hits: usize,
}

fn score_article(article: &Article, keywords: &[String], cfg: &FaqConfig) -> ArticleScore {
    let title = normalize(&article.title);
    let excerpt = normalize(&article.excerpt);
    let body = normalize(&article.body);
    let hits = |field: &str| keywords.iter().filter(|k| field.contains(k.as_str())).count() as u32;

    let title_hits = hits(&title);
    ArticleScore {
        score: title_hits * cfg.title_weight + hits(&excerpt) * cfg.excerpt_weight + hits(&body) * cfg.body_weight,
        title_hits: title_hits as usize,
    }
}

fn answer_text(article: &Article, cfg: &FaqConfig) -> String {
    let excerpt = article.excerpt.trim();
    if excerpt.is_empty() {
        truncate_chars(article.body.trim(), cfg.answer_len).trim_end().to_string()
    } else {
        excerpt.to_string()
    }
}

/// Published articles with a positive score, best first.
fn ranked<'a>(articles: &'a [Article], keywords: &[String], cfg: &FaqConfig) -> Vec<(&'a Article, ArticleScore)> {
    let mut scored: Vec<_> = articles
        .iter()
        .filter(|a| a.published)
        .map(|a| (a, score_article(a, keywords, cfg)))
        .filter(|(_, s)| s.score > 0)
        .collect();
    scored.sort_by(|a, b| b.1.score.cmp(&a.1.score));
    scored
}

/// The best article, if it clears both confidence thresholds.
pub fn find_answer(articles: &[Article], keywords: &[String], cfg: &FaqConfig) -> Option<FaqAnswer> {
    if !cfg.enabled || keywords.is_empty() {
        return None;
    }
    let (article, s) = ranked(articles, keywords, cfg).into_iter().next()?;
    if s.score < cfg.min_score || s.title_hits < cfg.min_title_hits {
        tracing::debug!("FAQ best match '{}' below threshold (score {}, title hits {})", article.title, s.score, s.title_hits);
        return None;
    }
    let answer = answer_text(article, cfg);
    if answer.is_empty() {
        return None;
    }
    Some(FaqAnswer {
        article_id: article.id.clone(),
        title: article.title.clone(),
        slug: article.slug.clone(),
        answer,
        score: s.score,
    })
}

/// Top matching articles as Q/A pairs for the prompt, within `context_budget` chars.
pub fn faq_context(articles: &[Article], keywords: &[String], cfg: &FaqConfig) -> String {
    let mut out = String::new();
    let mut used = 0;
    for (article, _) in ranked(articles, keywords, cfg).into_iter().take(cfg.max_context_articles) {
        let block = format!("Q: {}\nA: {}\n\n", article.title.trim(), answer_text(article, cfg));
        let len = char_len(&block);
        if used + len > cfg.context_budget {
            break;
        }
        out.push_str(&block);
        used += len;
    }
    out.trim_end().to_string()
}
