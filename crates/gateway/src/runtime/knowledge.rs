//! Knowledge Pipeline (§4.4): keyword extraction, RAG retrieval, a
//! relevance gate, answer composition, and deduplicated source listing.

use std::sync::Arc;

use regex::Regex;
use rsa_domain::abort::AbortToken;
use rsa_domain::chat_session::ChatMessage;
use rsa_domain::error::{Error, Result};
use rsa_domain::keyword::{Keyword, KeywordSet};
use rsa_domain::progress::{ProgressEvent, ProgressStage};
use rsa_providers::{generate_response, LlmProvider, RagClient, RagSnippet};

use super::billing::BillingMap;
use super::classifier::last_integer_reversed_scan;
use super::progress::ProgressHub;

const KEYWORD_SYSTEM_PROMPT: &str = "\
Extract the key technical terms from the question as a list of \
(keyword, weight) pairs, weights roughly summing to 1.0. Reply with only \
the list, e.g. [(\"snow\", 0.6), (\"backscatter\", 0.4)].";

const VALIDATE_SYSTEM_PROMPT: &str = "\
Judge whether the retrieved context is relevant to the question. Reason \
briefly, then on the final line output exactly 0 (relevant) or -1 \
(irrelevant).";

const COMPOSE_SYSTEM_PROMPT: &str = "\
Answer the user's remote-sensing question using the retrieved context and \
conversation history. Be concise and technically precise.";

const FALLBACK_SYSTEM_PROMPT: &str = "\
No relevant retrieved material was found. Answer from general knowledge \
about remote-sensing science and say so plainly.";

const FALLBACK_KEYWORD_TABLE: &[(&str, &str)] = &[
    ("snow", "snow"),
    ("soil", "soil"),
    ("vegetation", "vegetation"),
    ("veg", "vegetation"),
    ("backscatter", "backscatter"),
    ("brightness temperature", "brightness temperature"),
    ("remote sensing", "remote sensing"),
    ("microwave", "microwave"),
    ("scattering", "scattering"),
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceRef {
    pub source: String,
    pub file_id: Option<String>,
    pub similarity: f32,
    pub previewable: bool,
}

pub struct KnowledgeAnswer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Run the full six-stage pipeline for one question.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    provider: &Arc<dyn LlmProvider>,
    rag: Option<&Arc<dyn RagClient>>,
    billing: &BillingMap,
    progress: &ProgressHub,
    abort: &AbortToken,
    session_id: &str,
    question: &str,
    history: &[ChatMessage],
    top_k: usize,
) -> Result<KnowledgeAnswer> {
    let keywords = extract_keywords(provider, billing, progress, session_id, question).await;
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    let snippets = match rag {
        Some(client) if !keywords.is_empty() => client.retrieve(&keywords, top_k).await.unwrap_or_default(),
        _ => Vec::new(),
    };
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    if snippets.is_empty() {
        return fallback_answer(provider, billing, progress, session_id, question, history).await;
    }

    let context = render_context(&snippets);

    billing.track_llm_call(session_id, "relevance_validation");
    progress.publish(ProgressEvent::new(session_id, "validating retrieved context", ProgressStage::LlmCall));
    let validate_prompt = format!(
        "Question: {question}\n\nRetrieved context:\n{context}\n\nIs this context relevant?"
    );
    let verdict = match generate_response(provider, VALIDATE_SYSTEM_PROMPT, &validate_prompt).await {
        Ok(text) => last_integer_reversed_scan(&text, &[0, -1]).unwrap_or(-1),
        Err(_) => -1,
    };
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    if verdict != 0 {
        return fallback_answer(provider, billing, progress, session_id, question, history).await;
    }

    billing.track_llm_call(session_id, "answer_composition");
    progress.publish(ProgressEvent::new(session_id, "composing answer", ProgressStage::LlmCall));
    let history_text = render_history(history);
    let compose_prompt = format!(
        "Question: {question}\n\nRetrieved context:\n{context}\n\nConversation history:\n{history_text}"
    );
    let text = generate_response(provider, COMPOSE_SYSTEM_PROMPT, &compose_prompt).await?;

    Ok(KnowledgeAnswer {
        text,
        sources: build_sources(&snippets),
    })
}

async fn extract_keywords(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    progress: &ProgressHub,
    session_id: &str,
    question: &str,
) -> KeywordSet {
    billing.track_llm_call(session_id, "keyword_extraction");
    progress.publish(ProgressEvent::new(session_id, "extracting keywords", ProgressStage::LlmCall));
    let prompt = format!("Question: {question}");
    let keywords = match generate_response(provider, KEYWORD_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => parse_keyword_pairs(&text).unwrap_or_else(|| fallback_keywords(question)),
        Err(_) => fallback_keywords(question),
    };
    KeywordSet::new(keywords)
}

fn parse_keyword_pairs(text: &str) -> Option<Vec<Keyword>> {
    let re = Regex::new(r#"\(\s*['"]?([^'",()]+?)['"]?\s*,\s*([0-9]*\.?[0-9]+)\s*\)"#).ok()?;
    let mut out = Vec::new();
    for cap in re.captures_iter(text) {
        let kw = cap[1].trim();
        if kw.is_empty() {
            continue;
        }
        if let Ok(weight) = cap[2].parse::<f64>() {
            out.push(Keyword { keyword: kw.to_string(), weight });
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn fallback_keywords(text: &str) -> Vec<Keyword> {
    let lower = text.to_lowercase();
    FALLBACK_KEYWORD_TABLE
        .iter()
        .filter(|(term, _)| lower.contains(term))
        .map(|(_, canonical)| Keyword { keyword: canonical.to_string(), weight: 1.0 })
        .collect()
}

async fn fallback_answer(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    progress: &ProgressHub,
    session_id: &str,
    question: &str,
    history: &[ChatMessage],
) -> Result<KnowledgeAnswer> {
    billing.track_llm_call(session_id, "general_knowledge_fallback");
    progress.publish(ProgressEvent::new(session_id, "answering from general knowledge", ProgressStage::LlmCall));
    let history_text = render_history(history);
    let prompt = format!("Question: {question}\n\nConversation history:\n{history_text}");
    let text = generate_response(provider, FALLBACK_SYSTEM_PROMPT, &prompt).await?;
    Ok(KnowledgeAnswer {
        text: format!(
            "No matching material was found in the knowledge base; answering from general knowledge.\n\n{text}"
        ),
        sources: Vec::new(),
    })
}

fn render_context(snippets: &[RagSnippet]) -> String {
    snippets.iter().map(|s| s.content.as_str()).collect::<Vec<_>>().join("\n---\n")
}

fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_sources(snippets: &[RagSnippet]) -> Vec<SourceRef> {
    let mut sorted = snippets.to_vec();
    sorted.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for s in sorted {
        let key = s.file_id.clone().unwrap_or_else(|| s.source.clone());
        if !seen.insert(key) {
            continue;
        }
        out.push(SourceRef {
            previewable: is_previewable(&s.source),
            source: s.source,
            file_id: s.file_id,
            similarity: s.similarity,
        });
    }
    out
}

fn is_previewable(source: &str) -> bool {
    let ext = source.rsplit('.').next().unwrap_or("").to_lowercase();
    matches!(ext.as_str(), "pdf" | "png" | "jpg" | "jpeg" | "txt" | "md" | "csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_pairs_parse_from_llm_style_output() {
        let parsed = parse_keyword_pairs(r#"[("snow", 0.6), ("backscatter", 0.4)]"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].keyword, "snow");
        assert!((parsed[0].weight - 0.6).abs() < 1e-9);
    }

    #[test]
    fn fallback_keywords_match_known_terms() {
        let kws = fallback_keywords("What does backscatter tell us about snow depth?");
        let terms: Vec<&str> = kws.iter().map(|k| k.keyword.as_str()).collect();
        assert!(terms.contains(&"backscatter"));
        assert!(terms.contains(&"snow"));
    }

    #[test]
    fn sources_are_deduplicated_and_sorted_by_similarity() {
        let snippets = vec![
            RagSnippet { content: "a".into(), source: "doc.pdf".into(), similarity: 0.4, file_id: Some("f1".into()) },
            RagSnippet { content: "b".into(), source: "doc.pdf".into(), similarity: 0.9, file_id: Some("f1".into()) },
            RagSnippet { content: "c".into(), source: "other.csv".into(), similarity: 0.7, file_id: None },
        ];
        let sources = build_sources(&snippets);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, "doc.pdf");
        assert!((sources[0].similarity - 0.9).abs() < 1e-6);
        assert!(sources[0].previewable);
    }
}
