//! Intent Classifier (§4.3), grounded on
//! `original_source/.../task_classifier.py`'s error-pattern rejection list
//! and "last integer on the last non-empty line" parsing discipline
//! (spec.md §9 calls this brittle but load-bearing — the prompt is
//! engineered around it, so the parse must be preserved exactly).

use std::sync::{Arc, OnceLock};

use regex::Regex;
use rsa_domain::error::Error;
use rsa_domain::task_code::TaskCode;
use rsa_providers::{generate_response, LlmProvider};

use super::billing::BillingMap;

const SYSTEM_PROMPT: &str = "\
You classify a user's message about remote-sensing scientific models \
(snow, soil, vegetation scenarios). Reason briefly, then on the final \
non-empty line output exactly one integer: \
1 = knowledge question, 2 = submit a remote simulation job, \
3 = fetch a prior job's results, -1 = general/unclear.";

/// Run the classifier for one turn: one LLM call, parsed per the rule
/// below. LLM-call exceptions degrade to their mapped upstream task code;
/// an unrecognized error type falls back to the keyword heuristic applied
/// to the user's own message (§4.3 step 4).
pub async fn classify(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    user_message: &str,
    file_summary: &str,
) -> TaskCode {
    billing.track_llm_call(session_id, "task_classification");

    let prompt = if file_summary.is_empty() {
        format!("User message: {user_message}")
    } else {
        format!("User message: {user_message}\nUploaded file summary: {file_summary}")
    };

    match generate_response(provider, SYSTEM_PROMPT, &prompt).await {
        Ok(text) => parse_classification(&text),
        Err(Error::UpstreamTimeout(_)) => TaskCode::UpstreamTimeout,
        Err(Error::UpstreamNetwork(_)) => TaskCode::UpstreamNetwork,
        Err(Error::UpstreamAuth(_)) => TaskCode::UpstreamAuth,
        Err(_) => keyword_heuristic(user_message),
    }
}

/// Parse an LLM response into a classifier verdict: reject on an
/// error-signal pattern, else scan for a trailing signed integer from the
/// last non-empty line backwards, else scan the whole response, else fall
/// back to the keyword heuristic.
pub fn parse_classification(response: &str) -> TaskCode {
    if is_error_signal(response) {
        return TaskCode::GeneralAnswer;
    }

    if let Some(n) = last_integer_reversed_scan(response, &[1, 2, 3, -1]) {
        return TaskCode::from_i32(n).expect("allowed set maps to a valid TaskCode");
    }

    if let Some(n) = any_integer_scan(response, &[1, 2, 3, -1]) {
        return TaskCode::from_i32(n).expect("allowed set maps to a valid TaskCode");
    }

    keyword_heuristic(response)
}

/// Shared with the Knowledge Pipeline's relevance gate (§4.4 step 4), which
/// uses the same last-integer rule over a different allowed set.
pub(crate) fn last_integer_reversed_scan(text: &str, allowed: &[i32]) -> Option<i32> {
    for line in text.lines().rev() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(n) = trailing_integer(line) {
            if allowed.contains(&n) {
                return Some(n);
            }
        }
    }
    None
}

pub(crate) fn any_integer_scan(text: &str, allowed: &[i32]) -> Option<i32> {
    static ANY_INT: OnceLock<Regex> = OnceLock::new();
    let re = ANY_INT.get_or_init(|| Regex::new(r"-?\d+").unwrap());
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .find(|n| allowed.contains(n))
}

fn trailing_integer(line: &str) -> Option<i32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(-?\d+)\s*$").unwrap());
    re.captures(line.trim_end())?.get(1)?.as_str().parse().ok()
}

/// Reject responses that carry an upstream error signal rather than a
/// classification (spec.md §4.3 step 4 / S4): explicit marker strings, or
/// a bare HTTP status code appearing in an error-ish context.
fn is_error_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.contains("accountoverdueerror") || lower.contains("forbidden") {
        return true;
    }

    static ERROR_CODE: OnceLock<Regex> = OnceLock::new();
    let error_code = ERROR_CODE.get_or_init(|| Regex::new(r"(?i)error code:\s*\d+").unwrap());
    if error_code.is_match(text) {
        return true;
    }

    for code in ["401", "403", "429", "500"] {
        if let Some(pos) = lower.find(code) {
            let window_start = pos.saturating_sub(40);
            let window = &lower[window_start..(pos + code.len()).min(lower.len())];
            if window.contains("error") || window.contains("status") || window.contains("http") || window.contains("exception") {
                return true;
            }
        }
    }
    false
}

/// English keyword fallback, applied when no LLM classification is usable
/// (§4.3 step 5). Checked in the order the rule is documented in — a
/// message matching more than one bucket takes the first.
fn keyword_heuristic(text: &str) -> TaskCode {
    let lower = text.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&["what", "how", "why", "explain", "define"]) {
        TaskCode::Knowledge
    } else if has_any(&["build", "generate", "model", "submit"]) {
        TaskCode::SubmitJob
    } else if has_any(&["retrieve", "result", "visualize", "previous"])
        && has_any(&["earlier", "history", "task"])
    {
        TaskCode::FetchJobResult
    } else {
        TaskCode::Knowledge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_integer_on_last_line_wins() {
        assert_eq!(parse_classification("reasoning...\nmore reasoning\n2"), TaskCode::SubmitJob);
    }

    #[test]
    fn blank_lines_are_skipped_scanning_backwards() {
        assert_eq!(parse_classification("answer: 3\n\n\n"), TaskCode::FetchJobResult);
    }

    #[test]
    fn whole_response_scan_is_a_fallback() {
        // No trailing integer on the last line, but a lone valid code
        // appears earlier in the text.
        assert_eq!(parse_classification("I think the answer is 1 overall, thanks"), TaskCode::Knowledge);
    }

    #[test]
    fn error_signal_text_never_routes_to_a_handler() {
        assert_eq!(
            parse_classification("Error code: 403 - {'error': {'code': 'AccountOverdueError'}}"),
            TaskCode::GeneralAnswer
        );
    }

    #[test]
    fn keyword_heuristic_orders_knowledge_before_submit() {
        assert_eq!(keyword_heuristic("what model should I build?"), TaskCode::Knowledge);
    }

    #[test]
    fn keyword_heuristic_requires_both_terms_for_retrieval() {
        assert_eq!(keyword_heuristic("retrieve the result please"), TaskCode::Knowledge);
        assert_eq!(keyword_heuristic("retrieve the result of my earlier task"), TaskCode::FetchJobResult);
    }

    #[test]
    fn keyword_heuristic_defaults_to_knowledge() {
        assert_eq!(keyword_heuristic("hello there"), TaskCode::Knowledge);
    }

    #[test]
    fn classifier_parse_is_idempotent() {
        let text = "some reasoning\n2";
        assert_eq!(parse_classification(text), parse_classification(text));
    }
}
