//! Remote-Job Workflow (§4.5): submission (task code 2) and retrieval
//! (task code 3), grounded on `original_source/.../rshub_components.py`,
//! `rshub_task_extractor.py`, and `rshub_workflow.py`.
//!
//! Per spec.md §9, the original's "evaluate LLM-emitted code" step is
//! replaced with a structured parameter DSL: the LLM emits JSON, the core
//! validates it against [`rsa_domain::remote_job::extract_data_dicts`], and
//! a schema-error response drives the same "ask the LLM to correct"
//! retry loop the original used for code exceptions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use rsa_domain::abort::AbortToken;
use rsa_domain::chat_session::{ChatMessage, ChatRole};
use rsa_domain::config::RemoteJobConfig;
use rsa_domain::error::{Error, Result};
use rsa_domain::progress::{ProgressEvent, ProgressStage};
use rsa_domain::remote_job::{
    extract_data_dicts, inject_system_fields, classify_poll_response, JobTask, ObservationMode,
    PollOutcome, RemoteJobRun, Scenario, TaskDescriptor, REQUIRED_SYSTEM_FIELDS, SUBMIT_SUCCESS_MARKER,
};
use rsa_providers::{generate_response, LlmProvider, RemoteJobClient};

use super::billing::BillingMap;
use super::progress::ProgressHub;

const SCENARIO_SYSTEM_PROMPT: &str = "\
Classify which remote-sensing scenario the user is describing. Reason \
briefly, then on the final line output exactly one word: snow, soil, or \
vegetation.";

const MODEL_SELECTION_SYSTEM_PROMPT: &str = "\
Choose which scattering model to run for this scenario. Reply with just \
the model key on the final line.";

const MODE_SELECTION_SYSTEM_PROMPT: &str = "\
Decide which observation mode(s) the snow simulation needs. Reply with \
just 'active', 'passive', or 'both' on the final line.";

const PARAMETER_SYSTEM_PROMPT: &str = "\
Generate simulation parameters as JSON: {\"data_dicts\": [{...}, ...]}, one \
object per task, using only the scenario's physical parameters (never the \
system fields — those are injected separately). Emit only the JSON, \
optionally inside a ```json fenced block.";

const CANDIDATE_SELECTOR_SYSTEM_PROMPT: &str = "\
Pick which prior submission the user is asking about. The scenario implied \
by the user's message must match the candidate's scenario exactly — never \
cross scenarios. Reply with the exact project_name on the final line, or \
NOT_FOUND if none match.";

const SUMMARY_SYSTEM_PROMPT: &str = "\
Write a short, plain-language completion summary for the user describing \
what was run and with which parameters.";

const MAX_CODE_RETRIES: u32 = 2;

pub struct SubmissionResult {
    pub response_text: String,
}

/// §4.5.1: classify scenario, select model/modes, generate + validate
/// parameters against the DSL schema, construct tasks, submit with an
/// LLM-guided retry loop (max 2 retries).
#[allow(clippy::too_many_arguments)]
pub async fn submit(
    provider: &Arc<dyn LlmProvider>,
    remote_job: &Arc<dyn RemoteJobClient>,
    billing: &BillingMap,
    progress: &ProgressHub,
    abort: &AbortToken,
    session_id: &str,
    token: &str,
    user_message: &str,
    file_contents: &str,
    config: &RemoteJobConfig,
) -> Result<SubmissionResult> {
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    progress.publish(ProgressEvent::new(session_id, "classifying scenario", ProgressStage::Processing));
    let scenario = classify_scenario(provider, billing, session_id, user_message).await?;
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    progress.publish(ProgressEvent::new(session_id, "selecting model", ProgressStage::Processing));
    let model = select_model(provider, billing, session_id, scenario, user_message).await?;
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    progress.publish(ProgressEvent::new(session_id, "selecting observation modes", ProgressStage::Processing));
    let modes = select_modes(provider, billing, session_id, scenario, user_message).await?;
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    let timestamp_ms = chrono::Utc::now().timestamp_millis();
    let project_name = RemoteJobRun::project_name(scenario, &model, timestamp_ms);

    progress.publish(ProgressEvent::new(session_id, "generating simulation parameters", ProgressStage::Processing));
    let mut generated = generate_parameter_code(provider, billing, session_id, scenario, user_message, file_contents).await?;
    let mut attempt = 0u32;

    loop {
        if abort.is_aborted() {
            return Err(Error::UserAbort);
        }

        let data_dicts = match extract_data_dicts(&generated, scenario) {
            Ok(dicts) => dicts,
            Err(schema_error) => {
                if attempt >= config.max_retries.min(MAX_CODE_RETRIES) {
                    return Err(Error::HandlerFailure(format!(
                        "parameter generation failed after {attempt} retries: {schema_error}"
                    )));
                }
                attempt += 1;
                progress.publish(ProgressEvent::new(session_id, "correcting generated parameters", ProgressStage::Processing));
                generated = regenerate_parameter_code(
                    provider, billing, session_id, scenario, user_message, file_contents, &generated, &[schema_error],
                )
                .await?;
                continue;
            }
        };

        let (tasks, dicts) = construct_tasks(&data_dicts, scenario, &model, &modes, token, &project_name, config, timestamp_ms);

        let mut submit_errors = Vec::new();
        for (task, dict) in tasks.iter().zip(dicts.iter()) {
            if abort.is_aborted() {
                return Err(Error::UserAbort);
            }
            billing.track_remote_job(session_id, &task.name);
            progress.publish(ProgressEvent::new(session_id, format!("submitting task {}", task.name), ProgressStage::Processing));
            match remote_job.submit(dict).await {
                Ok(text) if text.trim() == SUBMIT_SUCCESS_MARKER => {}
                Ok(text) => submit_errors.push(format!("{}: {text}", task.name)),
                Err(e) => submit_errors.push(format!("{}: {e}", task.name)),
            }
        }

        if submit_errors.is_empty() {
            let descriptor = TaskDescriptor {
                project_name: project_name.clone(),
                scenario_info: scenario.as_str().to_string(),
                model_name: model.clone(),
                observation_modes: modes.iter().map(|m| m.as_str().to_string()).collect(),
                tasks: tasks.clone(),
                data_dicts: dicts.clone(),
            };
            let response_text = format!(
                "Submitted {} task(s) for project {}.\n\n{}",
                tasks.len(),
                project_name,
                descriptor.to_fenced_block()
            );
            return Ok(SubmissionResult { response_text });
        }

        if attempt >= config.max_retries.min(MAX_CODE_RETRIES) {
            return Err(Error::HandlerFailure(format!(
                "submission failed after {attempt} retries: {}",
                submit_errors.join("; ")
            )));
        }
        attempt += 1;
        progress.publish(ProgressEvent::new(session_id, "correcting generated parameters", ProgressStage::Processing));
        generated = regenerate_parameter_code(
            provider, billing, session_id, scenario, user_message, file_contents, &generated, &submit_errors,
        )
        .await?;
    }
}

pub struct RetrievalResult {
    pub summary: String,
    /// `"guidance_provided"` when no prior submission exists for this
    /// session (S3); `"success"` otherwise.
    pub status: &'static str,
}

/// §4.5.2: locate a prior submission in the session's history, poll to
/// completion within the configured wall-clock budget, check per-task
/// errors, and summarize.
pub async fn retrieve(
    provider: &Arc<dyn LlmProvider>,
    remote_job: &Arc<dyn RemoteJobClient>,
    billing: &BillingMap,
    progress: &ProgressHub,
    abort: &AbortToken,
    session_id: &str,
    user_message: &str,
    history: &[ChatMessage],
    config: &RemoteJobConfig,
) -> Result<RetrievalResult> {
    progress.publish(ProgressEvent::new(session_id, "locating prior submission", ProgressStage::Processing));
    let candidates = locate_candidates(history);
    if candidates.is_empty() {
        return Ok(RetrievalResult {
            summary: "No prior task was found in this conversation; please submit a job first.".to_string(),
            status: "guidance_provided",
        });
    }

    let descriptor = select_candidate(provider, billing, session_id, user_message, candidates).await?;
    if abort.is_aborted() {
        return Err(Error::UserAbort);
    }

    progress.publish(ProgressEvent::new(session_id, format!("polling {}", descriptor.project_name), ProgressStage::Processing));
    let outcome = poll_until_done(remote_job, abort, &descriptor.project_name, config).await?;
    match outcome {
        PollOutcome::StillRunning => {
            return Ok(RetrievalResult {
                summary: format!("The job {} is still running; check back shortly.", descriptor.project_name),
                status: "guidance_provided",
            });
        }
        PollOutcome::Failed => {
            return Err(Error::HandlerFailure(format!("remote job {} failed", descriptor.project_name)));
        }
        PollOutcome::Completed => {}
    }

    progress.publish(ProgressEvent::new(session_id, "checking for task errors", ProgressStage::Processing));
    let mut failed_tasks = Vec::new();
    for task in &descriptor.tasks {
        if abort.is_aborted() {
            return Err(Error::UserAbort);
        }
        if let Some(msg) = remote_job.error_message(&task.name).await? {
            failed_tasks.push(format!("{}: {msg}", task.name));
        }
    }
    if !failed_tasks.is_empty() {
        return Err(Error::HandlerFailure(format!(
            "task error(s) for {}: {}",
            descriptor.project_name,
            failed_tasks.join("; ")
        )));
    }

    billing.track_llm_call(session_id, "run_summary");
    progress.publish(ProgressEvent::new(session_id, "composing completion summary", ProgressStage::LlmCall));
    let modified_params = summarize_modified_params(&descriptor);
    let prompt = format!(
        "Project: {}\nScenario: {}\nModel: {}\nModified parameters:\n{modified_params}",
        descriptor.project_name, descriptor.scenario_info, descriptor.model_name
    );
    let summary = generate_response(provider, SUMMARY_SYSTEM_PROMPT, &prompt).await?;

    Ok(RetrievalResult { summary, status: "success" })
}

async fn classify_scenario(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    user_message: &str,
) -> Result<Scenario> {
    billing.track_llm_call(session_id, "scenario_classification");
    let prompt = format!("User request: {user_message}");
    let text = generate_response(provider, SCENARIO_SYSTEM_PROMPT, &prompt).await?;
    let lower = text.to_lowercase();
    let last_line = lower.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    Scenario::from_str(last_line.trim())
        .or_else(|| ["snow", "soil", "vegetation"].iter().find_map(|s| if lower.contains(s) { Scenario::from_str(s) } else { None }))
        .ok_or_else(|| Error::HandlerFailure("could not determine a remote-sensing scenario from the request".into()))
}

async fn select_model(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    scenario: Scenario,
    user_message: &str,
) -> Result<String> {
    let models = scenario.models();
    if models.len() == 1 {
        return Ok(models[0].to_string());
    }

    billing.track_llm_call(session_id, "model_selection");
    let prompt = format!(
        "User request: {user_message}\n\nCandidates: {}. Default to {} if unclear.",
        models.join(", "),
        models[0]
    );
    let text = generate_response(provider, MODEL_SELECTION_SYSTEM_PROMPT, &prompt).await.unwrap_or_default();
    let lower = text.to_lowercase();
    Ok(models.iter().find(|m| lower.contains(**m)).copied().unwrap_or(models[0]).to_string())
}

async fn select_modes(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    scenario: Scenario,
    user_message: &str,
) -> Result<Vec<ObservationMode>> {
    match scenario {
        Scenario::Soil => Ok(vec![ObservationMode::Active, ObservationMode::Passive]),
        Scenario::Vegetation => Ok(vec![ObservationMode::Passive]),
        Scenario::Snow => {
            billing.track_llm_call(session_id, "mode_selection");
            let prompt = format!("User request: {user_message}\n\nDefault to passive if unclear.");
            let text = generate_response(provider, MODE_SELECTION_SYSTEM_PROMPT, &prompt).await.unwrap_or_default();
            let lower = text.to_lowercase();
            if lower.contains("both") {
                Ok(vec![ObservationMode::Active, ObservationMode::Passive])
            } else if lower.contains("active") {
                Ok(vec![ObservationMode::Active])
            } else {
                Ok(vec![ObservationMode::Passive])
            }
        }
    }
}

async fn generate_parameter_code(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    scenario: Scenario,
    user_message: &str,
    file_contents: &str,
) -> Result<Value> {
    billing.track_llm_call(session_id, "parameter_generation");
    let prompt = format!(
        "Scenario: {}\nUser request: {user_message}\nUploaded file contents:\n{file_contents}\n\n{}",
        scenario.as_str(),
        scenario_doc(scenario)
    );
    let text = generate_response(provider, PARAMETER_SYSTEM_PROMPT, &prompt).await?;
    parse_json_object(&text)
}

#[allow(clippy::too_many_arguments)]
async fn regenerate_parameter_code(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    scenario: Scenario,
    user_message: &str,
    file_contents: &str,
    previous: &Value,
    errors: &[String],
) -> Result<Value> {
    billing.track_llm_call(session_id, "parameter_generation_retry");
    let prompt = format!(
        "Scenario: {}\nUser request: {user_message}\nUploaded file contents:\n{file_contents}\n\
         Previous generated parameters:\n{previous}\nErrors:\n{}\n\n\
         Correct the parameters and re-emit the full JSON object.",
        scenario.as_str(),
        errors.join("\n")
    );
    let text = generate_response(provider, PARAMETER_SYSTEM_PROMPT, &prompt).await?;
    parse_json_object(&text)
}

fn scenario_doc(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::Snow => {
            "Emit snow-layer parameters per task: frequency fGHz, snow depth, density, grain size, soil moisture."
        }
        Scenario::Soil => {
            "Emit AIEM soil parameters per task: frequency fGHz, incidence angle, RMS height, correlation length, soil moisture."
        }
        Scenario::Vegetation => {
            "Emit VPRT canopy parameters per task: frequency fGHz, vegetation water content, canopy height, soil moisture."
        }
    }
}

fn parse_json_object(text: &str) -> Result<Value> {
    let fragment = extract_json_fragment(text);
    serde_json::from_str(&fragment).map_err(|e| Error::HandlerFailure(format!("parameter response was not valid JSON: {e}")))
}

fn extract_json_fragment(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return text[start..=end].to_string();
        }
    }
    text.trim().to_string()
}

#[allow(clippy::too_many_arguments)]
fn construct_tasks(
    data_dicts: &[Map<String, Value>],
    scenario: Scenario,
    model: &str,
    modes: &[ObservationMode],
    token: &str,
    project_name: &str,
    config: &RemoteJobConfig,
    timestamp_ms: i64,
) -> (Vec<JobTask>, Vec<Map<String, Value>>) {
    let multi = data_dicts.len() > 1;
    let mut tasks = Vec::with_capacity(data_dicts.len());
    let mut dicts = Vec::with_capacity(data_dicts.len());

    for (i, dict) in data_dicts.iter().enumerate() {
        let mode = if scenario == Scenario::Soil {
            None
        } else {
            modes.get(i % modes.len().max(1)).copied()
        };
        let output_var = match scenario {
            Scenario::Soil => "bs",
            _ => mode.map(|m| m.output_var()).unwrap_or("bs"),
        };
        let name = RemoteJobRun::task_name(scenario, model, mode, if multi { Some(i) } else { None }, timestamp_ms);

        let mut dict = dict.clone();
        inject_system_fields(
            &mut dict,
            token,
            project_name,
            &name,
            scenario,
            model,
            output_var,
            false,
            config.default_core_num,
        );
        tasks.push(JobTask { name: name.clone(), output_var: output_var.to_string() });
        dicts.push(dict);
    }

    (tasks, dicts)
}

fn locate_candidates(history: &[ChatMessage]) -> Vec<TaskDescriptor> {
    let mut out = Vec::new();
    for msg in history {
        if msg.role != ChatRole::Assistant {
            continue;
        }
        for fragment in find_json_fragments(&msg.content) {
            if let Ok(desc) = serde_json::from_str::<TaskDescriptor>(&fragment) {
                out.push(desc);
            }
        }
    }
    out
}

fn find_json_fragments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```json") {
        let after = &rest[start + 7..];
        match after.find("```") {
            Some(end) => {
                out.push(after[..end].trim().to_string());
                rest = &after[end + 3..];
            }
            None => break,
        }
    }
    out
}

async fn select_candidate(
    provider: &Arc<dyn LlmProvider>,
    billing: &BillingMap,
    session_id: &str,
    user_message: &str,
    candidates: Vec<TaskDescriptor>,
) -> Result<TaskDescriptor> {
    if candidates.len() == 1 {
        return Ok(candidates.into_iter().next().unwrap());
    }

    billing.track_llm_call(session_id, "candidate_selection");
    let listing = candidates
        .iter()
        .map(|c| format!("- {} (scenario={}, model={})", c.project_name, c.scenario_info, c.model_name))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!("User request: {user_message}\n\nCandidate prior submissions:\n{listing}");
    let selector_reply = generate_response(provider, CANDIDATE_SELECTOR_SYSTEM_PROMPT, &prompt)
        .await
        .unwrap_or_default();
    let chosen = selector_reply
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string();

    if let Some(exact) = candidates.iter().find(|c| c.project_name == chosen) {
        return Ok(exact.clone());
    }

    let lower = chosen.to_lowercase();
    if !lower.is_empty() && lower != "not_found" {
        if let Some(fuzzy) = candidates.iter().find(|c| {
            c.project_name.to_lowercase().contains(&lower)
                || c.scenario_info.to_lowercase().contains(&lower)
                || c.model_name.to_lowercase().contains(&lower)
        }) {
            return Ok(fuzzy.clone());
        }
    }

    // Scenario-safety fallback (§8 property 7): prefer a candidate whose
    // scenario substring matches one named in the user's own message over
    // blindly picking the most recent submission.
    let user_lower = user_message.to_lowercase();
    if let Some(scenario_match) = candidates.iter().rev().find(|c| user_lower.contains(&c.scenario_info)) {
        return Ok(scenario_match.clone());
    }

    Ok(candidates.into_iter().last().unwrap())
}

async fn poll_until_done(
    remote_job: &Arc<dyn RemoteJobClient>,
    abort: &AbortToken,
    project_name: &str,
    config: &RemoteJobConfig,
) -> Result<PollOutcome> {
    let budget = Duration::from_secs(config.poll_budget_secs);
    let interval = Duration::from_secs(config.poll_interval_secs);
    let deadline = tokio::time::Instant::now() + budget;

    loop {
        if abort.is_aborted() {
            return Err(Error::UserAbort);
        }

        let text = remote_job.poll(project_name).await?;
        match classify_poll_response(&text) {
            PollOutcome::StillRunning => {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(PollOutcome::StillRunning);
                }
                if abort.is_aborted() {
                    return Err(Error::UserAbort);
                }
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                tokio::time::sleep(interval.min(remaining)).await;
            }
            outcome => return Ok(outcome),
        }
    }
}

fn summarize_modified_params(descriptor: &TaskDescriptor) -> String {
    descriptor
        .data_dicts
        .iter()
        .enumerate()
        .map(|(i, dict)| {
            let filtered: Vec<String> = dict
                .iter()
                .filter(|(k, _)| {
                    !REQUIRED_SYSTEM_FIELDS.contains(&k.as_str()) && *k != "force_update_flag" && *k != "core_num"
                })
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("task {}: {}", i + 1, filtered.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn construct_tasks_matches_data_dict_count() {
        let dicts = vec![Map::from_iter([("fGHz".to_string(), json!(10.0))])];
        let config = RemoteJobConfig {
            base_url: None,
            poll_interval_secs: 10,
            poll_budget_secs: 120,
            max_retries: 2,
            default_core_num: 1,
        };
        let (tasks, out_dicts) =
            construct_tasks(&dicts, Scenario::Soil, "aiem", &[ObservationMode::Active, ObservationMode::Passive], "tok", "proj", &config, 1);
        assert_eq!(tasks.len(), 1);
        assert_eq!(out_dicts.len(), 1);
        assert_eq!(out_dicts[0]["output_var"], "bs");
    }

    #[test]
    fn json_fragment_extraction_prefers_fenced_block() {
        let text = "reasoning\n```json\n{\"data_dicts\": []}\n```\nmore text";
        assert_eq!(extract_json_fragment(text), "{\"data_dicts\": []}");
    }

    #[test]
    fn find_json_fragments_locates_task_descriptor_blocks() {
        let text = format!("submitted\n{}\n```json\n{{\"a\":1}}\n```\n", TaskDescriptor::FENCE_MARKER);
        let fragments = find_json_fragments(&text);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0], "{\"a\":1}");
    }
}
