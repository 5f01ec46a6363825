//! The Turn Orchestrator (§4.1): the ten-step state machine that drives
//! every `/agent/chat` request. Grounded on
//! `original_source/.../chat_service.py`'s `process_turn`, restructured
//! from its linear try/except shape into the explicit INIT..EMIT steps
//! spec.md names.

use std::sync::Arc;
use std::time::Instant;

use rsa_domain::abort::{AbortMap, AbortToken};
use rsa_domain::billing::BillingCounter;
use rsa_domain::chat_session::{ChatMessage, ChatSession};
use rsa_domain::config::{BillingConfig, DeploymentMode, RemoteJobConfig, SessionsConfig};
use rsa_domain::credit::CreditInfo;
use rsa_domain::error::{Error, Result};
use rsa_domain::progress::{ProgressEvent, ProgressStage};
use rsa_domain::task_code::TaskCode;
use rsa_domain::trace::TraceEvent;
use rsa_providers::{generate_response, CreditClient, LlmProvider, RagClient, RemoteJobClient};
use rsa_sessions::SessionStore;

use super::auth;
use super::billing::BillingMap;
use super::classifier;
use super::knowledge;
use super::progress::ProgressHub;
use super::registry::{AgentRegistry, HandlerArgs};

const TITLE_SYSTEM_PROMPT: &str = "\
Write a short plain-text title (at most a few words) for a conversation \
that starts with this message. No punctuation, no quotes.";

/// Everything the orchestrator needs from the application for one turn.
/// Borrowed rather than bundled into `AppState` directly so `turn::run` can
/// be unit-exercised with hand-built collaborators.
pub struct TurnContext<'a> {
    pub provider: &'a Arc<dyn LlmProvider>,
    pub rag: Option<&'a Arc<dyn RagClient>>,
    pub remote_job_client: Option<&'a Arc<dyn RemoteJobClient>>,
    pub credit_client: Option<&'a Arc<dyn CreditClient>>,
    pub sessions: &'a SessionStore,
    pub progress: &'a ProgressHub,
    pub abort_map: &'a AbortMap,
    pub billing: &'a BillingMap,
    pub agents: &'a AgentRegistry,
    pub deployment_mode: DeploymentMode,
    pub configured_token: Option<&'a str>,
    pub sessions_config: &'a SessionsConfig,
    pub billing_config: &'a BillingConfig,
    pub remote_job_config: &'a RemoteJobConfig,
}

/// One incoming chat turn (§6 `/agent/chat` request shape).
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub request_token: Option<String>,
    pub file_contents: Option<String>,
}

/// The `/agent/chat` response shape (§6): `{response, status, task_type,
/// session_id, chat_id, chat_title, source_files?, billing_info,
/// credit_info}`. `chat_id` mirrors `session_id` — this spec's `chat_id`
/// is just the selector a caller passes to resume a conversation, and
/// `SessionStore::resolve_or_create` already folds that selection into the
/// resolved `session_id` (see DESIGN.md).
pub struct TurnResponse {
    pub session_id: String,
    pub chat_id: String,
    pub chat_title: String,
    pub task_code: TaskCode,
    pub status: String,
    pub response: String,
    pub sources: Vec<knowledge::SourceRef>,
    pub billing_info: BillingCounter,
    pub credit_info: CreditInfo,
}

/// §7's status string for a terminal error task code.
fn error_status(e: &Error) -> &'static str {
    match e {
        Error::UserAbort => "user_aborted",
        Error::UpstreamTimeout(_) => "llm_timeout",
        Error::UpstreamNetwork(_) => "network_error",
        Error::UpstreamAuth(_) => "api_error",
        _ => "error",
    }
}

/// Run one full turn. Cancellation: every suspension point below checks
/// `abort.is_aborted()` and unwinds straight to SETTLE with task code -100
/// (§3, §5). Collaborator errors that aren't cancellation are caught at the
/// EXECUTE boundary and also routed to SETTLE, carrying their own mapped
/// task code, so billing/session persistence still run for a failed turn.
pub async fn run(ctx: &TurnContext<'_>, req: TurnRequest) -> Result<TurnResponse> {
    let started = Instant::now();

    // ── INIT / AUTH ──────────────────────────────────────────────────
    let token = auth::resolve_token(ctx.deployment_mode, ctx.configured_token, req.request_token.as_deref())?;

    if ctx.deployment_mode == DeploymentMode::Production {
        if let Some(credit) = ctx.credit_client {
            let check = credit.check(&token).await?;
            if !check.ok {
                return Err(Error::InsufficientCredit);
            }
        }
    }

    // ── LOAD_HISTORY ─────────────────────────────────────────────────
    let (mut session, is_new) = ctx.sessions.resolve_or_create(req.session_id.as_deref()).await?;
    let session_id = session.session_id.clone();
    let abort = begin_turn_progress(ctx, &session_id);

    TraceEvent::TurnStarted { session_id: session_id.clone() }.emit();
    let context = session.context_window(ctx.sessions_config.max_context);

    let (task_code, status, outcome) =
        run_branches(ctx, &abort, &session_id, &req, &context).await;

    // ── SETTLE ───────────────────────────────────────────────────────
    let counter = ctx.billing.take(&session_id);
    let credit_info = settle_credit(ctx, &token, &counter).await;
    TraceEvent::TurnSettled {
        session_id: session_id.clone(),
        llm_calls: counter.llm_calls,
        remote_jobs: counter.remote_jobs,
        deducted: credit_info.deducted,
        production_mode: ctx.deployment_mode == DeploymentMode::Production,
    }
    .emit();

    let (response_text, sources) = match &outcome {
        Ok((text, sources)) => (text.clone(), sources.clone()),
        Err(e) => (format!("The request could not be completed: {e}"), Vec::new()),
    };

    // ── PERSIST_SESSION ──────────────────────────────────────────────
    if is_new {
        session.title = title_for(ctx, &session_id, &req.message).await;
    }
    session.append_turn(
        ChatMessage::user(req.message.clone()),
        ChatMessage::assistant(response_text.clone()),
        ctx.sessions_config.max_messages,
    );
    if let Err(e) = persist(ctx, &session).await {
        tracing::warn!(session_id = %session_id, error = %e, "session persistence failed (logged only, per §4.6)");
    }

    // ── EMIT ─────────────────────────────────────────────────────────
    ctx.progress.publish(ProgressEvent::new(&session_id, "turn complete", ProgressStage::Completed));
    ctx.progress.release_if_idle(&session_id);
    tracing::info!(
        session_id = %session_id,
        task_code = task_code.as_i32(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "turn settled"
    );

    Ok(TurnResponse {
        chat_id: session_id.clone(),
        chat_title: session.title.clone(),
        session_id,
        task_code,
        status,
        response: response_text,
        sources,
        billing_info: counter,
        credit_info,
    })
}

fn begin_turn_progress(ctx: &TurnContext<'_>, session_id: &str) -> AbortToken {
    ctx.progress.publish(ProgressEvent::new(session_id, "starting", ProgressStage::Init));
    ctx.abort_map.begin_turn(session_id)
}

/// CLASSIFY / BRANCH / CREDIT_PREFLIGHT / EXECUTE, collapsed into one
/// function since every branch shares the same abort-and-settle boundary.
/// Returns the resolved task code (so SETTLE can log it even on failure)
/// alongside the branch's `Ok`/`Err` outcome.
async fn run_branches(
    ctx: &TurnContext<'_>,
    abort: &AbortToken,
    session_id: &str,
    req: &TurnRequest,
    history: &[ChatMessage],
) -> (TaskCode, String, Result<(String, Vec<knowledge::SourceRef>)>) {
    if abort.is_aborted() {
        return (TaskCode::UserAbort, "user_aborted".to_string(), Err(Error::UserAbort));
    }

    ctx.progress.publish(ProgressEvent::new(session_id, "classifying intent", ProgressStage::Analyzing));
    let file_summary = req.file_contents.as_deref().unwrap_or("");
    let task_code = classifier::classify(ctx.provider, ctx.billing, session_id, &req.message, file_summary).await;
    TraceEvent::TurnBranch { session_id: session_id.to_string(), task_code: task_code.as_i32() }.emit();

    if task_code.is_terminal_error() {
        let err = upstream_error_for(task_code);
        let status = error_status(&err).to_string();
        return (task_code, status, Err(err));
    }

    if abort.is_aborted() {
        return (TaskCode::UserAbort, "user_aborted".to_string(), Err(Error::UserAbort));
    }

    ctx.progress.publish(ProgressEvent::new(session_id, "executing", ProgressStage::Processing));

    // §4.9: the orchestrator never calls a branch directly — it resolves
    // the handler registered for this task code and invokes that.
    let Some(handler) = ctx.agents.resolve(task_code) else {
        let err = Error::HandlerFailure(format!("no handler registered for task code {}", task_code.as_i32()));
        let status = error_status(&err).to_string();
        return (task_code, status, Err(err));
    };

    let args = HandlerArgs { ctx, abort, task_code, session_id, req, history };
    let outcome = handler(args).await;
    let status = match &outcome {
        Err(e) => error_status(e).to_string(),
        Ok(outcome) => outcome.status.unwrap_or("success").to_string(),
    };
    let outcome = outcome.map(|outcome| (outcome.text, outcome.sources));
    (task_code, status, outcome)
}

fn upstream_error_for(code: TaskCode) -> Error {
    match code {
        TaskCode::UpstreamTimeout => Error::UpstreamTimeout("classifier LLM call timed out".into()),
        TaskCode::UpstreamNetwork => Error::UpstreamNetwork("classifier LLM call failed".into()),
        TaskCode::UpstreamAuth => Error::UpstreamAuth("classifier LLM call rejected".into()),
        TaskCode::UserAbort => Error::UserAbort,
        _ => Error::HandlerFailure("unexpected terminal task code".into()),
    }
}

/// Titling happens after SETTLE has already taken this turn's counter, so
/// its one LLM call is tracked under `session_id` and collected by the
/// *next* turn's settlement rather than this one's (§4.7 "lands in the
/// next turn's window" — tracking it under this session's real id, not a
/// placeholder key, is what makes that settlement actually happen).
async fn title_for(ctx: &TurnContext<'_>, session_id: &str, user_message: &str) -> String {
    ctx.billing.track_llm_call(session_id, "title_generation");
    match generate_response(ctx.provider, TITLE_SYSTEM_PROMPT, user_message).await {
        Ok(text) => rsa_domain::chat_session::clean_title(&text),
        Err(_) => rsa_domain::chat_session::fallback_title(user_message),
    }
}

async fn persist(ctx: &TurnContext<'_>, session: &ChatSession) -> Result<()> {
    if ctx.sessions.load(&session.session_id).await?.is_some() {
        ctx.sessions.update(session).await
    } else {
        ctx.sessions.create(session).await
    }
}

/// Production: deduct `cost` via the credit client and report the result.
/// Local: no credit backend is wired, settlement is a no-op stub (§4.7).
async fn settle_credit(ctx: &TurnContext<'_>, token: &str, counter: &BillingCounter) -> CreditInfo {
    if ctx.deployment_mode == DeploymentMode::Local {
        return CreditInfo::local_mode_stub();
    }
    let Some(credit) = ctx.credit_client else {
        return CreditInfo::local_mode_stub();
    };
    let cost = counter.cost(ctx.billing_config.llm_factor, ctx.billing_config.job_factor);
    if cost == 0 {
        return CreditInfo { deducted: 0, success: true, remaining: None, local_mode: false };
    }
    match credit.update(token, -cost).await {
        Ok(resp) => CreditInfo { deducted: cost, success: resp.ok, remaining: resp.balance, local_mode: false },
        Err(e) => {
            tracing::warn!(error = %e, "credit settlement failed");
            CreditInfo { deducted: 0, success: false, remaining: None, local_mode: false }
        }
    }
}
