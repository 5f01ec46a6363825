//! Agent Registry (§4.9): dispatch indirection from a Task Code to a
//! handler implementation. The lookup shape — a small `RwLock<HashMap<..>>`
//! behind a handful of lookup methods — is kept from the teacher's
//! `nodes/registry.rs`; since our handlers are in-process async functions
//! rather than a channel to a remote node, `HandlerDescriptor` instead
//! carries a callable, the way `stencila-stencila`'s `ToolRegistry` pairs a
//! `ToolDefinition` with a `ToolExecutorFn`. Handlers here are non-capturing
//! `fn` pointers rather than boxed closures, since every dispatch target is
//! a plain free function.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;

use rsa_domain::abort::AbortToken;
use rsa_domain::chat_session::ChatMessage;
use rsa_domain::error::{Error, Result};
use rsa_domain::task_code::TaskCode;

use super::knowledge::{self, SourceRef};
use super::remote_job;
use super::turn::{TurnContext, TurnRequest};

pub type HandlerId = String;

/// Arguments passed to a dispatched handler for one turn's EXECUTE step.
pub struct HandlerArgs<'a> {
    pub ctx: &'a TurnContext<'a>,
    pub abort: &'a AbortToken,
    pub task_code: TaskCode,
    pub session_id: &'a str,
    pub req: &'a TurnRequest,
    pub history: &'a [ChatMessage],
}

/// A handler's result: the response text, any knowledge sources, and an
/// optional status override (`FetchJobResult`'s `guidance_provided` vs.
/// `success` split; `GeneralAnswer`'s `general_answer` status). `None`
/// falls back to the uniform `"success"` status.
pub struct HandlerOutcome {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub status: Option<&'static str>,
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<HandlerOutcome>> + Send + 'a>>;
pub type TaskHandlerFn = for<'a> fn(HandlerArgs<'a>) -> HandlerFuture<'a>;

/// A registered handler: which task codes it declares support for, and the
/// function the registry dispatches to for them.
pub struct HandlerDescriptor {
    pub id: HandlerId,
    pub supported_codes: Vec<TaskCode>,
    pub handler: TaskHandlerFn,
}

#[derive(Default)]
pub struct AgentRegistry {
    handlers: RwLock<HashMap<HandlerId, HandlerDescriptor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: HandlerDescriptor) {
        self.handlers.write().insert(descriptor.id.clone(), descriptor);
    }

    /// The first registered handler id that declares support for `code`.
    /// Kept for introspection/logging even though `resolve` is what the
    /// orchestrator actually dispatches through.
    pub fn find_handler(&self, code: TaskCode) -> Option<HandlerId> {
        self.handlers
            .read()
            .values()
            .find(|h| h.supported_codes.contains(&code))
            .map(|h| h.id.clone())
    }

    /// The callable for the first registered handler supporting `code`.
    /// `fn` pointers are `Copy`, so this returns by value without holding
    /// the read lock past the call.
    pub fn resolve(&self, code: TaskCode) -> Option<TaskHandlerFn> {
        self.handlers
            .read()
            .values()
            .find(|h| h.supported_codes.contains(&code))
            .map(|h| h.handler)
    }

    /// The registry this gateway boots with: one handler supporting every
    /// task code the Turn Orchestrator branches into.
    pub fn default_with_llm_handler() -> Self {
        let registry = Self::new();
        registry.register(HandlerDescriptor {
            id: "llm-default".to_string(),
            supported_codes: vec![
                TaskCode::GeneralAnswer,
                TaskCode::Knowledge,
                TaskCode::SubmitJob,
                TaskCode::FetchJobResult,
            ],
            handler: dispatch_llm_handler,
        });
        registry
    }
}

/// The one handler this system registers: it fans back out to the
/// Knowledge Pipeline, Remote-Job Workflow, and general-answer branches by
/// task code. A second handler (e.g. a specialized scenario worker) could
/// be registered for a subset of these codes later without the
/// orchestrator's dispatch call site changing.
fn dispatch_llm_handler(args: HandlerArgs<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        match args.task_code {
            TaskCode::Knowledge => {
                let answer = knowledge::run(
                    args.ctx.provider,
                    args.ctx.rag,
                    args.ctx.billing,
                    args.ctx.progress,
                    args.abort,
                    args.session_id,
                    &args.req.message,
                    args.history,
                    args.ctx.rag.map(|_| 5).unwrap_or(5),
                )
                .await?;
                Ok(HandlerOutcome { text: answer.text, sources: answer.sources, status: None })
            }
            TaskCode::SubmitJob => {
                let remote_job_client = args
                    .ctx
                    .remote_job_client
                    .ok_or_else(|| Error::HandlerFailure("no remote-job backend configured".into()))?;
                let token = super::auth::resolve_token(
                    args.ctx.deployment_mode,
                    args.ctx.configured_token,
                    args.req.request_token.as_deref(),
                )?;
                let result = remote_job::submit(
                    args.ctx.provider,
                    remote_job_client,
                    args.ctx.billing,
                    args.ctx.progress,
                    args.abort,
                    args.session_id,
                    &token,
                    &args.req.message,
                    args.req.file_contents.as_deref().unwrap_or(""),
                    args.ctx.remote_job_config,
                )
                .await?;
                Ok(HandlerOutcome { text: result.response_text, sources: Vec::new(), status: None })
            }
            TaskCode::FetchJobResult => {
                let remote_job_client = args
                    .ctx
                    .remote_job_client
                    .ok_or_else(|| Error::HandlerFailure("no remote-job backend configured".into()))?;
                let result = remote_job::retrieve(
                    args.ctx.provider,
                    remote_job_client,
                    args.ctx.billing,
                    args.ctx.progress,
                    args.abort,
                    args.session_id,
                    &args.req.message,
                    args.history,
                    args.ctx.remote_job_config,
                )
                .await?;
                Ok(HandlerOutcome { text: result.summary, sources: Vec::new(), status: Some(result.status) })
            }
            TaskCode::GeneralAnswer => {
                args.ctx.billing.track_llm_call(args.session_id, "general_answer");
                const SYSTEM_PROMPT: &str = "Answer the user's message helpfully and concisely.";
                let text = rsa_providers::generate_response(args.ctx.provider, SYSTEM_PROMPT, &args.req.message).await?;
                Ok(HandlerOutcome { text, sources: Vec::new(), status: Some("general_answer") })
            }
            other => Err(Error::HandlerFailure(format!(
                "handler does not support task code {}",
                other.as_i32()
            ))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handler_supports_every_primary_task_code() {
        let registry = AgentRegistry::default_with_llm_handler();
        for code in [
            TaskCode::Knowledge,
            TaskCode::SubmitJob,
            TaskCode::FetchJobResult,
            TaskCode::GeneralAnswer,
        ] {
            assert_eq!(registry.find_handler(code), Some("llm-default".to_string()));
            assert!(registry.resolve(code).is_some());
        }
    }

    #[test]
    fn empty_registry_finds_nothing() {
        let registry = AgentRegistry::new();
        assert_eq!(registry.find_handler(TaskCode::Knowledge), None);
        assert!(registry.resolve(TaskCode::Knowledge).is_none());
    }

    #[test]
    fn registry_does_not_resolve_unsupported_code() {
        let registry = AgentRegistry::default_with_llm_handler();
        assert!(registry.resolve(TaskCode::UpstreamTimeout).is_none());
    }
}
