//! `POST /agent/chat` and `POST /agent/chat/upload` (§6), grounded on the
//! teacher's `chat()`/`chat_stream()` handler pair in `api/chat.rs`: a
//! pre-flight provider check, then a single call into the turn runtime,
//! then a JSON response built from its result. This spec has no streaming
//! wire contract (§6 only asks for the request to *accept* a `stream`
//! field), so both routes here return the same non-streaming JSON shape.

use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use rsa_domain::billing::BillingCounter;
use rsa_domain::credit::CreditInfo;
use rsa_domain::error::Error;

use crate::runtime::knowledge::SourceRef;
use crate::runtime::turn::{self, TurnContext, TurnRequest, TurnResponse};
use crate::state::AppState;

use super::error::ApiError;
use super::file_extract::{self, FileTextExtractor, PlainTextExtractor};

/// `{message, stream?, session_id?, token?, chat_id?}` (§6). `chat_id` and
/// `session_id` are accepted as aliases for the same selector — see
/// DESIGN.md's chat_id/session_id note.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// `{response, status, task_type, session_id, chat_id, chat_title,
/// source_files?, billing_info, credit_info}` (§6).
#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub response: String,
    pub status: String,
    pub task_type: i32,
    pub session_id: String,
    pub chat_id: String,
    pub chat_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_files: Option<Vec<SourceRef>>,
    pub billing_info: BillingCounter,
    pub credit_info: CreditInfo,
}

impl From<TurnResponse> for ChatResponseBody {
    fn from(r: TurnResponse) -> Self {
        Self {
            response: r.response,
            status: r.status,
            task_type: r.task_code.as_i32(),
            session_id: r.session_id,
            chat_id: r.chat_id,
            chat_title: r.chat_title,
            source_files: if r.sources.is_empty() { None } else { Some(r.sources) },
            billing_info: r.billing_info,
            credit_info: r.credit_info,
        }
    }
}

pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    run_turn_request(&state, req, None).await
}

/// `POST /agent/chat/upload`: at most one file, extensions and size capped
/// per §6, its extracted text folded into the message via the literal
/// template before the same turn pipeline runs.
pub async fn chat_upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut req: Option<ChatRequest> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return ApiError::from(Error::Validation(e.to_string())).into_response(),
        };
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            if file.is_some() {
                return ApiError::from(Error::Validation("at most one file may be uploaded".into())).into_response();
            }
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = match field.bytes().await {
                Ok(b) => b,
                Err(e) => return ApiError::from(Error::Validation(e.to_string())).into_response(),
            };
            if bytes.len() > file_extract::MAX_UPLOAD_BYTES {
                return ApiError::from(Error::Validation("uploaded file exceeds the 20MB limit".into())).into_response();
            }
            if let Err(e) = file_extract::validate_extension(&filename) {
                return ApiError::from(e).into_response();
            }
            file = Some((filename, bytes.to_vec()));
        } else {
            let text = match field.text().await {
                Ok(t) => t,
                Err(e) => return ApiError::from(Error::Validation(e.to_string())).into_response(),
            };
            match name.as_str() {
                "message" => {
                    req.get_or_insert_with(|| ChatRequest {
                        message: String::new(),
                        stream: false,
                        session_id: None,
                        token: None,
                        chat_id: None,
                    })
                    .message = text;
                }
                "session_id" => req.get_or_insert_with(default_chat_request).session_id = Some(text),
                "chat_id" => req.get_or_insert_with(default_chat_request).chat_id = Some(text),
                "token" => req.get_or_insert_with(default_chat_request).token = Some(text),
                "stream" => req.get_or_insert_with(default_chat_request).stream = text == "true",
                _ => {}
            }
        }
    }

    let Some(req) = req else {
        return ApiError::from(Error::Validation("missing required field: message".into())).into_response();
    };

    let file_contents = match file {
        Some((filename, bytes)) => {
            let extractor = PlainTextExtractor;
            match extractor.extract(&filename, &bytes) {
                Ok(content) => Some(format!(
                    "{message}；以下是我上传的文件，文件名为{filename}，内容为{content}；请将我的要求和上传文件内容综合起来。",
                    message = req.message,
                )),
                Err(e) => return ApiError::from(e).into_response(),
            }
        }
        None => None,
    };

    run_turn_request(&state, req, file_contents).await
}

fn default_chat_request() -> ChatRequest {
    ChatRequest { message: String::new(), stream: false, session_id: None, token: None, chat_id: None }
}

async fn run_turn_request(state: &AppState, req: ChatRequest, file_contents: Option<String>) -> Response {
    let provider = match state.default_provider() {
        Some(p) => p,
        None => {
            return ApiError::from(Error::HandlerFailure("no LLM provider is configured".into())).into_response();
        }
    };

    let ctx = TurnContext {
        provider: &provider,
        rag: state.rag.as_ref(),
        remote_job_client: state.remote_job.as_ref(),
        credit_client: state.credit.as_ref(),
        sessions: state.sessions.as_ref(),
        progress: state.progress.as_ref(),
        abort_map: state.abort_map.as_ref(),
        billing: state.billing.as_ref(),
        agents: state.agents.as_ref(),
        deployment_mode: state.config.deployment.mode,
        configured_token: state.config.deployment.configured_token.as_deref(),
        sessions_config: &state.config.sessions,
        billing_config: &state.config.billing,
        remote_job_config: &state.config.remote_job,
    };

    let turn_req = TurnRequest {
        session_id: req.session_id.or(req.chat_id),
        message: req.message,
        request_token: req.token,
        file_contents,
    };

    match turn::run(&ctx, turn_req).await {
        Ok(resp) => Json(ChatResponseBody::from(resp)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
