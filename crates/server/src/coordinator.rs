//! Request Coordinator (C7): per-HTTP-request orchestration. Resolves the
//! conversation, invokes the request translator, dispatches to the
//! streaming or non-streaming path, and persists the turn's correlations
//! once it completes.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bridge::{
    correlation::ToolBinding,
    error::GatewayError,
    protocol::anthropic,
    stream::StreamTranslator,
    translate::{translate_request, translate_response},
};
use futures::StreamExt as _;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{sse, upstream::UpstreamError, AppState};

const CONVERSATION_ID_HEADERS: [&str; 2] = ["x-conversation-id", "x-session-id"];
const STREAM_HELPER_HEADER: &str = "x-stainless-helper-method";
const PING_INTERVAL: Duration = Duration::from_secs(15);

fn conversation_id(headers: &HeaderMap) -> String {
    for name in CONVERSATION_ID_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            return value.to_string();
        }
    }

    format!("req_{}", Uuid::new_v4().simple())
}

fn wants_streaming(headers: &HeaderMap) -> bool {
    headers
        .get(STREAM_HELPER_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("stream"))
}

pub(crate) fn error_response(status: StatusCode, error: anthropic::ErrorResponse) -> Response {
    (status, axum::Json(error)).into_response()
}

fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

pub async fn handle_messages(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request: anthropic::Request = match sonic_rs::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                anthropic::ErrorResponse::new(anthropic::ErrorBody::invalid_request(format!(
                    "failed to parse request body: {err}"
                ))),
            );
        }
    };

    let conv_id = conversation_id(&headers);
    let record = state.store.get_or_create(&conv_id);

    let translated = {
        let conversation = record.lock().unwrap_or_else(|poison| poison.into_inner());
        translate_request(&request, &conversation, &state.config.openai_model)
    };

    let mut translated = match translated {
        Ok(translated) => translated,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.into_anthropic_error()),
    };

    // Streaming is selected solely by the `x-stainless-helper-method: stream`
    // header; the downstream body's own `stream` field is not consulted. This
    // choice must also be what we tell the upstream, or we'd open a
    // non-streaming upstream call and then try to read it as an event stream.
    let streaming = wants_streaming(&headers);
    translated.request.stream = streaming;

    if let Some(logger) = &state.event_log {
        logger.log(&conv_id, "upstream_request", &translated.request);
    }

    if streaming {
        stream_response(state, conv_id, request.model.clone(), translated.request, translated.new_bindings).await
    } else {
        non_streaming_response(state, conv_id, request.model, translated.request, translated.new_bindings).await
    }
}

async fn non_streaming_response(
    state: AppState,
    conv_id: String,
    downstream_model: String,
    upstream_request: bridge::protocol::openai::Request,
    minted_bindings: Vec<(String, ToolBinding)>,
) -> Response {
    let outcome = match state.config.request_timeout {
        Some(timeout) => tokio::time::timeout(timeout, state.upstream.send(&upstream_request))
            .await
            .map_err(|_| GatewayError::Internal("request timed out".to_string())),
        None => Ok(state.upstream.send(&upstream_request).await.map_err(upstream_to_gateway)),
    };

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) | Err(err) => {
            if matches!(err, GatewayError::Internal(_)) && state.config.request_timeout.is_some() {
                return StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT).into_response();
            }
            return error_response(status_from_u16(err.status()), err.into_anthropic_error());
        }
    };

    if let Some(logger) = &state.event_log {
        logger.log(&conv_id, "upstream_response", &serde_json::json!({"id": response.id}));
    }

    let message_id = format!("msg_{}", Uuid::new_v4().simple());
    let translated = translate_response(&response, message_id, downstream_model);

    let mut bindings = minted_bindings;
    bindings.extend(translated.new_bindings);
    state.store.update(&conv_id, Some(response.id), bindings);

    axum::Json(translated.message).into_response()
}

fn upstream_to_gateway(err: UpstreamError) -> GatewayError {
    match err {
        UpstreamError::Connection(message) => GatewayError::Upstream { status: 502, message },
        UpstreamError::Api { status, message } => GatewayError::Upstream { status, message },
    }
}

async fn stream_response(
    state: AppState,
    conv_id: String,
    downstream_model: String,
    upstream_request: bridge::protocol::openai::Request,
    minted_bindings: Vec<(String, ToolBinding)>,
) -> Response {
    let (sink, body) = sse::channel();
    let emitter = Arc::new(bridge::sse_emitter::SseEmitter::new(sink));

    tokio::spawn(drive_session(
        state,
        conv_id,
        downstream_model,
        upstream_request,
        minted_bindings,
        emitter,
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Owns one streaming session end to end: opens the upstream stream, drives
/// [`StreamTranslator`] with each event, keeps the ping timer alive, and
/// reacts to transport closure or a configured request timeout by cutting
/// the session short without writing anything further.
async fn drive_session(
    state: AppState,
    conv_id: String,
    downstream_model: String,
    upstream_request: bridge::protocol::openai::Request,
    minted_bindings: Vec<(String, ToolBinding)>,
    emitter: Arc<bridge::sse_emitter::SseEmitter<sse::ChannelSink>>,
) {
    let message_id = format!("msg_{}", Uuid::new_v4().simple());
    let mut translator = StreamTranslator::new(message_id, downstream_model);

    for emission in translator.greet() {
        emission.send(&emitter);
    }

    let upstream_events = match state.upstream.stream(&upstream_request).await {
        Ok(stream) => stream,
        Err(err) => {
            emitter.send_event(&bridge::protocol::anthropic::StreamEvent::Error {
                error: bridge::protocol::anthropic::ErrorBody::api_error(err.to_string()),
            });
            emitter.send_event(&bridge::protocol::anthropic::StreamEvent::MessageStop);
            return;
        }
    };

    tokio::pin!(upstream_events);
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.tick().await; // first tick fires immediately; consume it

    let mut deadline = state.config.request_timeout.map(|timeout| Box::pin(tokio::time::sleep(timeout)));

    loop {
        if emitter.is_closed() {
            break;
        }

        tokio::select! {
            _ = ping_timer.tick() => {
                if !emitter.is_closed() {
                    emitter.send_ping();
                }
            }
            _ = conditional_sleep(&mut deadline) => {
                log::warn!("conversation {conv_id}: request timed out mid-stream, terminating session");
                break;
            }
            event = upstream_events.next() => {
                match event {
                    Some(event) => {
                        if let Some(logger) = &state.event_log {
                            logger.log(&conv_id, "upstream_event", &event);
                        }

                        for emission in translator.handle_event(event) {
                            emission.send(&emitter);
                        }

                        if translator.is_completed() {
                            break;
                        }
                    }
                    None => {
                        log::warn!("conversation {conv_id}: upstream stream ended without response.completed");
                        break;
                    }
                }
            }
        }
    }

    let completed = translator.is_completed();
    let (new_bindings, last_response_id) = translator.into_parts();

    if completed {
        let mut bindings = minted_bindings;
        bindings.extend(new_bindings);
        state.store.update(&conv_id, last_response_id, bindings);
    }
}

/// Sleeps until the optional deadline fires; never resolves when there is
/// no configured timeout, so it's a silent no-op arm in the `select!` above.
async fn conditional_sleep(deadline: &mut Option<std::pin::Pin<Box<tokio::time::Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
