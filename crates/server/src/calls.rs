//! Call endpoints
//!
//! Call setup, caller utterances, reply audio, status events and the
//! telephony status callback.

use axum::{
    body::{Body, Bytes},
    extract::{Form, Json, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use trifivend_config::constants::TERMINAL_CALL_STATUSES;
use trifivend_core::CallEvent;
use trifivend_persistence::Lead;

use crate::state::AppState;
use crate::ServerError;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+\d{8,15}$").expect("valid E.164 pattern"));

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(20);

/// Start call request
#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub to: String,
    pub lead_name: String,
    pub property_type: String,
    pub location_area: String,
    #[serde(default)]
    pub callback_offer: Option<String>,
    /// Provider call SID, when the call was already placed
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub script_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl StartCallRequest {
    fn validate(&self) -> Result<(), ServerError> {
        if !E164.is_match(self.to.trim()) {
            return Err(ServerError::InvalidRequest(format!(
                "'to' must be an E.164 number, got '{}'",
                self.to
            )));
        }
        for (field, value) in [
            ("lead_name", &self.lead_name),
            ("property_type", &self.property_type),
            ("location_area", &self.location_area),
        ] {
            if value.trim().is_empty() {
                return Err(ServerError::InvalidRequest(format!("'{}' must not be blank", field)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_id: String,
    pub status: &'static str,
    pub audio_url: String,
    pub events_url: String,
    /// Opening line for the telephony side to speak on answer
    pub greeting: String,
}

/// POST /calls
pub async fn start_call(
    State(state): State<AppState>,
    Json(request): Json<StartCallRequest>,
) -> Result<Json<StartCallResponse>, StatusCode> {
    if let Err(e) = request.validate() {
        tracing::debug!(error = %e, "Rejected call request");
        return Err(e.into());
    }

    let call_id = request
        .call_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state
        .orchestrator
        .on_call_started(
            &call_id,
            request.script_id.clone(),
            request.system_prompt.as_deref().map(|p| p.trim().to_string()),
        )
        .map_err(ServerError::from)?;

    let lead = Lead::new(
        request.lead_name.trim(),
        request.to.trim(),
        request.property_type.trim(),
        request.location_area.trim(),
    )
    .with_callback_offer(request.callback_offer.clone())
    .with_call_id(call_id.clone());
    let leads = state.leads.clone();
    tokio::spawn(async move {
        if let Err(e) = leads.log_lead(&lead).await {
            tracing::warn!(call_id = ?lead.call_id, error = %e, "Failed to log lead");
        }
    });

    let base = state.public_base_url();
    Ok(Json(StartCallResponse {
        audio_url: format!("{}/calls/{}/audio", base, call_id),
        events_url: format!("{}/calls/{}/events", base, call_id),
        call_id,
        status: "initiated",
        greeting: state.config.agent.greeting.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
}

/// POST /calls/:id/utterance
pub async fn utterance(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(request): Json<UtteranceRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let turn = state
        .orchestrator
        .on_caller_utterance(&call_id, &request.text)
        .await
        .map_err(ServerError::from)?;

    Ok(Json(serde_json::json!({
        "call_id": call_id,
        "turn": turn,
    })))
}

/// DELETE /calls/:id
pub async fn end_call(State(state): State<AppState>, Path(call_id): Path<String>) -> StatusCode {
    if state.orchestrator.on_call_ended(&call_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// GET /calls
pub async fn list_calls(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.registry().list();
    Json(serde_json::json!({
        "count": calls.len(),
        "calls": calls,
    }))
}

/// GET /calls/:id/audio
///
/// Streams the current turn's audio and ends at the turn boundary.
pub async fn audio(State(state): State<AppState>, Path(call_id): Path<String>) -> Result<Response, StatusCode> {
    let chunks = state
        .orchestrator
        .poll_audio(&call_id)
        .map_err(ServerError::from)?;
    let body = Body::from_stream(chunks.map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))));

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// GET /calls/:id/events
///
/// Server-sent call events; a final `done` event follows `call_ended`.
pub async fn events(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let rx = state.orchestrator.subscribe(&call_id).map_err(ServerError::from)?;

    let stream = async_stream::stream! {
        let mut events = BroadcastStream::new(rx);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    match Event::default().event(event.name()).json_data(&event) {
                        Ok(sse) => yield Ok(sse),
                        Err(e) => tracing::error!(error = %e, "Failed to serialize call event"),
                    }
                    if terminal {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        call_id = %call_id,
                        error = %e,
                        "Event subscriber lagged, events were dropped"
                    );
                }
            }
        }
        yield Ok(Event::default().event("done").data("{}"));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE).text("ping")))
}

/// Telephony status callback form
#[derive(Debug, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

/// POST /status
///
/// Always answers 200 so the provider never retries.
pub async fn status_callback(
    State(state): State<AppState>,
    form: Option<Form<StatusCallback>>,
) -> impl IntoResponse {
    let Some(Form(callback)) = form else {
        tracing::warn!("Unparseable status callback");
        return (StatusCode::OK, "ok");
    };
    let (Some(call_sid), Some(status)) = (callback.call_sid, callback.call_status) else {
        tracing::warn!("Status callback without CallSid or CallStatus");
        return (StatusCode::OK, "ok");
    };

    let status = status.trim().to_lowercase();
    tracing::info!(call_id = %call_sid, status = %status, "Call status");
    metrics::counter!("trifivend_status_callbacks_total", "status" => status.clone()).increment(1);

    state.orchestrator.emit(
        &call_sid,
        CallEvent::CallStatus {
            status: status.clone(),
        },
    );
    if TERMINAL_CALL_STATUSES.contains(&status.as_str()) {
        state.orchestrator.on_call_ended(&call_sid).await;
    }

    (StatusCode::OK, "ok")
}
