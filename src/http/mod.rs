// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! HTTP surface (axum).
//!
//! Thin mapping from JSON bodies to [`SessionCommand`]s and one-shot calls; every failure is
//! answered with an `{"error": ...}` body and a status derived from the error kind.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::{ErrorResponse, IterateParams, IterateResponse, OneShotParams, OneShotResponse, SessionResponse};
use crate::model::{OneShotId, SessionId};
use crate::one_shot::OneShotHandler;
use crate::session::{SessionCommand, SessionController, SessionError};

#[derive(Debug, Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub one_shot: OneShotHandler,
}

impl AppState {
    pub fn new(controller: SessionController, one_shot: OneShotHandler) -> Self {
        Self {
            controller,
            one_shot,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/iterative-mermaid", post(iterative_mermaid))
        .route("/generate-mermaid", post(generate_mermaid))
        .route("/generate-mermaid/{identifier}", get(one_shot_artifact))
        .route("/sessions/{session_id}", get(session_summary))
        .route("/sessions/{session_id}/iterations/{index}", get(iteration_artifact))
        .route("/iframe", get(iframe))
        .with_state(state)
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) | Self::IterationNotFound { .. } => StatusCode::NOT_FOUND,
            Self::GenerationFailed(_) | Self::RefinementFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_owned(),
            session_id: self.session_id().map(|id| id.as_str().to_owned()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        kind: kind.to_owned(),
        session_id: None,
    };
    (status, Json(body)).into_response()
}

fn invalid_body(rejection: JsonRejection) -> SessionError {
    SessionError::InvalidInput(format!("invalid request body: {}", rejection.body_text()))
}

fn invalid_path(rejection: PathRejection) -> SessionError {
    SessionError::InvalidInput(format!("invalid path: {}", rejection.body_text()))
}

fn parse_session_id(raw: &str) -> Result<SessionId, SessionError> {
    SessionId::new(raw)
        .map_err(|err| SessionError::InvalidInput(format!("invalid session_id {raw:?}: {err}")))
}

pub(crate) async fn iterative_mermaid(
    State(state): State<AppState>,
    payload: Result<Json<IterateParams>, JsonRejection>,
) -> Result<Json<IterateResponse>, SessionError> {
    let Json(params) = payload.map_err(invalid_body)?;
    let command = SessionCommand::from_fields(
        params.prompt.as_deref(),
        params.session_id.as_deref(),
        params.change_prompt.as_deref(),
    )?;
    let outcome = state.controller.handle(command).await?;
    Ok(Json(outcome.into()))
}

pub(crate) async fn generate_mermaid(
    State(state): State<AppState>,
    payload: Result<Json<OneShotParams>, JsonRejection>,
) -> Result<Json<OneShotResponse>, SessionError> {
    let Json(params) = payload.map_err(invalid_body)?;
    let outcome = state
        .one_shot
        .handle(&params.prompt, &params.output_filename)
        .await?;
    Ok(Json(outcome.into()))
}

pub(crate) async fn one_shot_artifact(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Response {
    let record = OneShotId::new(identifier.as_str())
        .ok()
        .and_then(|id| state.one_shot.get(&id));
    match record {
        Some(record) => artifact_response(&record.filename, record.artifact),
        None => error_response(
            StatusCode::NOT_FOUND,
            "one_shot_not_found",
            format!("no one-shot diagram {identifier:?} (unknown or expired)"),
        ),
    }
}

pub(crate) async fn session_summary(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<SessionResponse>, SessionError> {
    let Path(session_id) = path.map_err(invalid_path)?;
    let session_id = parse_session_id(&session_id)?;
    let session = state.controller.read_session(&session_id)?;
    Ok(Json(SessionResponse::from(&session)))
}

pub(crate) async fn iteration_artifact(
    State(state): State<AppState>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<Response, SessionError> {
    let Path((session_id, index)) = path.map_err(invalid_path)?;
    let session_id = parse_session_id(&session_id)?;
    let (artifact_ref, bytes) = state.controller.read_artifact(&session_id, index)?;
    Ok(artifact_response(artifact_ref.file_name(), bytes))
}

#[derive(Debug, Deserialize)]
pub(crate) struct IframeParams {
    imgsrc: String,
}

/// Redirect page pointing a browser at the viewer for the session an image belongs to.
pub(crate) async fn iframe(Query(params): Query<IframeParams>) -> Response {
    let Some(session_id) = session_id_from_image_path(&params.imgsrc) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_input", "Invalid imgsrc format.");
    };

    let static_url = format!("/static/?session_id={session_id}");
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Redirecting...</title>
    <script>
        window.location.href = "{static_url}";
    </script>
</head>
<body>
    <p>If you are not redirected automatically, <a href="{static_url}">click here</a>.</p>
</body>
</html>
"#
    ))
    .into_response()
}

/// `.../iteration_3_output_<session>.png` → `<session>`.
///
/// Only ids made of ASCII alphanumerics, `_` and `-` are accepted; the id is echoed into HTML.
fn session_id_from_image_path(imgsrc: &str) -> Option<&str> {
    let (_, rest) = imgsrc.split_once("_output_")?;
    let session_id = rest.split('.').next()?;
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    valid.then_some(session_id)
}

fn artifact_response(file_name: &str, bytes: Vec<u8>) -> Response {
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(file_name)));
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{file_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub(crate) fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "mmd" | "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
