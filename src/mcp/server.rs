// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};

use crate::api::{
    IterateParams, IterateResponse, OneShotParams, OneShotResponse, SessionReadParams,
    SessionResponse,
};
use crate::http::content_type_for;
use crate::model::{OneShotId, SessionId};
use crate::one_shot::OneShotHandler;
use crate::session::{SessionCommand, SessionController, SessionError};

use super::types::*;

#[derive(Clone)]
pub struct SessionsMcp {
    controller: SessionController,
    one_shot: OneShotHandler,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for SessionsMcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionsMcp")
            .field("controller", &self.controller)
            .field("one_shot", &self.one_shot)
            .finish_non_exhaustive()
    }
}

#[tool_router]
impl SessionsMcp {
    pub fn new(controller: SessionController, one_shot: OneShotHandler) -> Self {
        Self {
            controller,
            one_shot,
            tool_router: Self::tool_router(),
        }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    /// Start a diagram session or add an iteration to one; pass `session_id` from a previous
    /// result to continue and `change_prompt` to refine the newest iteration.
    #[tool(name = "session.iterate")]
    async fn session_iterate(
        &self,
        params: Parameters<IterateParams>,
    ) -> Result<Json<IterateResponse>, ErrorData> {
        let IterateParams {
            prompt,
            session_id,
            change_prompt,
        } = params.0;
        let command = SessionCommand::from_fields(
            prompt.as_deref(),
            session_id.as_deref(),
            change_prompt.as_deref(),
        )
        .map_err(error_data)?;
        let outcome = self.controller.handle(command).await.map_err(error_data)?;
        Ok(Json(outcome.into()))
    }

    /// Read a session's base prompt and iteration history (oldest first).
    #[tool(name = "session.read")]
    async fn session_read(
        &self,
        params: Parameters<SessionReadParams>,
    ) -> Result<Json<SessionResponse>, ErrorData> {
        let session_id = parse_session_id(&params.0.session_id)?;
        let session = self.controller.read_session(&session_id).map_err(error_data)?;
        Ok(Json(SessionResponse::from(&session)))
    }

    /// Fetch one iteration's artifact (base64) together with its stored diagram source.
    #[tool(name = "session.read_iteration")]
    async fn session_read_iteration(
        &self,
        params: Parameters<IterationReadParams>,
    ) -> Result<Json<IterationArtifactResponse>, ErrorData> {
        let IterationReadParams { session_id, index } = params.0;
        let session_id = parse_session_id(&session_id)?;

        let session = self.controller.read_session(&session_id).map_err(error_data)?;
        let source = session
            .iterations()
            .iter()
            .find(|iteration| iteration.index() == index)
            .and_then(|iteration| iteration.source().map(str::to_owned));
        let (artifact_ref, bytes) =
            self.controller.read_artifact(&session_id, index).map_err(error_data)?;

        Ok(Json(IterationArtifactResponse {
            session_id: session_id.into_string(),
            index,
            file_name: artifact_ref.file_name().to_owned(),
            content_type: content_type_for(artifact_ref.file_name()).to_owned(),
            source,
            artifact_base64: STANDARD.encode(bytes),
        }))
    }

    /// Generate a standalone diagram that is not part of any session; fetch it afterwards with
    /// `diagram.one_shot.read`.
    #[tool(name = "diagram.one_shot")]
    async fn diagram_one_shot(
        &self,
        params: Parameters<OneShotParams>,
    ) -> Result<Json<OneShotResponse>, ErrorData> {
        let OneShotParams {
            prompt,
            output_filename,
        } = params.0;
        let outcome = self
            .one_shot
            .handle(&prompt, &output_filename)
            .await
            .map_err(error_data)?;
        Ok(Json(outcome.into()))
    }

    /// Fetch a one-shot diagram (source and base64 artifact) by the identifier
    /// `diagram.one_shot` returned; records expire after the configured TTL.
    #[tool(name = "diagram.one_shot.read")]
    async fn diagram_one_shot_read(
        &self,
        params: Parameters<OneShotReadParams>,
    ) -> Result<Json<OneShotArtifactResponse>, ErrorData> {
        let identifier = params.0.identifier;
        let record = OneShotId::new(identifier.as_str())
            .ok()
            .and_then(|id| self.one_shot.get(&id))
            .ok_or_else(|| {
                ErrorData::resource_not_found(
                    format!("no one-shot diagram {identifier:?} (unknown or expired)"),
                    None,
                )
            })?;

        Ok(Json(OneShotArtifactResponse {
            content_type: content_type_for(&record.filename).to_owned(),
            identifier,
            filename: record.filename,
            source: record.source,
            artifact_base64: STANDARD.encode(record.artifact),
        }))
    }
}

#[tool_handler]
impl ServerHandler for SessionsMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Mermaid diagram sessions (tools: session.iterate, session.read, session.read_iteration, diagram.one_shot, diagram.one_shot.read)"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ErrorData> {
    SessionId::new(raw)
        .map_err(|err| ErrorData::invalid_params(format!("invalid session_id {raw:?}: {err}"), None))
}

fn error_data(err: SessionError) -> ErrorData {
    let message = err.to_string();
    match err {
        SessionError::InvalidInput(_) => ErrorData::invalid_params(message, None),
        SessionError::SessionNotFound(_) | SessionError::IterationNotFound { .. } => {
            ErrorData::resource_not_found(message, None)
        }
        SessionError::GenerationFailed(_)
        | SessionError::RefinementFailed { .. }
        | SessionError::StorageUnavailable(_) => ErrorData::internal_error(message, None),
    }
}
