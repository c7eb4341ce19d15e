// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Runtime configuration and the wiring it drives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::generate::{CommandGenerator, DiagramGenerator};
use crate::http::AppState;
use crate::one_shot::{
    OneShotHandler, OneShotStore, DEFAULT_ONE_SHOT_CAPACITY, DEFAULT_ONE_SHOT_TTL,
};
use crate::session::SessionController;
use crate::store::{SessionStore, WriteDurability};

pub const DEFAULT_SESSIONS_DIR: &str = "sessions";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub sessions_dir: PathBuf,
    pub port: u16,
    pub durability: WriteDurability,
    pub generator_program: String,
    pub generator_args: Vec<String>,
    pub artifact_extension: String,
    pub one_shot_ttl: Duration,
    pub one_shot_capacity: usize,
    pub log_json: bool,
    /// Serve MCP over stdio instead of running the HTTP server.
    pub mcp_stdio: bool,
}

impl ServerConfig {
    pub fn new(generator_program: impl Into<String>) -> Self {
        Self {
            sessions_dir: PathBuf::from(DEFAULT_SESSIONS_DIR),
            port: DEFAULT_PORT,
            durability: WriteDurability::BestEffort,
            generator_program: generator_program.into(),
            generator_args: Vec::new(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_owned(),
            one_shot_ttl: DEFAULT_ONE_SHOT_TTL,
            one_shot_capacity: DEFAULT_ONE_SHOT_CAPACITY,
            log_json: false,
            mcp_stdio: false,
        }
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(&self.sessions_dir)
            .with_durability(self.durability)
            .with_artifact_extension(&self.artifact_extension)
    }

    pub fn generator(&self) -> Arc<dyn DiagramGenerator> {
        Arc::new(
            CommandGenerator::new(&self.generator_program).with_args(self.generator_args.iter()),
        )
    }

    /// Builds the shared state over an explicit generator.
    pub fn app_state_with(&self, generator: Arc<dyn DiagramGenerator>) -> AppState {
        let controller = SessionController::new(self.session_store(), generator.clone());
        let one_shot = OneShotHandler::new(
            generator,
            Arc::new(OneShotStore::new(self.one_shot_ttl, self.one_shot_capacity)),
        )
        .with_artifact_extension(&self.artifact_extension);
        AppState::new(controller, one_shot)
    }

    pub fn app_state(&self) -> AppState {
        self.app_state_with(self.generator())
    }
}
