// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::generate::{DiagramGenerator, GeneratedDiagram, GenerationError};

static TEMP_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub(crate) struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub(crate) fn new(prefix: &str) -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let counter = TEMP_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = env::temp_dir();
        path.push(format!("mermaid-sessions-{prefix}-{}-{nanos}-{counter}", std::process::id()));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefineCall {
    pub base_prompt: String,
    pub change_prompt: String,
    pub prior_source: String,
}

/// Deterministic in-memory generator.
///
/// `generate(p)` yields source `flowchart TD\n%% p` and `refine` appends `%% <change>` to the
/// prior source, so lineage is visible in the persisted sources.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGenerator {
    generate_calls: AtomicUsize,
    refine_calls: AtomicUsize,
    fail_generate: AtomicBool,
    fail_refine: AtomicBool,
    empty_artifact: AtomicBool,
    refine_delay: Option<Duration>,
    refine_inputs: Mutex<Vec<RefineCall>>,
}

impl ScriptedGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_refine_delay(delay: Duration) -> Self {
        Self {
            refine_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refine_calls(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.generate_calls() + self.refine_calls()
    }

    pub(crate) fn set_fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_refine(&self, fail: bool) {
        self.fail_refine.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_empty_artifact(&self, empty: bool) {
        self.empty_artifact.store(empty, Ordering::SeqCst);
    }

    pub(crate) fn refine_inputs(&self) -> Vec<RefineCall> {
        self.refine_inputs.lock().unwrap().clone()
    }

    fn artifact(&self, label: &str) -> Vec<u8> {
        if self.empty_artifact.load(Ordering::SeqCst) {
            return Vec::new();
        }
        format!("PNG:{label}").into_bytes()
    }
}

#[async_trait]
impl DiagramGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedDiagram, GenerationError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(GenerationError::Failed("scripted generate failure".to_owned()));
        }
        Ok(GeneratedDiagram::new(self.artifact(prompt), format!("flowchart TD\n%% {prompt}")))
    }

    async fn refine(
        &self,
        base_prompt: &str,
        change_prompt: &str,
        prior_source: &str,
    ) -> Result<GeneratedDiagram, GenerationError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        self.refine_inputs.lock().unwrap().push(RefineCall {
            base_prompt: base_prompt.to_owned(),
            change_prompt: change_prompt.to_owned(),
            prior_source: prior_source.to_owned(),
        });
        if let Some(delay) = self.refine_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refine.load(Ordering::SeqCst) {
            return Err(GenerationError::Failed("scripted refine failure".to_owned()));
        }
        Ok(GeneratedDiagram::new(
            self.artifact(change_prompt),
            format!("{prior_source}\n%% {change_prompt}"),
        ))
    }
}
