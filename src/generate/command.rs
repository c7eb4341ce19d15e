// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{DiagramGenerator, GeneratedDiagram, GenerationError};

const STDERR_EXCERPT_LIMIT: usize = 2048;

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum GeneratorRequest<'a> {
    Generate {
        prompt: &'a str,
    },
    Refine {
        base_prompt: &'a str,
        change_prompt: &'a str,
        source: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct GeneratorResponse {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    artifact_base64: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GeneratorResponse {
    fn into_diagram(self) -> Result<GeneratedDiagram, GenerationError> {
        if let Some(message) = self.error {
            return Err(GenerationError::Failed(message));
        }
        let source = self
            .source
            .ok_or_else(|| GenerationError::InvalidResponse("missing field `source`".to_owned()))?;
        let encoded = self.artifact_base64.ok_or_else(|| {
            GenerationError::InvalidResponse("missing field `artifact_base64`".to_owned())
        })?;
        let artifact = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| GenerationError::InvalidResponse(format!("artifact_base64: {err}")))?;
        GeneratedDiagram::new(artifact, source).into_usable()
    }
}

/// Runs an external program once per call.
///
/// The program receives one JSON request on stdin and must print one JSON object
/// `{"source": "...", "artifact_base64": "..."}` on stdout before exiting with status 0.
/// A program that cannot produce a diagram may print `{"error": "..."}` instead.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn run(&self, request: &GeneratorRequest<'_>) -> Result<GeneratedDiagram, GenerationError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| GenerationError::InvalidResponse(format!("encode request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GenerationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin while stdout/stderr drain; a child that writes before reading would
        // otherwise block on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            // A program that exits without reading its request is judged by its exit status.
            match stdin.write_all(&payload).await {
                Ok(()) => match stdin.shutdown().await {
                    Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => Err(err),
                    _ => Ok(()),
                },
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                Err(err) => Err(err),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            if stderr.len() > STDERR_EXCERPT_LIMIT {
                let mut cut = STDERR_EXCERPT_LIMIT;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            tracing::warn!(program = %self.program, status = %output.status, "generator failed");
            return Err(GenerationError::Exit {
                status: output.status.to_string(),
                stderr,
            });
        }

        let response: GeneratorResponse = serde_json::from_slice(&output.stdout)
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        response.into_diagram()
    }
}

#[async_trait]
impl DiagramGenerator for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedDiagram, GenerationError> {
        tracing::debug!(program = %self.program, "running generator");
        self.run(&GeneratorRequest::Generate { prompt }).await
    }

    async fn refine(
        &self,
        base_prompt: &str,
        change_prompt: &str,
        prior_source: &str,
    ) -> Result<GeneratedDiagram, GenerationError> {
        tracing::debug!(program = %self.program, "running generator refinement");
        self.run(&GeneratorRequest::Refine {
            base_prompt,
            change_prompt,
            source: prior_source,
        })
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::{CommandGenerator, GeneratorRequest};
    use crate::generate::{DiagramGenerator, GenerationError};

    fn sh(script: &str) -> CommandGenerator {
        CommandGenerator::new("sh").with_args(["-c", script])
    }

    #[test]
    fn refine_request_uses_tagged_snake_case_shape() {
        let json = serde_json::to_value(GeneratorRequest::Refine {
            base_prompt: "show primary colors",
            change_prompt: "also show combination results",
            source: "flowchart TD",
        })
        .expect("encode");
        assert_eq!(
            json,
            serde_json::json!({
                "mode": "refine",
                "base_prompt": "show primary colors",
                "change_prompt": "also show combination results",
                "source": "flowchart TD",
            })
        );
    }

    #[tokio::test]
    async fn decodes_artifact_and_source_from_stdout() {
        let generator = sh(
            r#"cat > /dev/null; printf '%s' '{"source":"flowchart TD","artifact_base64":"aGVsbG8="}'"#,
        );
        let diagram = generator.generate("show primary colors").await.expect("generate");
        assert_eq!(diagram.artifact, b"hello");
        assert_eq!(diagram.source, "flowchart TD");
    }

    #[tokio::test]
    async fn forwards_request_on_stdin() {
        // Reflect the request through stderr so the failure carries it back.
        let generator = sh("cat >&2; exit 1");
        let err = generator.refine("base", "change", "flowchart LR").await.unwrap_err();
        let stderr = match err {
            GenerationError::Exit { stderr, .. } => stderr,
            other => panic!("expected exit error, got {other:?}"),
        };
        let request: serde_json::Value = serde_json::from_str(&stderr).expect("request json");
        assert_eq!(request["mode"], "refine");
        assert_eq!(request["base_prompt"], "base");
        assert_eq!(request["source"], "flowchart LR");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let generator = sh("cat > /dev/null; echo boom >&2; exit 3");
        let err = generator.generate("x").await.unwrap_err();
        match err {
            GenerationError::Exit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_artifact_is_rejected() {
        let generator =
            sh(r#"cat > /dev/null; printf '%s' '{"source":"flowchart TD","artifact_base64":""}'"#);
        let err = generator.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyArtifact));
    }

    #[tokio::test]
    async fn reported_error_message_is_kept() {
        let generator =
            sh(r#"cat > /dev/null; printf '%s' '{"error":"mermaid syntax error on line 3"}'"#);
        let err = generator.generate("x").await.unwrap_err();
        match err {
            GenerationError::Failed(message) => {
                assert_eq!(message, "mermaid syntax error on line 3")
            }
            other => panic!("expected failed error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_without_source_is_invalid() {
        let generator = sh(r#"cat > /dev/null; printf '%s' '{"artifact_base64":"aGVsbG8="}'"#);
        let err = generator.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(ref msg) if msg.contains("source")));
    }

    #[tokio::test]
    async fn large_request_does_not_stall_a_chatty_program() {
        // Fill the stderr pipe before touching stdin; both pipes exceed the usual 64 KiB buffer.
        let generator = sh(
            r#"head -c 262144 /dev/zero >&2; cat > /dev/null; printf '%s' '{"source":"flowchart TD","artifact_base64":"aGVsbG8="}'"#,
        );
        let prompt = "x".repeat(256 * 1024);

        let diagram = tokio::time::timeout(Duration::from_secs(30), generator.generate(&prompt))
            .await
            .expect("generator stalled")
            .expect("generate");
        assert_eq!(diagram.artifact, b"hello");
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_error() {
        let generator = CommandGenerator::new("definitely-not-a-real-generator-binary");
        let err = generator.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Spawn { .. }));
    }
}
