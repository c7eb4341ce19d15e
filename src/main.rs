// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! mermaid-sessions CLI entrypoint.
//!
//! By default this serves the HTTP routes and MCP over streamable HTTP at
//! `http://127.0.0.1:<port>/mcp`.
//!
//! Use `--mcp` to run the MCP server over stdio instead (intended for tool integrations).

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mermaid_sessions::config::{ServerConfig, DEFAULT_PORT, DEFAULT_SESSIONS_DIR};
use mermaid_sessions::mcp::SessionsMcp;
use mermaid_sessions::store::WriteDurability;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --generator <cmd> [--generator-arg <arg>]... [--sessions-dir <dir>] [--port <port>] [--durable-writes] [--artifact-ext <ext>] [--one-shot-ttl-secs <n>] [--one-shot-capacity <n>] [--log-json]\n  {program} --generator <cmd> [--generator-arg <arg>]... [--sessions-dir <dir>] [--durable-writes] --mcp\n\nServes the diagram routes and MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp`.\n--port selects the port (0 = ephemeral; default {DEFAULT_PORT}).\n--sessions-dir defaults to `{DEFAULT_SESSIONS_DIR}` under the current working directory.\n--mcp serves MCP over stdio instead and cannot be combined with --port.\n\n--generator names the command spawned for every generation/refinement; it reads one JSON request on stdin and answers with `{{\"source\", \"artifact_base64\"}}` on stdout.\n--durable-writes opts into slower, best-effort durable persistence (fsync/sync where supported).\n\nLog filtering follows RUST_LOG (default `info`)."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    mcp: bool,
    generator: Option<String>,
    generator_args: Vec<String>,
    sessions_dir: Option<String>,
    port: Option<u16>,
    durable_writes: bool,
    artifact_ext: Option<String>,
    one_shot_ttl_secs: Option<u64>,
    one_shot_capacity: Option<usize>,
    log_json: bool,
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<(), ()> {
    if slot.is_some() {
        return Err(());
    }
    *slot = Some(value);
    Ok(())
}

fn set_flag(flag: &mut bool) -> Result<(), ()> {
    if *flag {
        return Err(());
    }
    *flag = true;
    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mcp" => set_flag(&mut options.mcp)?,
            "--durable-writes" => set_flag(&mut options.durable_writes)?,
            "--log-json" => set_flag(&mut options.log_json)?,
            "--generator" => {
                let program = args.next().ok_or(())?;
                set_once(&mut options.generator, program)?;
            }
            "--generator-arg" => options.generator_args.push(args.next().ok_or(())?),
            "--sessions-dir" => {
                let dir = args.next().ok_or(())?;
                set_once(&mut options.sessions_dir, dir)?;
            }
            "--port" => {
                let port: u16 = args.next().ok_or(())?.parse().map_err(|_| ())?;
                set_once(&mut options.port, port)?;
            }
            "--artifact-ext" => {
                let ext = args.next().ok_or(())?;
                let ext = ext.trim_start_matches('.').to_owned();
                if ext.is_empty() || ext.contains(['/', '\\']) {
                    return Err(());
                }
                set_once(&mut options.artifact_ext, ext)?;
            }
            "--one-shot-ttl-secs" => {
                let secs: u64 = args.next().ok_or(())?.parse().map_err(|_| ())?;
                set_once(&mut options.one_shot_ttl_secs, secs)?;
            }
            "--one-shot-capacity" => {
                let capacity: usize = args.next().ok_or(())?.parse().map_err(|_| ())?;
                if capacity == 0 {
                    return Err(());
                }
                set_once(&mut options.one_shot_capacity, capacity)?;
            }
            _ => return Err(()),
        }
    }

    if options.generator.as_deref().map_or(true, |program| program.trim().is_empty()) {
        return Err(());
    }

    if options.mcp && options.port.is_some() {
        return Err(());
    }

    Ok(options)
}

impl CliOptions {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::new(self.generator.unwrap_or_default());
        config.generator_args = self.generator_args;
        if let Some(dir) = self.sessions_dir {
            config.sessions_dir = PathBuf::from(dir);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.durable_writes {
            config.durability = WriteDurability::Durable;
        }
        if let Some(ext) = self.artifact_ext {
            config.artifact_extension = ext;
        }
        if let Some(secs) = self.one_shot_ttl_secs {
            config.one_shot_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = self.one_shot_capacity {
            config.one_shot_capacity = capacity;
        }
        config.log_json = self.log_json;
        config.mcp_stdio = self.mcp;
        config
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "mermaid-sessions".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };
        let config = options.into_config();

        mermaid_sessions::logging::init_tracing(config.log_json)
            .map_err(|err| err as Box<dyn Error>)?;

        let state = config.app_state();
        let mcp = SessionsMcp::new(state.controller.clone(), state.one_shot.clone());

        if config.mcp_stdio {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            tracing::info!(sessions_dir = %config.sessions_dir.display(), "serving MCP over stdio");
            runtime.block_on(mcp.serve_stdio())?;
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
            let local_addr = listener.local_addr()?;

            let mcp_config = StreamableHttpServerConfig {
                stateful_mode: true,
                ..StreamableHttpServerConfig::default()
            };
            let shutdown_token = mcp_config.cancellation_token.clone();

            let session_manager = Arc::new(LocalSessionManager::default());
            let mcp_service =
                StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, mcp_config);

            let router =
                mermaid_sessions::http::router(state).nest_service("/mcp", mcp_service);

            tracing::info!(
                addr = %local_addr,
                sessions_dir = %config.sessions_dir.display(),
                generator = %config.generator_program,
                "listening"
            );

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                    shutdown_token.cancel();
                })
                .await?;

            Ok::<(), Box<dyn Error>>(())
        })?;

        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("mermaid-sessions: {err}");
        std::process::exit(1);
    }
}
