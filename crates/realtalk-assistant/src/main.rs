//! realtalk client binary.
//!
//! Runs one headless session fully offline: loopback media, a local
//! credential and a local SDP answer. Presentation updates are logged until
//! the session closes or SIGINT arrives. Hosts with a real WebRTC stack use
//! `build_supervisor` with their own `MediaPlatform` instead.

use realtalk_assistant::config::load_config;
use realtalk_assistant::presenter::TracingPresenter;
use realtalk_assistant::telemetry::init_tracing;
use realtalk_assistant::Backends;
use realtalk_voice::loopback::{
    LoopbackCredentials, LoopbackExchange, LoopbackOptions, LoopbackPlatform, LoopbackPlayback,
};
use std::process::ExitCode;
use std::sync::Arc;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("REALTALK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("realtalk.toml"));

    let config = match load_config(selected_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let backends = Backends {
        credentials: Arc::new(LoopbackCredentials::new()),
        exchange: Arc::new(LoopbackExchange::new()),
        platform: Arc::new(LoopbackPlatform::new(LoopbackOptions {
            auto_connect: true,
            ..LoopbackOptions::default()
        })),
        playback: Arc::new(LoopbackPlayback::new()),
    };
    tracing::info!("running offline session on the loopback media platform");
    let (supervisor, handle) = match realtalk_assistant::build_supervisor_with(
        &config,
        backends,
        Arc::new(TracingPresenter),
    ) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "failed to assemble session");
            return ExitCode::FAILURE;
        }
    };

    let session = tokio::spawn(supervisor.run());
    handle.initialize();

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, closing session");
            handle.close();
            true
        }
        _ = handle.wait_for(|s| s.status.is_terminal()) => false,
    };

    if let Err(e) = session.await {
        tracing::error!(error = %e, "supervisor task failed");
        return ExitCode::FAILURE;
    }

    match handle.snapshot().last_error {
        Some(err) if !interrupted => {
            tracing::error!(error = %err, "session ended with an error");
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
