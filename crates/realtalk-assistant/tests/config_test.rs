use realtalk_assistant::build_supervisor;
use realtalk_assistant::config::{load_config, ConfigError};
use realtalk_assistant::error::SetupError;
use realtalk_assistant::presenter::TracingPresenter;
use realtalk_types::ConnectionStatus;
use realtalk_voice::loopback::{LoopbackPlatform, LoopbackPlayback};
use std::io::Write;
use std::sync::Arc;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_sections_from_toml() {
    let file = write_config(
        r#"
[realtime]
session_url = "http://127.0.0.1:9000/session"
model = "gpt-4o-realtime-preview"

[[realtime.ice_servers]]
urls = ["stun:stun.example.org:3478"]

[notify]
url = "http://127.0.0.1:9000/send-email"
recipient = "inbox@example.org"
subject_prefix = "[realtalk]"

[supervisor]
max_reconnect_attempts = 3
reconnect_base_delay_ms = 500

[assistant]
voice = "verse"

[logging]
level = "realtalk_assistant=debug,info"
"#,
    );

    let config = load_config(file.path().to_str()).unwrap();

    assert_eq!(config.realtime.session_url, "http://127.0.0.1:9000/session");
    assert_eq!(config.realtime.ice_servers.len(), 1);
    assert_eq!(config.realtime.data_channel_label, "oai-events");
    assert_eq!(config.notify.recipient, "inbox@example.org");
    assert_eq!(config.supervisor.max_reconnect_attempts, 3);
    assert_eq!(config.supervisor.reconnect_base_delay_ms, 500);
    assert_eq!(config.supervisor.connect_timeout_ms, 30_000);
    assert_eq!(config.assistant.voice.as_deref(), Some("verse"));
    assert!(!config.logging.json);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = load_config(path.to_str()).unwrap();

    assert_eq!(config.supervisor.max_reconnect_attempts, 5);
    assert_eq!(config.realtime.data_channel_label, "oai-events");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[supervisor\nmax_reconnect_attempts = ");
    assert!(matches!(
        load_config(file.path().to_str()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn empty_urls_are_rejected() {
    let file = write_config("[realtime]\nsession_url = \"\"\n");
    assert!(matches!(
        load_config(file.path().to_str()),
        Err(ConfigError::Invalid(_))
    ));
}

#[tokio::test]
async fn builds_idle_supervisor_from_config() {
    let config = realtalk_assistant::config::Config::default();
    let (supervisor, handle) = build_supervisor(
        &config,
        Arc::new(LoopbackPlatform::default()),
        Arc::new(LoopbackPlayback::new()),
        Arc::new(TracingPresenter),
    )
    .unwrap();

    assert_eq!(handle.snapshot().status, ConnectionStatus::Idle);
    drop(handle);
    // With every handle gone the supervisor closes itself.
    supervisor.run().await;
}

#[test]
fn unreadable_biography_fails_setup() {
    let mut config = realtalk_assistant::config::Config::default();
    config.assistant.biography_path = Some("/nonexistent/biography.json".to_string());

    let result = build_supervisor(
        &config,
        Arc::new(LoopbackPlatform::default()),
        Arc::new(LoopbackPlayback::new()),
        Arc::new(TracingPresenter),
    );

    assert!(matches!(result, Err(SetupError::Biography(_))));
}
