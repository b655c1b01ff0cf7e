//! Control-channel traffic.
//!
//! Inbound frames are dispatched strictly in arrival order. Outbound
//! messages are written only while the channel is open; anything sent
//! while it is not is dropped, never queued.

use crate::presenter::{Activity, Presenter};
use crate::tools::ToolHandler;
use realtalk_types::message::SessionConfig;
use realtalk_types::{AssistantError, ClientEvent, ServerEvent};
use realtalk_voice::DataChannel;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the user should currently see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    /// The assistant is preparing a response.
    pub processing: bool,
    /// The user is talking.
    pub speaking: bool,
}

impl ViewState {
    pub fn activity(&self) -> Activity {
        if self.processing {
            Activity::Processing
        } else if self.speaking {
            Activity::Speaking
        } else {
            Activity::Idle
        }
    }
}

pub struct ControlRouter {
    session: SessionConfig,
    greeting: String,
    tools: ToolHandler,
    presenter: Arc<dyn Presenter>,
    view: ViewState,
}

impl ControlRouter {
    pub fn new(
        session: SessionConfig,
        greeting: impl Into<String>,
        tools: ToolHandler,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            session,
            greeting: greeting.into(),
            tools,
            presenter,
            view: ViewState::default(),
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn tools(&self) -> &ToolHandler {
        &self.tools
    }

    pub fn set_processing(&mut self, processing: bool) {
        self.view.processing = processing;
        self.refresh();
    }

    /// Clears the view and flashes the error activity.
    pub fn show_error(&mut self) {
        self.view = ViewState::default();
        self.presenter.set_activity(Activity::Error);
    }

    pub fn reset(&mut self) {
        self.view = ViewState::default();
        self.refresh();
    }

    /// Sends the session configuration followed by the opening greeting.
    pub fn bootstrap(&mut self, channel: &dyn DataChannel) {
        let session = ClientEvent::SessionUpdate {
            session: self.session.clone(),
        };
        self.send(channel, &session);
        let greeting = ClientEvent::response_with_instructions(self.greeting.clone());
        self.send(channel, &greeting);
    }

    /// Writes one message. Returns whether it reached the channel.
    pub fn send(&mut self, channel: &dyn DataChannel, event: &ClientEvent) -> bool {
        if !channel.is_open() {
            warn!(kind = event.kind(), "dropping outbound message: channel not open");
            return false;
        }
        let frame = match event.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "failed to encode outbound message");
                return false;
            }
        };
        match channel.send_text(&frame) {
            Ok(()) => {
                debug!(kind = event.kind(), "message sent");
                if matches!(event, ClientEvent::ResponseCreate { .. }) {
                    self.set_processing(true);
                }
                true
            }
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "failed to send message");
                false
            }
        }
    }

    /// Handles one inbound frame. An `error` event is returned for the
    /// supervisor's error path; everything else is handled here.
    pub fn handle_frame(
        &mut self,
        channel: &dyn DataChannel,
        frame: &str,
    ) -> Option<AssistantError> {
        let event = match ServerEvent::parse(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping malformed control frame");
                return None;
            }
        };
        debug!(kind = event.kind(), "received");

        match &event {
            ServerEvent::SpeechStart => {
                self.view.processing = false;
                self.view.speaking = true;
                self.refresh();
            }
            ServerEvent::SpeechEnd => {
                self.view.speaking = false;
                self.refresh();
            }
            ServerEvent::Error { .. } => {
                let message = event
                    .error_message()
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Some(AssistantError::server(message));
            }
            ServerEvent::ResponseCreate => self.set_processing(true),
            ServerEvent::ResponseDone { .. } => {
                self.set_processing(false);
                if let Some(call) = event.function_call() {
                    let result = self.tools.handle(&call);
                    let output = ClientEvent::function_call_output(
                        result.call_id,
                        result.output.to_string(),
                    );
                    self.send(channel, &output);
                    self.send(channel, &ClientEvent::resume_response());
                }
            }
            ServerEvent::Unknown => {}
        }
        None
    }

    fn refresh(&self) {
        self.presenter.set_activity(self.view.activity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biography::Biography;
    use crate::config::NotifyConfig;
    use crate::error::NotifyError;
    use crate::notify::{EmailNotification, Notifier};
    use crate::presenter::StatusLevel;
    use crate::prompt;
    use async_trait::async_trait;
    use realtalk_types::ErrorKind;
    use realtalk_voice::VoiceError;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct Channel {
        open: AtomicBool,
        /// Reports open but rejects every write.
        broken: bool,
        sent: Mutex<Vec<String>>,
    }

    impl Channel {
        fn new(open: bool) -> Self {
            Self {
                open: AtomicBool::new(open),
                broken: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::new(true)
            }
        }

        fn sent(&self) -> Vec<Value> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|f| serde_json::from_str(f).unwrap())
                .collect()
        }
    }

    impl DataChannel for Channel {
        fn label(&self) -> &str {
            "oai-events"
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn send_text(&self, text: &str) -> Result<(), VoiceError> {
            if !self.is_open() || self.broken {
                return Err(VoiceError::ChannelClosed);
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Activities(Mutex<Vec<Activity>>);

    impl Presenter for Activities {
        fn show_status(&self, _message: &str, _level: StatusLevel) {}

        fn set_activity(&self, activity: Activity) {
            self.0.lock().unwrap().push(activity);
        }

        fn show_muted(&self, _muted: bool) {}
    }

    struct Discard;

    #[async_trait]
    impl Notifier for Discard {
        async fn notify(&self, _notification: EmailNotification) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn router(presenter: Arc<Activities>) -> ControlRouter {
        let bio = Arc::new(Biography::embedded().unwrap());
        let tools = ToolHandler::new(Arc::clone(&bio), Arc::new(Discard), NotifyConfig::default());
        ControlRouter::new(
            prompt::session_config(&bio, None),
            prompt::greeting_instructions(&bio),
            tools,
            presenter,
        )
    }

    #[tokio::test]
    async fn bootstrap_sends_session_then_greeting() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        router.bootstrap(&channel);

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["type"], "session.update");
        assert_eq!(sent[0]["session"]["tool_choice"], "auto");
        assert_eq!(sent[0]["session"]["tools"].as_array().unwrap().len(), 2);
        assert_eq!(sent[1]["type"], "response.create");
        assert!(sent[1]["response"]["instructions"].is_string());
        assert!(router.view().processing);
    }

    #[tokio::test]
    async fn closed_channel_drops_messages() {
        let mut router = router(Arc::default());
        let channel = Channel::new(false);

        assert!(!router.send(&channel, &ClientEvent::resume_response()));
        router.bootstrap(&channel);

        assert!(channel.sent().is_empty());
        assert!(!router.view().processing);
    }

    #[tokio::test]
    async fn speech_and_response_markers_drive_activity() {
        let presenter = Arc::new(Activities::default());
        let mut router = router(presenter.clone());
        let channel = Channel::new(true);

        router.handle_frame(&channel, r#"{"type":"response.create"}"#);
        router.handle_frame(&channel, r#"{"type":"speech.start"}"#);
        router.handle_frame(&channel, r#"{"type":"speech.end"}"#);

        assert_eq!(
            *presenter.0.lock().unwrap(),
            vec![Activity::Processing, Activity::Speaking, Activity::Idle]
        );
        assert_eq!(router.view(), ViewState::default());
    }

    #[tokio::test]
    async fn error_event_becomes_retryable_server_error() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        let err = router
            .handle_frame(&channel, r#"{"type":"error","error":{"message":"rate limit"}}"#)
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.message, "rate limit");
        assert!(err.retryable());

        let err = router.handle_frame(&channel, r#"{"type":"error"}"#).unwrap();
        assert_eq!(err.message, "Unknown error");
    }

    #[tokio::test]
    async fn function_call_is_answered_then_resumed() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        let frame = r#"{"type":"response.done","response":{"output":[{"type":"function_call","name":"save_message","call_id":"abc","arguments":"{\"name\":\"Jane\",\"message\":\"hi\"}"}]}}"#;
        assert!(router.handle_frame(&channel, frame).is_none());

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["type"], "conversation.item.create");
        assert_eq!(sent[0]["item"]["type"], "function_call_output");
        assert_eq!(sent[0]["item"]["call_id"], "abc");
        let output: Value = serde_json::from_str(sent[0]["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(output["status"], "saved");
        assert_eq!(sent[1], serde_json::json!({"type": "response.create"}));

        let messages = router.tools().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name, "Jane");
        assert_eq!(messages[0].message, "hi");
    }

    #[tokio::test]
    async fn failed_send_leaves_processing_clear() {
        let mut router = router(Arc::default());
        let channel = Channel::broken();

        assert!(!router.send(&channel, &ClientEvent::resume_response()));
        assert!(!router.view().processing);
    }

    #[tokio::test]
    async fn string_error_detail_still_reaches_error_path() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        let err = router
            .handle_frame(&channel, r#"{"type":"error","error":"rate limited"}"#)
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.message, "rate limited");
    }

    #[tokio::test]
    async fn response_done_with_untyped_item_clears_processing() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        router.handle_frame(&channel, r#"{"type":"response.create"}"#);
        assert!(router.view().processing);

        let frame = r#"{"type":"response.done","response":{"output":[{"id":"item_1"}]}}"#;
        assert!(router.handle_frame(&channel, frame).is_none());

        assert!(!router.view().processing);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn inline_argument_object_is_still_answered() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        router.handle_frame(&channel, r#"{"type":"response.create"}"#);
        let frame = r#"{"type":"response.done","response":{"output":[{"type":"function_call","name":"save_message","call_id":"xyz","arguments":{"name":"Jane","message":"call me"}}]}}"#;
        assert!(router.handle_frame(&channel, frame).is_none());

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["item"]["call_id"], "xyz");
        assert_eq!(sent[1]["type"], "response.create");
        assert_eq!(router.tools().messages()[0].message, "call me");
    }

    #[tokio::test]
    async fn junk_and_unknown_frames_are_ignored() {
        let mut router = router(Arc::default());
        let channel = Channel::new(true);

        assert!(router.handle_frame(&channel, "not json").is_none());
        assert!(router.handle_frame(&channel, r#"{"type":"rate_limits.updated"}"#).is_none());
        assert!(router.handle_frame(&channel, r#"{"no_type":true}"#).is_none());
        assert!(channel.sent().is_empty());
    }
}
