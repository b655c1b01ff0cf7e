//! Local execution of the model's function calls.

use crate::biography::Biography;
use crate::config::NotifyConfig;
use crate::notify::{self, Notifier};
use crate::prompt::{GET_WORK_EXPERIENCE, SAVE_MESSAGE};
use chrono::{SecondsFormat, Utc};
use realtalk_types::{StoredMessage, ToolCallRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Output of one tool call, relayed back as `function_call_output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

pub struct ToolHandler {
    biography: Arc<Biography>,
    notifier: Arc<dyn Notifier>,
    notify_config: NotifyConfig,
    messages: Vec<StoredMessage>,
}

impl ToolHandler {
    pub fn new(
        biography: Arc<Biography>,
        notifier: Arc<dyn Notifier>,
        notify_config: NotifyConfig,
    ) -> Self {
        Self {
            biography,
            notifier,
            notify_config,
            messages: Vec::new(),
        }
    }

    /// Messages saved during this session, oldest first.
    pub fn messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    /// Runs `call` and returns its result. Never fails: problems are
    /// reported inside the result payload so the conversation continues.
    pub fn handle(&mut self, call: &ToolCallRequest) -> ToolResult {
        let output = match call.name.as_str() {
            SAVE_MESSAGE => self.save_message(call),
            GET_WORK_EXPERIENCE => self.work_experience(call),
            other => {
                warn!(tool = other, call_id = %call.call_id, "unknown tool requested");
                json!({ "status": "error", "error": format!("unknown tool: {other}") })
            }
        };
        ToolResult {
            call_id: call.call_id.clone(),
            output,
        }
    }

    fn save_message(&mut self, call: &ToolCallRequest) -> Value {
        let (Some(name), Some(message)) = (call.argument_str("name"), call.argument_str("message"))
        else {
            warn!(call_id = %call.call_id, "save_message without name or message");
            return json!({ "status": "error", "error": "name and message are required" });
        };

        self.messages.push(StoredMessage {
            name: name.to_string(),
            contact: call.argument_str("contact").map(str::to_string),
            message: message.to_string(),
            urgency: call.argument_str("urgency").map(str::to_string),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        info!(
            call_id = %call.call_id,
            message_count = self.messages.len(),
            "message saved"
        );

        self.dispatch_notification();
        json!({ "status": "saved", "message_count": self.messages.len() })
    }

    /// Spawns the email notification without waiting for it.
    fn dispatch_notification(&self) {
        let Some(notification) = notify::compose(&self.messages, &self.notify_config) else {
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.notify(notification).await {
                Ok(()) => info!("notification delivered"),
                Err(e) => warn!(error = %e, "failed to deliver notification"),
            }
        });
    }

    fn work_experience(&self, call: &ToolCallRequest) -> Value {
        let category = call.argument_str("type").unwrap_or_default();
        let company = call.argument_str("specific_company");
        self.biography.lookup(category, company)
    }
}
