//! Session bootstrap content: persona instructions and tool schemas.

use crate::biography::Biography;
use realtalk_types::message::{SessionConfig, ToolSchema};
use serde_json::{json, Value};

pub const SAVE_MESSAGE: &str = "save_message";
pub const GET_WORK_EXPERIENCE: &str = "get_work_experience";

pub fn system_instructions(bio: &Biography) -> String {
    let owner = &bio.owner;
    let mut out = format!("You are {owner}'s personal AI assistant and you speak on their behalf.");
    if !bio.headline.is_empty() {
        out.push_str(&format!(" {owner} is a {}.", bio.headline));
    }
    if !bio.location.is_empty() {
        out.push_str(&format!(" They are based in {}.", bio.location));
    }
    out.push_str(&format!(
        "\n\nWhen someone greets you, introduce yourself as {owner}'s assistant and offer to \
         talk about their work or take a message.\n\
         \n\
         Your role:\n\
         1. Share {owner}'s professional background, focusing on concrete achievements.\n\
         2. Take messages: collect the caller's name, contact details, the message and its urgency.\n\
         3. Answer questions about specific projects and companies.\n\
         \n\
         Keep responses concise, professional and natural.\n\
         \n\
         Use {SAVE_MESSAGE} whenever someone wants to leave a message.\n\
         Use {GET_WORK_EXPERIENCE} when asked about experience, projects or skills."
    ));
    if let Some(contact) = &bio.contact {
        out.push_str(&format!("\nMention that {owner} can be reached at {contact}."));
    }
    out
}

pub fn greeting_instructions(bio: &Biography) -> String {
    format!(
        "Greet the user warmly as {}'s AI assistant and briefly offer to share their work \
         experience or take a message.",
        bio.owner
    )
}

pub fn tool_schemas(bio: &Biography) -> Vec<ToolSchema> {
    vec![
        ToolSchema::function(
            SAVE_MESSAGE,
            format!("Save a message for {} from someone", bio.owner),
            save_message_parameters(),
        ),
        ToolSchema::function(
            GET_WORK_EXPERIENCE,
            format!(
                "Get information about {}'s work experience, past projects or skills",
                bio.owner
            ),
            work_experience_parameters(),
        ),
    ]
}

fn save_message_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Name of the person leaving the message" },
            "contact": { "type": "string", "description": "Contact information (email/phone) of the person" },
            "message": { "type": "string", "description": "The message content" },
            "urgency": {
                "type": "string",
                "enum": ["low", "medium", "high"],
                "description": "The urgency level of the message"
            }
        },
        "required": ["name", "message"]
    })
}

fn work_experience_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "enum": ["work", "projects", "skills"],
                "description": "Type of information requested"
            },
            "specific_company": { "type": "string", "description": "Specific company to get information about" }
        },
        "required": ["type"]
    })
}

/// The `session.update` payload sent when the control channel opens.
pub fn session_config(bio: &Biography, voice: Option<String>) -> SessionConfig {
    SessionConfig {
        instructions: system_instructions(bio),
        tools: tool_schemas(bio),
        tool_choice: "auto".to_string(),
        voice,
    }
}
