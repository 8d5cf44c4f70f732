// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

// Client-facing stream event schema.
//
// Every turn is delivered to the browser as a sequence of `data: <json>`
// SSE frames, each carrying one of these events. The tag and field names
// below are the wire contract consumed by the frontend.

use bytes::Bytes;
use serde::Serialize;

/// One event on the client-facing stream.
///
/// Exactly one of `Done`, `Error`, or `ConsentRequired` terminates a turn;
/// `Done` is never sent after a consent interrupt on the same turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// A fragment of assistant output text.
    #[serde(rename = "text.delta")]
    TextDelta { delta: String },

    /// The upstream started executing a tool call.
    #[serde(rename = "tool.start")]
    ToolStart {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "callId")]
        call_id: String,
    },

    /// The upstream finished a tool call.
    #[serde(rename = "tool.end")]
    ToolEnd {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "callId")]
        call_id: String,
    },

    /// A tool call failed. Part of the contract; the upstream has no
    /// documented signal that produces it yet.
    #[serde(rename = "tool.error")]
    ToolError {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "callId")]
        call_id: String,
        error: String,
    },

    /// The turn is paused until the user completes OAuth consent.
    ///
    /// `response_id` is the continuation point known at the moment of the
    /// interrupt; null when the upstream had not yet reported one.
    #[serde(rename = "oauth_consent_required")]
    ConsentRequired {
        #[serde(rename = "consentLink")]
        consent_link: String,
        #[serde(rename = "responseId")]
        response_id: Option<String>,
        #[serde(rename = "connectionName")]
        connection_name: String,
    },

    /// Normal end of turn. `response_id` is empty if the upstream never
    /// reported one.
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "responseId")]
        response_id: String,
    },

    /// Terminal failure of the turn.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientEvent {
    /// Encode as one SSE frame: `data: <json>\n\n`.
    pub fn to_frame(&self) -> Bytes {
        let json = serde_json::to_string(self).expect("client events serialize to JSON");
        Bytes::from(format!("data: {json}\n\n"))
    }
}
