// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

// SSE event decoder.
//
// Incrementally splits an upstream byte stream into `(event, payload)`
// records. Chunk boundaries are arbitrary: bytes accumulate in a line
// buffer and complete lines are drained as they appear.

use serde_json::Value;

/// One decoded SSE record: the `event:` name (empty when the upstream sent
/// none) and the parsed `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SseRecord {
    pub event: String,
    pub data: Value,
}

/// Incremental SSE decoder.
///
/// An `event:` line names the event for the `data:` lines that follow; a
/// blank line ends the event block and resets the name. A `data:` line
/// whose payload is the `[DONE]` sentinel ends the stream. Payloads that do
/// not parse as JSON are dropped: upstreams occasionally emit non-JSON
/// heartbeat lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    current_event: Option<String>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen. Once finished, further
    /// input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk of bytes, returning the records it completed.
    ///
    /// Bytes are framed into lines before any text conversion, so a
    /// multi-byte character split across chunks survives intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        let mut records = Vec::new();
        if self.finished {
            return records;
        }
        self.line_buffer.extend_from_slice(chunk);
        while let Some(newline_pos) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.line_buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            self.accept_line(line.trim(), &mut records);
            if self.finished {
                break;
            }
        }
        records
    }

    /// Flush a trailing line that arrived without a final newline.
    pub fn finish(&mut self) -> Vec<SseRecord> {
        let mut records = Vec::new();
        if self.finished || self.line_buffer.is_empty() {
            return records;
        }
        let line_bytes = std::mem::take(&mut self.line_buffer);
        let line = String::from_utf8_lossy(&line_bytes);
        self.accept_line(line.trim(), &mut records);
        records
    }

    fn accept_line(&mut self, line: &str, records: &mut Vec<SseRecord>) {
        // Blank line: end of one SSE event block.
        if line.is_empty() {
            self.current_event = None;
            return;
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.current_event = Some(name.trim().to_string());
            return;
        }

        let Some(payload) = line.strip_prefix("data:") else {
            // Comments and unknown SSE fields.
            return;
        };
        let payload = payload.trim();

        if payload == "[DONE]" {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(data) => records.push(SseRecord {
                event: self.current_event.clone().unwrap_or_default(),
                data,
            }),
            Err(_) => {
                tracing::debug!(
                    payload = %truncate(payload, 120),
                    "non-JSON SSE payload skipped"
                );
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
