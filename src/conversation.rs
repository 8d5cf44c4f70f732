// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

// Conversation continuation state.
//
// Tracks, per conversation, the last upstream response id known to be a
// valid continuation point. Written when a response completes and when a
// consent interrupt pauses a turn; read when a turn starts.

use dashmap::DashMap;

/// Continuation state for a single conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    /// The last response id observed from the upstream, if any. Only ever
    /// set from a successfully observed upstream event, never guessed.
    pub previous_response_id: Option<String>,
}

/// Trait for conversation state persistence.
///
/// Implementations must be thread-safe (Send + Sync); all concurrent turns
/// share one store behind an `Arc`. `get` and `put` must be atomic per key:
/// a consent interrupt and a double-submitted resume can race on the same
/// conversation.
pub trait ConversationStore: Send + Sync {
    /// Retrieve state by conversation id. None if the id was never seen.
    fn get(&self, conversation_id: &str) -> Option<ConversationState>;

    /// Store or replace state for a conversation id.
    fn put(&self, conversation_id: &str, state: ConversationState);
}

/// In-memory store backed by `DashMap` for concurrent access.
///
/// State lives for the process lifetime: no eviction, no TTL. For
/// multi-instance deployments, implement `ConversationStore` with Redis or
/// similar.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: DashMap<String, ConversationState>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked conversations (for metrics/testing).
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.conversations
            .get(conversation_id)
            .map(|entry| entry.value().clone())
    }

    fn put(&self, conversation_id: &str, state: ConversationState) {
        self.conversations.insert(conversation_id.to_string(), state);
    }
}
