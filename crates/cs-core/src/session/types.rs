//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Conversation state for one caller-chosen session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied session identifier
    pub id: String,
    /// Turn log in submission order
    pub turns: Vec<Turn>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn to the log
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// Drop the oldest turns until at most `max_turns` remain.
    ///
    /// Trimming continues past the limit until the log starts with a user
    /// turn, so an assistant reply is never left without its question. The
    /// newest turn always survives, even when that leaves it first.
    /// Returns the number of removed turns. `0` means unlimited.
    pub fn enforce_limit(&mut self, max_turns: usize) -> usize {
        if max_turns == 0 || self.turns.len() <= max_turns {
            return 0;
        }

        let newest = self.turns.len() - 1;
        let mut excess = self.turns.len() - max_turns;
        while excess < newest && self.turns[excess].role != Role::User {
            excess += 1;
        }

        self.turns.drain(..excess);
        self.updated_at = Utc::now();
        excess
    }

    /// Remove the last turn if it is the given user message.
    ///
    /// Used to undo a user turn whose completion failed.
    pub fn rollback_user_turn(&mut self, content: &str) -> bool {
        match self.turns.last() {
            Some(last) if last.role == Role::User && last.content == content => {
                self.turns.pop();
                self.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Get turn count
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Check if session is empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
