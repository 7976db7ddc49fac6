// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PMA delivery targets and their canonical identity keys.
//!
//! The `target_key` string is the sole identity of a target: targets file
//! writes coalesce on it, outbox ids embed it, and dedupe is keyed by it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chat platforms the delivery router can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatPlatform {
    Telegram,
    Discord,
}

impl ChatPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatPlatform::Telegram => "telegram",
            ChatPlatform::Discord => "discord",
        }
    }
}

impl fmt::Display for ChatPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured delivery destination for PMA output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// The hub web UI (delivered via the event bus).
    Web,
    /// Append to a file under the hub state root.
    Local { path: String },
    /// A chat channel, optionally a thread within it.
    Chat {
        platform: ChatPlatform,
        chat_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
}

impl DeliveryTarget {
    /// Canonical identity key. Exact forms:
    /// `web`, `local:<relpath>`, `chat:telegram:<chat>[:<thread>]`,
    /// `chat:discord:<channel>`.
    pub fn target_key(&self) -> String {
        match self {
            DeliveryTarget::Web => "web".to_string(),
            DeliveryTarget::Local { path } => format!("local:{}", path),
            DeliveryTarget::Chat {
                platform,
                chat_id,
                thread_id,
            } => match thread_id {
                Some(thread) => format!("chat:{}:{}:{}", platform, chat_id, thread),
                None => format!("chat:{}:{}", platform, chat_id),
            },
        }
    }

    pub fn telegram(chat_id: impl Into<String>, thread_id: Option<String>) -> Self {
        DeliveryTarget::Chat {
            platform: ChatPlatform::Telegram,
            chat_id: chat_id.into(),
            thread_id,
        }
    }

    pub fn discord(channel_id: impl Into<String>) -> Self {
        DeliveryTarget::Chat {
            platform: ChatPlatform::Discord,
            chat_id: channel_id.into(),
            thread_id: None,
        }
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target_key())
    }
}

/// Errors parsing a target ref from the CLI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("empty target ref")]
    Empty,
    #[error("unknown target kind: {0}")]
    UnknownKind(String),
    #[error("unknown chat platform: {0}")]
    UnknownPlatform(String),
    #[error("missing chat id in target ref: {0}")]
    MissingChatId(String),
    #[error("missing path in local target ref")]
    MissingPath,
}

impl FromStr for DeliveryTarget {
    type Err = TargetParseError;

    /// Parse the same forms `target_key` produces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TargetParseError::Empty);
        }
        if s == "web" {
            return Ok(DeliveryTarget::Web);
        }
        if let Some(path) = s.strip_prefix("local:") {
            if path.is_empty() {
                return Err(TargetParseError::MissingPath);
            }
            return Ok(DeliveryTarget::Local {
                path: path.to_string(),
            });
        }
        if let Some(rest) = s.strip_prefix("chat:") {
            let mut parts = rest.splitn(3, ':');
            let platform = match parts.next() {
                Some("telegram") => ChatPlatform::Telegram,
                Some("discord") => ChatPlatform::Discord,
                Some(other) => return Err(TargetParseError::UnknownPlatform(other.to_string())),
                None => return Err(TargetParseError::MissingChatId(s.to_string())),
            };
            let chat_id = parts
                .next()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| TargetParseError::MissingChatId(s.to_string()))?;
            let thread_id = match platform {
                // Discord channel ids never carry a thread segment here.
                ChatPlatform::Discord => None,
                ChatPlatform::Telegram => parts.next().map(|t| t.to_string()),
            };
            return Ok(DeliveryTarget::Chat {
                platform,
                chat_id: chat_id.to_string(),
                thread_id,
            });
        }
        Err(TargetParseError::UnknownKind(
            s.split(':').next().unwrap_or(s).to_string(),
        ))
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
