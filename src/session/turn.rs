// ABOUTME: Conversation turn types — one user or assistant message, optionally with an image.
// ABOUTME: Serialized as {role, content} in snapshots; images never reach stored history.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Base64-encoded image attached to a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub base64: String,
}

impl ImageRef {
    /// Build from a browser payload, stripping a `data:image/...;base64,` prefix if present.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let data = if payload.starts_with("data:image") {
            payload.split_once(',').map(|(_, rest)| rest)?
        } else {
            payload
        };
        let data = data.trim();
        if data.is_empty() {
            return None;
        }
        Some(Self {
            base64: data.to_string(),
        })
    }

    /// Render as a data URL suitable for an `image_url` content part.
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }
}

/// One message in a conversation. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<ImageRef>) -> Self {
        self.image = image;
        self
    }

    /// The text-only form kept in history.
    pub fn without_image(&self) -> Self {
        Self {
            role: self.role,
            content: self.content.clone(),
            image: None,
        }
    }
}
