//! JSON shapes exchanged with the message backend.
//!
//! Parsing is lenient: the backend has shipped several field spellings over
//! time, so every field accepts its older alias, optional fields fall back to
//! defaults, and one malformed element never discards a whole region.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;
use waymark_core::{
    LocationKey, MarkerKind, MessageDraft, MessageId, MessageRecord, RegionId, VoteDirection,
    WorldId,
};

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One message as the backend serializes it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    #[serde(default, alias = "username")]
    pub author: String,
    #[serde(default, alias = "message")]
    pub text: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub plane: i32,
    pub world_id: i32,
    pub region_id: i32,
    #[serde(default, alias = "timestamp", deserialize_with = "lenient_millis")]
    pub created_at: u64,
    #[serde(default)]
    pub marker_kind: Option<String>,
    #[serde(default, alias = "thumbsUp")]
    pub upvotes: u32,
    #[serde(default, alias = "thumbsDown")]
    pub downvotes: u32,
}

impl WireMessage {
    /// Converts into a core record. The stored `regionId` is carried as-is so
    /// the core can check it against the coordinates.
    pub fn into_record(self) -> MessageRecord {
        let marker_kind = self
            .marker_kind
            .as_deref()
            .and_then(marker_from_wire)
            .unwrap_or_default();
        MessageRecord {
            id: MessageId::new(self.id),
            author: self.author,
            text: self.text,
            location: LocationKey::new(self.x, self.y, self.plane),
            world_id: WorldId(self.world_id),
            region_id: RegionId(self.region_id),
            created_at: self.created_at,
            marker_kind,
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            reported_by_viewer: false,
        }
    }
}

fn marker_from_wire(name: &str) -> Option<MarkerKind> {
    serde_json::from_value(serde_json::Value::String(name.to_ascii_lowercase())).ok()
}

/// Accepts a number or a numeric string; anything else reads as 0.
fn lenient_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Parses a message list body.
///
/// An empty or `null` body is an empty list. Elements that fail to parse are
/// skipped with a warning; a body that is not an array at all yields nothing.
pub fn parse_message_array(body: &str) -> Vec<MessageRecord> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Vec::new();
    }

    let elements = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(elements)) => elements,
        Ok(other) => {
            warn!(got = json_kind(&other), "expected a message array");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "failed to parse message array");
            return Vec::new();
        }
    };

    elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value::<WireMessage>(element) {
            Ok(message) => Some(message.into_record()),
            Err(e) => {
                warn!(error = %e, "failed to parse message, skipping it");
                None
            }
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// `POST /register` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub api_key: Option<String>,
}

/// Error body the backend attaches to rejected requests.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
}

/// Extracts the `error` field of a rejection body, if there is one.
pub fn error_reason(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|reason| !reason.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RegisterBody<'a> {
    pub username: &'a str,
}

/// `POST /messages` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBody<'a> {
    pub world_id: i32,
    pub region_id: i32,
    pub text: &'a str,
    pub x: i32,
    pub y: i32,
    pub plane: i32,
    pub marker_kind: MarkerKind,
}

impl<'a> SaveBody<'a> {
    pub fn from_draft(draft: &'a MessageDraft) -> Self {
        Self {
            world_id: draft.world_id.0,
            region_id: draft.region_id().0,
            text: &draft.text,
            x: draft.location.x,
            y: draft.location.y,
            plane: draft.location.plane,
            marker_kind: draft.marker_kind,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoteBody {
    pub vote: VoteDirection,
}

#[derive(Debug, Serialize)]
pub struct ReportBody<'a> {
    pub reason: &'a str,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
